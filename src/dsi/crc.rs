//! CRC-16 over long-packet payloads.
//!
//! Width 16, polynomial `0x1021`, initial value `0xFFFF`, input and output reflected, no final XOR.
//! With reflected I/O the register shifts right against the bit-reversed polynomial `0x8408`.

const POLYNOMIAL_REFLECTED: u16 = 0x8408;
const INITIAL_VALUE: u16 = 0xFFFF;

/// Computes the payload checksum bit by bit.
///
/// ```
/// use panelwire::dsi::crc16;
///
/// assert_eq!(0xFFFF, crc16(&[]));
/// assert_eq!(0x6F91, crc16(b"123456789"));
/// ```
#[must_use]
pub fn crc16(payload: &[u8]) -> u16 {
    let mut crc = INITIAL_VALUE;
    for &byte in payload {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Returns the checksum in wire order (least-significant byte first).
#[must_use]
pub fn crc16_le_bytes(payload: &[u8]) -> [u8; 2] {
    crc16(payload).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(b"".as_slice(), 0xFFFF)]
    #[case(b"123456789".as_slice(), 0x6F91)]
    #[case([0x2A, 0x00, 0x00, 0x00, 0xEF].as_slice(), 0x0348)]
    #[case([0x2B, 0x00, 0x00, 0x00, 0xEF].as_slice(), 0x080C)]
    #[case([0xB0, 0x04].as_slice(), 0x8CF2)]
    fn crc16_matches_reference_vectors(#[case] payload: &[u8], #[case] expected: u16) {
        assert_eq!(expected, crc16(payload));
    }

    #[test]
    fn crc16_is_emitted_least_significant_byte_first() {
        assert_eq!([0x48, 0x03], crc16_le_bytes(&[0x2A, 0x00, 0x00, 0x00, 0xEF]));
    }
}

//! Header error-correcting code for DSI packet headers.
//!
//! The header is the 24-bit word `data_id | word_count_lo << 8 | word_count_hi << 16`. Each parity
//! bit `P0..P5` is the XOR-reduction of that word masked with one fixed column of the truncated
//! Hamming matrix. The two high bits of the ECC byte are always zero.

/// Parity masks for `P0..P5`, in bit order of the resulting ECC byte.
const PARITY_MASKS: [u32; 6] = [
    0b1111_0001_0010_1100_1011_0111,
    0b1111_0010_0101_0101_0101_1011,
    0b0111_0100_1001_1010_0110_1101,
    0b1011_1000_1110_0011_1000_1110,
    0b1101_1111_0000_0011_1111_0000,
    0b1110_1111_1111_1100_0000_0000,
];

/// Computes the 6-bit ECC for a 3-byte packet header.
///
/// ```
/// use panelwire::dsi::header_ecc;
///
/// // DCS short write "exit sleep mode" without parameter.
/// assert_eq!(0x36, header_ecc([0x05, 0x11, 0x00]));
/// ```
#[must_use]
pub fn header_ecc(header: [u8; 3]) -> u8 {
    let word = u32::from_le_bytes([header[0], header[1], header[2], 0]);
    PARITY_MASKS
        .iter()
        .enumerate()
        .fold(0u8, |ecc, (bit, mask)| {
            let parity = ((word & mask).count_ones() & 1) as u8;
            ecc | (parity << bit)
        })
}

/// Returns the header followed by its ECC byte.
#[must_use]
pub fn with_ecc(header: [u8; 3]) -> [u8; 4] {
    [header[0], header[1], header[2], header_ecc(header)]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case([0x00, 0x00, 0x00], 0x00)]
    #[case([0x05, 0x11, 0x00], 0x36)]
    #[case([0x05, 0x29, 0x00], 0x1C)]
    #[case([0x15, 0x36, 0x00], 0x29)]
    #[case([0x15, 0x3A, 0x55], 0x02)]
    #[case([0x39, 0x05, 0x00], 0x36)]
    #[case([0x13, 0xB0, 0x00], 0x3C)]
    #[case([0x23, 0xB0, 0x04], 0x0E)]
    #[case([0x29, 0x03, 0x00], 0x1A)]
    #[case([0x39, 0xC1, 0x03], 0x10)]
    fn header_ecc_matches_reference_vectors(#[case] header: [u8; 3], #[case] expected: u8) {
        assert_eq!(expected, header_ecc(header));
    }

    #[test]
    fn eotp_trailer_carries_its_own_ecc() {
        assert_eq!([0x08, 0x0F, 0x0F, 0x01], with_ecc([0x08, 0x0F, 0x0F]));
    }

    #[test]
    fn single_bit_headers_select_mask_columns() {
        for bit in 0..24u32 {
            let word = 1u32 << bit;
            let bytes = word.to_le_bytes();
            let expected = PARITY_MASKS
                .iter()
                .enumerate()
                .filter(|(_index, mask)| *mask & word != 0)
                .fold(0u8, |ecc, (index, _mask)| ecc | (1 << index));

            assert_eq!(expected, header_ecc([bytes[0], bytes[1], bytes[2]]), "bit {bit}");
        }
    }

    #[test]
    fn ecc_never_sets_the_two_high_bits() {
        for data_id in [0x05u8, 0x15, 0x39, 0xFF] {
            for low in [0x00u8, 0x5A, 0xFF] {
                assert_eq!(0, header_ecc([data_id, low, 0xFF]) & 0xC0);
            }
        }
    }
}

use std::fmt;

use strum_macros::Display;

use super::crc::crc16_le_bytes;
use super::ecc::with_ecc;
use crate::error::ProtocolError;

/// Length of a packet header including its ECC byte.
pub const HEADER_LEN: usize = 4;
/// Length of the checksum appended to long packets.
pub const CHECKSUM_LEN: usize = 2;
/// Largest payload representable by the 16-bit word count.
pub const MAX_LONG_PAYLOAD_LEN: usize = u16::MAX as usize;

/// End-of-transmission packet appended after the bring-up commands.
pub const EOTP: [u8; 4] = [0x08, 0x0F, 0x0F, 0x01];

/// DCS opcodes used by the bridge.
pub mod dcs {
    /// Exit sleep mode.
    pub const EXIT_SLEEP_MODE: u8 = 0x11;
    /// Display on.
    pub const SET_DISPLAY_ON: u8 = 0x29;
    /// Set address mode (scan direction, RGB/BGR order).
    pub const SET_ADDRESS_MODE: u8 = 0x36;
    /// Set pixel format.
    pub const SET_PIXEL_FORMAT: u8 = 0x3A;
    /// Column address window.
    pub const SET_COLUMN_ADDRESS: u8 = 0x2A;
    /// Page address window.
    pub const SET_PAGE_ADDRESS: u8 = 0x2B;
    /// First memory write of a frame, resets the write cursor to the window origin.
    pub const WRITE_MEMORY_START: u8 = 0x2C;
    /// Memory write continuing at the current cursor.
    pub const WRITE_MEMORY_CONTINUE: u8 = 0x3C;
}

/// Command namespace selecting the packet data-type codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
pub enum CommandSet {
    /// Display Command Set writes.
    #[strum(to_string = "dcs")]
    Dcs,
    /// Manufacturer/generic writes.
    #[strum(to_string = "generic")]
    Generic,
}

impl CommandSet {
    /// Data type of a short write without parameter.
    #[must_use]
    pub const fn short_no_param(self) -> u8 {
        match self {
            Self::Dcs => 0x05,
            Self::Generic => 0x13,
        }
    }

    /// Data type of a short write carrying one parameter byte.
    #[must_use]
    pub const fn short_with_param(self) -> u8 {
        match self {
            Self::Dcs => 0x15,
            Self::Generic => 0x23,
        }
    }

    /// Data type of a long write.
    #[must_use]
    pub const fn long(self) -> u8 {
        match self {
            Self::Dcs => 0x39,
            Self::Generic => 0x29,
        }
    }
}

/// One on-wire packet, described by data rather than by byte concatenation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Packet {
    /// Four-byte packet carrying a command and an optional parameter in the header.
    Short {
        set: CommandSet,
        cmd: u8,
        value: Option<u8>,
    },
    /// Header, `[cmd] ++ data` payload and checksum.
    Long {
        set: CommandSet,
        cmd: u8,
        data: Vec<u8>,
    },
}

impl Packet {
    /// DCS short write.
    #[must_use]
    pub fn dcs_short(cmd: u8, value: Option<u8>) -> Self {
        Self::Short {
            set: CommandSet::Dcs,
            cmd,
            value,
        }
    }

    /// DCS long write.
    #[must_use]
    pub fn dcs_long(cmd: u8, data: impl Into<Vec<u8>>) -> Self {
        Self::Long {
            set: CommandSet::Dcs,
            cmd,
            data: data.into(),
        }
    }

    /// Generic short write.
    #[must_use]
    pub fn generic_short(cmd: u8, value: Option<u8>) -> Self {
        Self::Short {
            set: CommandSet::Generic,
            cmd,
            value,
        }
    }

    /// Generic long write.
    #[must_use]
    pub fn generic_long(cmd: u8, data: impl Into<Vec<u8>>) -> Self {
        Self::Long {
            set: CommandSet::Generic,
            cmd,
            data: data.into(),
        }
    }

    /// Command byte carried by the packet.
    #[must_use]
    pub fn cmd(&self) -> u8 {
        match self {
            Self::Short { cmd, .. } | Self::Long { cmd, .. } => *cmd,
        }
    }

    /// Number of bytes the packet occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        match self {
            Self::Short { .. } => HEADER_LEN,
            Self::Long { data, .. } => HEADER_LEN + 1 + data.len() + CHECKSUM_LEN,
        }
    }

    /// Encodes the packet and appends it to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error when a long payload does not fit the 16-bit word count.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        match self {
            Self::Short { set, cmd, value } => {
                out.extend_from_slice(&short_write(*set, *cmd, *value));
            }
            Self::Long { set, cmd, data } => {
                let payload_len = 1 + data.len();
                let word_count = u16::try_from(payload_len).map_err(|_overflow| {
                    ProtocolError::PayloadTooLarge {
                        payload_len,
                        max_payload_len: MAX_LONG_PAYLOAD_LEN,
                    }
                })?;
                let [wc_lo, wc_hi] = word_count.to_le_bytes();
                out.reserve(HEADER_LEN + payload_len + CHECKSUM_LEN);
                out.extend_from_slice(&with_ecc([set.long(), wc_lo, wc_hi]));
                let payload_start = out.len();
                out.push(*cmd);
                out.extend_from_slice(data);
                let checksum = crc16_le_bytes(&out[payload_start..]);
                out.extend_from_slice(&checksum);
            }
        }
        Ok(())
    }

    /// Encodes the packet into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns an error when a long payload does not fit the 16-bit word count.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short {
                set,
                cmd,
                value: Some(value),
            } => write!(f, "{set} short 0x{cmd:02X}=0x{value:02X}"),
            Self::Short {
                set,
                cmd,
                value: None,
            } => write!(f, "{set} short 0x{cmd:02X}"),
            Self::Long { set, cmd, data } => {
                write!(f, "{set} long 0x{cmd:02X} ({} data bytes)", data.len())
            }
        }
    }
}

/// Builds a short write: `[data_type, cmd, value_or_0]` followed by its ECC.
///
/// ```
/// use panelwire::dsi::{CommandSet, short_write};
///
/// assert_eq!([0x05, 0x11, 0x00, 0x36], short_write(CommandSet::Dcs, 0x11, None));
/// ```
#[must_use]
pub fn short_write(set: CommandSet, cmd: u8, value: Option<u8>) -> [u8; 4] {
    match value {
        None => with_ecc([set.short_no_param(), cmd, 0x00]),
        Some(value) => with_ecc([set.short_with_param(), cmd, value]),
    }
}

/// Builds a long write carrying `[cmd] ++ data`.
///
/// ```
/// use panelwire::dsi::{CommandSet, long_write};
///
/// let packet = long_write(CommandSet::Dcs, 0x2A, &[0x00, 0x00, 0x00, 0xEF])?;
/// assert_eq!(11, packet.len());
/// # Ok::<(), panelwire::ProtocolError>(())
/// ```
///
/// # Errors
///
/// Returns an error when `1 + data.len()` exceeds 65535 bytes.
pub fn long_write(set: CommandSet, cmd: u8, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Packet::Long {
        set,
        cmd,
        data: data.to_vec(),
    }
    .encode()
}

//! DSI command and pixel packets tunnelled through the bridge's register interface.

mod bridge;
mod chunker;
mod crc;
mod ecc;
mod packet;
mod session;

pub use self::bridge::{
    DEFAULT_BACKLIGHT, DEFAULT_HS_PREP, DEFAULT_HS_TRAIL, DEFAULT_HS_ZERO, DEFAULT_SETTLE_DELAY,
    DsiBridge, DsiBridgeConfig, FrameReceipt, registers,
};
pub use self::chunker::{ChunkPlan, DEFAULT_MAX_TRANSFER, FrameChunker};
pub use self::crc::{crc16, crc16_le_bytes};
pub use self::ecc::{header_ecc, with_ecc};
pub use self::packet::{
    CHECKSUM_LEN, CommandSet, EOTP, HEADER_LEN, MAX_LONG_PAYLOAD_LEN, Packet, dcs, long_write,
    short_write,
};
pub use self::session::{SessionReceipt, TransmissionSession};

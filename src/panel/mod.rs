//! Line-buffer RGB panel: per-row writes, a buffer swap and a status handshake.

mod driver;
mod stream;

pub use self::driver::{
    DEFAULT_MAX_POLLS, DEFAULT_POLL_TIMEOUT, LineBufferConfig, LineBufferPanel, LineBufferReceipt,
    LineBufferState,
};
pub use self::stream::{
    DEFAULT_FPS, FrameSink, FrameStreamer, StreamConfig, StreamReceipt, StreamStop, pacing_delay,
};

/// Register map of the line-buffer panel.
pub mod registers {
    /// Two-byte status register, read in duplex.
    pub const STATUS: u8 = 0x00;
    /// Status bit set once the requested buffer swap has happened.
    pub const STATUS_SWAP_COMPLETE: u8 = 0x02;
    /// Burst write of one row's pixel bytes into the line buffer.
    pub const LINE_DATA: u8 = 0x80;
    /// Latches the line buffer into the given row of the back buffer.
    pub const COMMIT_ROW: u8 = 0x03;
    /// Requests a back/front buffer swap.
    pub const FRAME_SWAP: u8 = 0x04;
}

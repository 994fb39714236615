use std::time::Duration;

use derive_more::From;
use thiserror::Error;

use crate::media::{PixelBufferError, PixelFormat};

/// Failures of the register-addressed serial link.
///
/// A link failure aborts the frame in flight; resuming mid-packet would desynchronise the
/// device's write cursor, so nothing is retried.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial link I/O failed")]
    Io(#[from] std::io::Error),
    #[error("duplex exchange returned {actual} byte(s), expected {expected}")]
    ShortResponse { expected: usize, actual: usize },
    #[error("fake transport rejected transaction #{transaction}")]
    InjectedFault { transaction: usize },
    #[error("the serial link has been closed")]
    Closed,
}

/// Size and format violations detected before any byte reaches the link.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ProtocolError {
    #[error("long packet payload is too large: {payload_len} bytes exceeds max {max_payload_len}")]
    PayloadTooLarge {
        payload_len: usize,
        max_payload_len: usize,
    },
    #[error("buffer of {buffer_len} bytes is not a whole number of {stride}-byte scanlines")]
    NotMultipleOfStride { buffer_len: usize, stride: usize },
    #[error("one {stride}-byte scanline does not fit the {mtu}-byte packet payload limit")]
    ScanlineExceedsMtu { stride: usize, mtu: usize },
    #[error("transfer limit of {max_transfer} bytes leaves no room for packet payload")]
    TransferTooSmall { max_transfer: usize },
    #[error("panel height {height} exceeds the 8-bit commit-row register (max 256 rows)")]
    RowIndexOutOfRange { height: u16 },
    #[error("backlight level 0x{level:04X} overlaps the control flags (max 0x3FFF)")]
    BacklightOutOfRange { level: u16 },
    #[error("{format} frames cannot be sent through the {pipeline} pipeline")]
    UnsupportedFormat {
        format: PixelFormat,
        pipeline: &'static str,
    },
}

/// Status-poll deadline exceeded while waiting for the device handshake.
///
/// The device may be left mid-swap; the caller must reset before the next frame.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("swap-complete status not observed after {polls} poll(s) in {elapsed:?}")]
pub struct TimeoutError {
    polls: u32,
    elapsed: Duration,
}

impl TimeoutError {
    pub(crate) fn new(polls: u32, elapsed: Duration) -> Self {
        Self { polls, elapsed }
    }

    /// Number of status reads issued before giving up.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Time spent polling.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("no transport selected; pass --fake or --capture <path>")]
    MissingTransport,
    #[error("invalid panel geometry {width}x{height}; both sides must be non-zero")]
    InvalidGeometry { width: u16, height: u16 },
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level error for every operation that touches the link.
#[derive(Debug, Error, From)]
pub enum DriveError {
    #[error(transparent)]
    Link(LinkError),
    #[error(transparent)]
    Protocol(ProtocolError),
    #[error(transparent)]
    Timeout(TimeoutError),
    #[error(transparent)]
    Frame(PixelBufferError),
    #[error("failed to read frame source")]
    #[from(skip)]
    Source(#[source] std::io::Error),
    #[error("operation was cancelled")]
    #[from(skip)]
    Cancelled,
    #[error("device state is unknown after an aborted frame; reset before sending again")]
    #[from(skip)]
    ResetRequired,
}

use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use serde::Serialize;
use strum_macros::Display;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::driver::LineBufferPanel;
use crate::dsi::DsiBridge;
use crate::error::DriveError;
use crate::media::{PanelDimensions, PixelBuffer, PixelFormat};
use crate::transport::Transport;
use crate::utils::sleep_until_cancellable;

pub const DEFAULT_FPS: u32 = 30;

/// Anything that can display one validated frame.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends `frame` and waits until the device has accepted it.
    async fn push_frame(
        &mut self,
        frame: &PixelBuffer,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError>;
}

#[async_trait]
impl<T> FrameSink for LineBufferPanel<T>
where
    T: Transport,
{
    async fn push_frame(
        &mut self,
        frame: &PixelBuffer,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError> {
        self.send_frame(frame, cancel).await.map(|_receipt| ())
    }
}

#[async_trait]
impl<T> FrameSink for DsiBridge<T>
where
    T: Transport,
{
    async fn push_frame(
        &mut self,
        frame: &PixelBuffer,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError> {
        self.send_frame(frame, cancel).await.map(|_receipt| ())
    }
}

/// Target rate and optional length of a stream.
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
pub struct StreamConfig {
    #[builder(default = DEFAULT_FPS)]
    fps: u32,
    /// Stop after this many frames even if the source has more.
    max_frames: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StreamConfig {
    #[must_use]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Time budget for one frame; a zero rate is treated as one frame per second.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use panelwire::panel::StreamConfig;
    ///
    /// let config = StreamConfig::builder().fps(50).build();
    /// assert_eq!(Duration::from_millis(20), config.frame_period());
    /// ```
    #[must_use]
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Why a stream ended without error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StreamStop {
    /// The source held less than one full frame.
    SourceExhausted,
    /// The configured frame limit was reached.
    FrameLimit,
    /// Cancelled between frames.
    Cancelled,
}

/// Statistics reported when a stream ends.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct StreamReceipt {
    frames_sent: u64,
    late_frames: u64,
    stop: StreamStop,
}

impl StreamReceipt {
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Frames that finished after their pacing deadline.
    #[must_use]
    pub fn late_frames(&self) -> u64 {
        self.late_frames
    }

    #[must_use]
    pub fn stop(&self) -> StreamStop {
        self.stop
    }
}

/// Time left until `deadline`, clamped at zero.
///
/// ```
/// use std::time::Duration;
///
/// use panelwire::panel::pacing_delay;
/// use tokio::time::Instant;
///
/// let now = Instant::now();
/// assert_eq!(Duration::ZERO, pacing_delay(now, now + Duration::from_millis(5)));
/// assert_eq!(Duration::from_millis(5), pacing_delay(now + Duration::from_millis(5), now));
/// ```
#[must_use]
pub fn pacing_delay(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

/// Reads fixed-size frames from a byte source and paces them onto a sink.
///
/// Deadlines advance by one frame period per frame from the moment streaming starts, so time spent
/// sending never accumulates as drift.
#[derive(Debug)]
pub struct FrameStreamer<S> {
    sink: S,
    dimensions: PanelDimensions,
    format: PixelFormat,
    config: StreamConfig,
}

impl<S> FrameStreamer<S>
where
    S: FrameSink,
{
    #[must_use]
    pub fn new(
        sink: S,
        dimensions: PanelDimensions,
        format: PixelFormat,
        config: StreamConfig,
    ) -> Self {
        Self {
            sink,
            dimensions,
            format,
            config,
        }
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Streams frames until the source runs short, the frame limit is hit, or `cancel` fires
    /// between frames.
    ///
    /// # Errors
    ///
    /// Returns an error when reading the source fails or the sink fails; cancellation while a
    /// frame is in flight is reported as [`DriveError::Cancelled`].
    #[instrument(
        skip_all,
        fields(dimensions = %self.dimensions, format = %self.format, fps = self.config.fps)
    )]
    pub async fn run<R>(
        &mut self,
        source: &mut R,
        cancel: &CancellationToken,
    ) -> Result<StreamReceipt, DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let frame_len = PixelBuffer::expected_len(self.dimensions, self.format);
        let period = self.config.frame_period();
        let mut deadline = Instant::now() + period;
        let mut frames_sent = 0u64;
        let mut late_frames = 0u64;

        let stop = loop {
            if self
                .config
                .max_frames
                .is_some_and(|limit| frames_sent >= limit)
            {
                break StreamStop::FrameLimit;
            }
            if cancel.is_cancelled() {
                break StreamStop::Cancelled;
            }

            let mut bytes = vec![0; frame_len];
            let filled = read_frame(source, &mut bytes)
                .await
                .map_err(DriveError::Source)?;
            if filled < frame_len {
                if filled > 0 {
                    tracing::debug!(filled, frame_len, "discarding trailing partial frame");
                }
                break StreamStop::SourceExhausted;
            }

            let frame = PixelBuffer::new(self.dimensions, self.format, bytes)?;
            self.sink.push_frame(&frame, cancel).await?;
            frames_sent += 1;

            let delay = pacing_delay(deadline, Instant::now());
            if delay.is_zero() {
                late_frames += 1;
                tracing::debug!(frame = frames_sent, "frame missed its pacing deadline");
            }
            match sleep_until_cancellable(cancel, deadline).await {
                Ok(()) => {}
                Err(DriveError::Cancelled) => break StreamStop::Cancelled,
                Err(error) => return Err(error),
            }
            deadline += period;
        };

        tracing::info!(frames_sent, late_frames, %stop, "stream finished");
        Ok(StreamReceipt {
            frames_sent,
            late_frames,
            stop,
        })
    }
}

/// Fills `buffer` from `source`, returning fewer bytes only at end of input.
async fn read_frame<R>(source: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + Send,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let read = source.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

use std::time::Duration;

use bon::Builder;
use serde::Serialize;
use strum_macros::Display;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::registers;
use crate::error::{DriveError, LinkError, ProtocolError, TimeoutError};
use crate::media::PixelBuffer;
use crate::transport::Transport;
use crate::utils::{run_cancellable, sleep_cancellable};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_POLLS: u32 = 1_000_000;
/// Rows addressable through the 8-bit commit register.
const MAX_ROWS: u16 = 256;

/// Where the driver is within one frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum LineBufferState {
    #[strum(to_string = "idle")]
    Idle,
    #[strum(to_string = "writing row {next_row}")]
    WritingRows { next_row: u16 },
    #[strum(to_string = "swapping")]
    Swapping,
    #[strum(to_string = "waiting for swap ({polls} polls)")]
    WaitingCommit { polls: u32 },
    /// A frame was aborted; the device may hold a half-written back buffer.
    #[strum(to_string = "needs reset")]
    NeedsReset,
}

/// Bounds on the swap-complete handshake.
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
pub struct LineBufferConfig {
    /// Give up waiting for swap-complete after this long.
    #[builder(default = DEFAULT_POLL_TIMEOUT)]
    poll_timeout: Duration,
    /// Give up after this many status reads, whichever bound is hit first.
    #[builder(default = DEFAULT_MAX_POLLS)]
    max_polls: u32,
    /// Pause between status reads; zero polls back to back.
    #[builder(default)]
    poll_interval: Duration,
}

impl Default for LineBufferConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LineBufferConfig {
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    #[must_use]
    pub fn max_polls(&self) -> u32 {
        self.max_polls
    }
}

/// Counts reported after a line-buffer frame has been displayed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct LineBufferReceipt {
    rows: u16,
    polls: u32,
}

impl LineBufferReceipt {
    /// Rows written and committed.
    #[must_use]
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Status reads issued before swap-complete was observed.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

/// RGB panel driven through its line buffer.
///
/// Each frame is written row by row, every row committed by index, then the buffers are swapped
/// and the status register is polled until the swap completes. Any failure once a frame has started
/// leaves the driver in [`LineBufferState::NeedsReset`].
#[derive(Debug)]
pub struct LineBufferPanel<T> {
    link: T,
    config: LineBufferConfig,
    state: LineBufferState,
}

impl<T> LineBufferPanel<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(link: T, config: LineBufferConfig) -> Self {
        Self {
            link,
            config,
            state: LineBufferState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> LineBufferState {
        self.state
    }

    #[must_use]
    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn into_link(self) -> T {
        self.link
    }

    /// Acknowledges an aborted frame so the next one may be sent.
    ///
    /// The panel has no reset register; the next frame rewrites every row from the top, which
    /// overwrites whatever the aborted frame left in the back buffer.
    pub fn reset(&mut self) {
        if self.state != LineBufferState::Idle {
            tracing::warn!(state = %self.state, "resetting line-buffer driver");
        }
        self.state = LineBufferState::Idle;
    }

    /// Writes, commits and swaps one frame, then waits for the swap to complete.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::ResetRequired`] until [`Self::reset`] follows an aborted frame, a
    /// protocol error when the frame has more rows than the commit register can address, and
    /// link, timeout or cancellation errors from the transfer itself.
    #[instrument(skip_all, fields(dimensions = %frame.dimensions()))]
    pub async fn send_frame(
        &mut self,
        frame: &PixelBuffer,
        cancel: &CancellationToken,
    ) -> Result<LineBufferReceipt, DriveError> {
        if self.state == LineBufferState::NeedsReset {
            return Err(DriveError::ResetRequired);
        }
        let height = frame.dimensions().height();
        if height > MAX_ROWS {
            return Err(ProtocolError::RowIndexOutOfRange { height }.into());
        }

        match self.drive(frame, cancel).await {
            Ok(receipt) => {
                self.state = LineBufferState::Idle;
                Ok(receipt)
            }
            Err(error) => {
                tracing::warn!(%error, state = %self.state, "line-buffer frame aborted");
                self.state = LineBufferState::NeedsReset;
                Err(error)
            }
        }
    }

    /// Releases the link.
    ///
    /// # Errors
    ///
    /// Returns an error when the link fails to close.
    pub async fn close(&mut self) -> Result<(), LinkError> {
        self.link.close().await
    }

    async fn drive(
        &mut self,
        frame: &PixelBuffer,
        cancel: &CancellationToken,
    ) -> Result<LineBufferReceipt, DriveError> {
        let mut rows = 0u16;
        for (row, bytes) in (0..=u8::MAX).zip(frame.rows()) {
            if cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }
            self.state = LineBufferState::WritingRows {
                next_row: u16::from(row),
            };
            run_cancellable(
                cancel,
                self.link.write_reg_bytes(registers::LINE_DATA, bytes),
            )
            .await??;
            run_cancellable(cancel, self.link.write_reg_u8(registers::COMMIT_ROW, row)).await??;
            rows += 1;
        }

        self.state = LineBufferState::Swapping;
        run_cancellable(cancel, self.link.write_reg_u8(registers::FRAME_SWAP, 0x00)).await??;

        let polls = self.wait_for_swap(cancel).await?;
        tracing::debug!(rows, polls, "frame swapped");
        Ok(LineBufferReceipt { rows, polls })
    }

    #[instrument(skip_all, level = "trace")]
    async fn wait_for_swap(&mut self, cancel: &CancellationToken) -> Result<u32, DriveError> {
        let started = Instant::now();
        let deadline = started + self.config.poll_timeout;
        let mut polls = 0u32;

        loop {
            if polls >= self.config.max_polls || Instant::now() >= deadline {
                return Err(TimeoutError::new(polls, started.elapsed()).into());
            }
            self.state = LineBufferState::WaitingCommit { polls };

            let read = tokio::time::timeout_at(deadline, self.link.read_reg(registers::STATUS, 1));
            let status = match run_cancellable(cancel, read).await? {
                Ok(status) => status?,
                Err(_elapsed) => {
                    return Err(TimeoutError::new(polls + 1, started.elapsed()).into());
                }
            };
            polls += 1;
            if swap_complete(&status) {
                return Ok(polls);
            }

            if self.config.poll_interval.is_zero() {
                if cancel.is_cancelled() {
                    return Err(DriveError::Cancelled);
                }
                tokio::task::yield_now().await;
            } else {
                sleep_cancellable(cancel, self.config.poll_interval).await?;
            }
        }
    }
}

fn swap_complete(status: &[u8]) -> bool {
    status.iter().fold(0, |acc, byte| acc | byte) & registers::STATUS_SWAP_COMPLETE != 0
}

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::DriveError;

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| format!("{value:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drives `future` to completion unless `cancel` fires first.
pub(crate) async fn run_cancellable<F>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, DriveError>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DriveError::Cancelled),
        output = future => Ok(output),
    }
}

/// Sleeps until `deadline`; returns immediately when it has already passed.
pub(crate) async fn sleep_until_cancellable(
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<(), DriveError> {
    run_cancellable(cancel, sleep_until(deadline)).await
}

/// Sleeps for `duration` unless cancelled.
pub(crate) async fn sleep_cancellable(
    cancel: &CancellationToken,
    duration: Duration,
) -> Result<(), DriveError> {
    sleep_until_cancellable(cancel, Instant::now() + duration).await
}

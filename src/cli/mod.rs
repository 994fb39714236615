pub(crate) mod command;
pub(crate) mod dsi;
pub(crate) mod panel;
pub(crate) mod ui;

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::{CliConfigError, DriveError, LinkError};
use crate::media::PanelDimensions;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat, TransportArgs};
pub use self::dsi::{DsiFrameArgs, DsiInitArgs, FrameSource};
pub use self::panel::{PanelFrameArgs, PanelStreamArgs, PollArgs};

/// Panel size flags shared by every frame command.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct GeometryArgs {
    /// Panel width in pixels.
    #[arg(long)]
    width: u16,
    /// Panel height in pixels.
    #[arg(long)]
    height: u16,
}

impl GeometryArgs {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub(crate) fn dimensions(self) -> Result<PanelDimensions, CliConfigError> {
        PanelDimensions::new(self.width, self.height).ok_or(CliConfigError::InvalidGeometry {
            width: self.width,
            height: self.height,
        })
    }
}

pub(crate) async fn read_source(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read frame file `{}`", path.display()))
}

/// Combines a command outcome with closing its link; the command error wins when both fail.
pub(crate) fn finish<R>(
    command_result: Result<R, DriveError>,
    close_result: Result<(), LinkError>,
) -> Result<R> {
    let value = command_result?;
    close_result.context("failed to close the serial link")?;
    Ok(value)
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

/// Parses decimal or `0x`-prefixed hexadecimal register values.
fn parse_register_value(value: &str) -> Result<u16, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex_digits) => u16::from_str_radix(hex_digits, 16),
        None => value.parse(),
    };
    parsed.map_err(|error| format!("invalid register value `{value}`: {error}"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("256", 0x0100)]
    #[case("0x100", 0x0100)]
    #[case("0X3FFF", 0x3FFF)]
    fn register_values_accept_decimal_and_hex(#[case] input: &str, #[case] expected: u16) {
        assert_eq!(Ok(expected), parse_register_value(input));
    }

    #[test]
    fn register_values_reject_garbage() {
        assert_matches!(parse_register_value("0xZZ"), Err(message) if message.contains("0xZZ"));
    }

    #[test]
    fn zero_sized_geometry_is_rejected() {
        let result = GeometryArgs::new(0, 64).dimensions();

        assert_matches!(
            result,
            Err(CliConfigError::InvalidGeometry {
                width: 0,
                height: 64
            })
        );
    }

    #[test]
    fn close_failure_surfaces_after_successful_command() {
        let result = finish(Ok(7), Err(LinkError::Closed));

        let error = result.expect_err("close failure should be reported");
        assert!(error.to_string().contains("close"));
    }

    #[test]
    fn command_failure_wins_over_close_failure() {
        let result: Result<()> = finish(Err(DriveError::Cancelled), Err(LinkError::Closed));

        let error = result.expect_err("command failure should be reported");
        assert_matches!(error.downcast_ref::<DriveError>(), Some(DriveError::Cancelled));
    }
}

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::ui::{Painter, Report};
use super::{GeometryArgs, OutputFormat, finish, parse_duration, read_source, write_json_line};
use crate::media::{PixelBuffer, PixelFormat};
use crate::panel::{
    DEFAULT_FPS, DEFAULT_MAX_POLLS, FrameStreamer, LineBufferConfig, LineBufferPanel,
    LineBufferReceipt, StreamConfig, StreamReceipt, StreamStop,
};
use crate::transport::Transport;

/// JSON result emitted by the line-buffer commands.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PanelResult {
    Frame {
        #[serde(flatten)]
        frame: LineBufferReceipt,
    },
    Stream {
        #[serde(flatten)]
        stream: StreamReceipt,
    },
}

/// Status-poll bounds shared by the line-buffer commands.
#[derive(Debug, Clone, Copy, Args)]
pub struct PollArgs {
    /// Give up waiting for swap-complete after this long (e.g. `500ms`, `2s`).
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    poll_timeout: Duration,
    /// Give up after this many status reads.
    #[arg(long, default_value_t = DEFAULT_MAX_POLLS)]
    max_polls: u32,
}

impl Default for PollArgs {
    fn default() -> Self {
        let config = LineBufferConfig::default();
        Self {
            poll_timeout: config.poll_timeout(),
            max_polls: config.max_polls(),
        }
    }
}

impl PollArgs {
    fn config(self) -> LineBufferConfig {
        LineBufferConfig::builder()
            .poll_timeout(self.poll_timeout)
            .max_polls(self.max_polls)
            .build()
    }
}

/// Arguments for `panel-frame`.
#[derive(Debug, Clone, Args)]
pub struct PanelFrameArgs {
    /// RGB565 frame file to send.
    file: PathBuf,
    #[command(flatten)]
    geometry: GeometryArgs,
    #[command(flatten)]
    poll: PollArgs,
}

impl PanelFrameArgs {
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, geometry: GeometryArgs) -> Self {
        Self {
            file: file.into(),
            geometry,
            poll: PollArgs::default(),
        }
    }
}

/// Arguments for `panel-stream`.
#[derive(Debug, Clone, Args)]
pub struct PanelStreamArgs {
    /// File holding back-to-back RGB565 frames.
    file: PathBuf,
    #[command(flatten)]
    geometry: GeometryArgs,
    #[command(flatten)]
    poll: PollArgs,
    /// Target frame rate.
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

impl PanelStreamArgs {
    /// Creates stream arguments with the default rate and no frame limit.
    ///
    /// ```
    /// use panelwire::{GeometryArgs, PanelStreamArgs};
    ///
    /// let args = PanelStreamArgs::new("frames.bin", GeometryArgs::new(64, 64)).with_fps(60);
    /// assert_eq!(60, args.fps());
    /// ```
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, geometry: GeometryArgs) -> Self {
        Self {
            file: file.into(),
            geometry,
            poll: PollArgs::default(),
            fps: DEFAULT_FPS,
            max_frames: None,
        }
    }

    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    #[must_use]
    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// Executes `panel-frame`.
#[instrument(skip_all, level = "info", fields(file = %args.file.display()))]
pub(crate) async fn run_frame<T, W>(
    link: T,
    args: &PanelFrameArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Transport,
    W: io::Write,
{
    let dimensions = args.geometry.dimensions()?;
    let source_bytes = read_source(&args.file).await?;
    let frame = PixelBuffer::new(dimensions, PixelFormat::Rgb565, source_bytes)
        .with_context(|| format!("frame file `{}` is not one frame", args.file.display()))?;
    let mut panel = LineBufferPanel::new(link, args.poll.config());

    let command_result = panel.send_frame(&frame, cancel).await;
    let receipt = finish(command_result, panel.close().await)?;

    match output_format {
        OutputFormat::Pretty => {
            let report = Report::new(painter, "Panel frame swapped")
                .text("dimensions", dimensions.to_string())
                .count("rows", receipt.rows())
                .count("polls", receipt.polls());
            writeln!(out, "{report}")?;
        }
        OutputFormat::Json => write_json_line(out, &PanelResult::Frame { frame: receipt })?,
    }
    Ok(())
}

/// Executes `panel-stream`.
#[instrument(skip_all, level = "info", fields(file = %args.file.display(), fps = args.fps))]
pub(crate) async fn run_stream<T, W>(
    link: T,
    args: &PanelStreamArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Transport,
    W: io::Write,
{
    let dimensions = args.geometry.dimensions()?;
    let mut source = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("failed to open frame file `{}`", args.file.display()))?;
    let config = StreamConfig::builder()
        .fps(args.fps)
        .maybe_max_frames(args.max_frames)
        .build();
    let panel = LineBufferPanel::new(link, args.poll.config());
    let mut streamer = FrameStreamer::new(panel, dimensions, PixelFormat::Rgb565, config);

    let command_result = streamer.run(&mut source, cancel).await;
    let mut panel = streamer.into_sink();
    let receipt = finish(command_result, panel.close().await)?;

    match output_format {
        OutputFormat::Pretty => {
            let stop = match receipt.stop() {
                StreamStop::Cancelled => painter.warning(receipt.stop().to_string()),
                StreamStop::SourceExhausted | StreamStop::FrameLimit => {
                    receipt.stop().to_string()
                }
            };
            let report = Report::new(painter, "Panel stream finished")
                .count("frames_sent", receipt.frames_sent())
                .count("late_frames", receipt.late_frames())
                .text("stop", stop);
            writeln!(out, "{report}")?;
        }
        OutputFormat::Json => write_json_line(out, &PanelResult::Stream { stream: receipt })?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cli::{Args, Command};

    #[test]
    fn stream_rejects_zero_fps() {
        let result = Args::try_parse_from([
            "panelwire",
            "panel-stream",
            "frames.bin",
            "--width",
            "64",
            "--height",
            "64",
            "--fps",
            "0",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn poll_timeout_accepts_humantime_values() {
        let args = Args::try_parse_from([
            "panelwire",
            "panel-frame",
            "frame.bin",
            "--width",
            "64",
            "--height",
            "64",
            "--poll-timeout",
            "250ms",
        ])
        .expect("humantime durations should parse");

        let (command, _transport) = args
            .with_fake(Default::default())
            .into_command_and_transport()
            .expect("fake link should resolve");
        let Command::PanelFrame(frame_args) = command else {
            panic!("expected panel-frame");
        };
        assert_eq!(Duration::from_millis(250), frame_args.poll.config().poll_timeout());
    }
}

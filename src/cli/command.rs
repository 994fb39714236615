use std::path::PathBuf;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::dsi::{DsiFrameArgs, DsiInitArgs};
use crate::cli::panel::{PanelFrameArgs, PanelStreamArgs};
use crate::error::CliConfigError;
use crate::transport::FakeTransportConfig;

/// Command-line options for the panel link driver.
#[derive(Debug, Parser)]
#[command(
    name = "panelwire",
    about = "Drive DSI-bridged and line-buffer display panels over a serial link."
)]
pub struct Args {
    /// Overrides `RUST_LOG` for this run.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output_format: Option<OutputFormat>,
    /// Uses an in-memory link that simulates the panel status register.
    #[arg(long, global = true, conflicts_with = "capture")]
    fake: bool,
    /// Status reads answered "busy" after each swap trigger on the fake link.
    #[arg(long, global = true, requires = "fake")]
    fake_ready_after: Option<u32>,
    /// Zero-based transaction index the fake link fails.
    #[arg(long, global = true, requires = "fake")]
    fake_fail_at: Option<usize>,
    /// Writes every link transaction as a hex line to this file instead of a device.
    #[arg(long, global = true)]
    capture: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use panelwire::{Args, Command};
    ///
    /// let args = Args::new(Command::DsiInit(Default::default()));
    /// assert!(args.log_level().is_none());
    /// assert!(args.output_format().is_none());
    /// // A link still has to be chosen before the command can run.
    /// assert!(args.into_command_and_transport().is_err());
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output_format: None,
            fake: false,
            fake_ready_after: None,
            fake_fail_at: None,
            capture: None,
            command,
        }
    }

    /// Selects the fake link with pre-built settings.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        self.fake = true;
        self.fake_ready_after = Some(fake.ready_after);
        self.fake_fail_at = fake.fail_at;
        self.capture = None;
        self
    }

    /// Selects the capture link writing to `path`.
    #[must_use]
    pub fn with_capture(mut self, path: impl Into<PathBuf>) -> Self {
        self.fake = false;
        self.capture = Some(path.into());
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    /// Splits parsed CLI arguments into the command and the selected link.
    ///
    /// # Errors
    ///
    /// Returns an error when no link was selected.
    pub fn into_command_and_transport(self) -> anyhow::Result<(Command, TransportArgs)> {
        let Args {
            fake,
            fake_ready_after,
            fake_fail_at,
            capture,
            command,
            ..
        } = self;

        let transport = match (fake, capture) {
            (true, _) => TransportArgs::Fake(FakeArgs {
                ready_after: fake_ready_after.unwrap_or_default(),
                fail_at: fake_fail_at,
            }),
            (false, Some(path)) => TransportArgs::Capture(path),
            (false, None) => return Err(CliConfigError::MissingTransport.into()),
        };

        Ok((command, transport))
    }
}

/// Link selected on the command line.
#[derive(Debug)]
pub enum TransportArgs {
    Fake(FakeArgs),
    Capture(PathBuf),
}

/// Fake link arguments for programmatic runs.
#[derive(Debug, Clone, Default, Builder)]
pub struct FakeArgs {
    #[builder(default)]
    ready_after: u32,
    fail_at: Option<usize>,
}

impl FakeArgs {
    pub(crate) fn into_transport_config(self) -> FakeTransportConfig {
        FakeTransportConfig::builder()
            .busy_polls(self.ready_after)
            .maybe_fail_at(self.fail_at)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reset the DSI bridge, program HS timing and send the panel bring-up sequence.
    DsiInit(DsiInitArgs),
    /// Bring up the DSI panel and send one frame.
    DsiFrame(DsiFrameArgs),
    /// Send one RGB565 frame through the line-buffer panel.
    PanelFrame(PanelFrameArgs),
    /// Stream RGB565 frames from a file to the line-buffer panel at a fixed rate.
    PanelStream(PanelStreamArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::DsiInit(_args) => "dsi-init",
            Self::DsiFrame(_args) => "dsi-frame",
            Self::PanelFrame(_args) => "panel-frame",
            Self::PanelStream(_args) => "panel-stream",
        }
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering of command results on stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables.
    Pretty,
    /// One JSON document per result.
    Json,
}

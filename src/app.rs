use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::cli::ui::Painter;
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat, TransportArgs};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};
use crate::transport::{CaptureTransport, FakeTransport, Transport};

const SERVICE_NAME: &str = "panelwire";

/// Creates the in-memory link used by `--fake`.
#[must_use]
pub fn fake_transport(fake_args: FakeArgs) -> Box<dyn Transport> {
    Box::new(FakeTransport::new(fake_args.into_transport_config()))
}

/// Creates a link that records every transaction to `path` as a hex line.
///
/// # Errors
///
/// Returns an error when the capture file cannot be created.
pub async fn capture_transport(path: &Path) -> Result<Box<dyn Transport>> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create capture file `{}`", path.display()))?;
    Ok(Box::new(CaptureTransport::new(file)))
}

/// Opens the link selected on the command line.
///
/// # Errors
///
/// Returns an error when the capture file cannot be created.
pub async fn open_transport(transport: TransportArgs) -> Result<Box<dyn Transport>> {
    match transport {
        TransportArgs::Fake(fake_args) => Ok(fake_transport(fake_args)),
        TransportArgs::Capture(path) => capture_transport(&path).await,
    }
}

/// Runs the CLI command over `link`, cancelling on Ctrl+C.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = panelwire::Args::try_parse_from(["panelwire", "--fake", "dsi-init"])?;
/// let (command, transport) = args.into_command_and_transport()?;
/// let link = panelwire::open_transport(transport).await?;
/// let mut out = Vec::new();
/// panelwire::run(command, &mut out, link, panelwire::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    link: Box<dyn Transport>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, link, None, output_format).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link fails, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    link: Box<dyn Transport>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = run_with_clients(
        command,
        out,
        &SystemTerminalClient,
        link,
        log_level,
        output_format,
        &cancel,
    )
    .await;

    ctrl_c.abort();
    result
}

/// Runs the CLI command with injected clients and an external cancellation token.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
/// use tokio_util::sync::CancellationToken;
///
/// struct FakeTerminal;
/// impl panelwire::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = panelwire::Args::try_parse_from([
///     "panelwire",
///     "--log-level",
///     "trace",
///     "--fake",
///     "dsi-init",
/// ])?;
/// let log_level = args.log_level();
/// let (command, transport) = args.into_command_and_transport()?;
/// let link = panelwire::open_transport(transport).await?;
/// let mut out = Vec::new();
/// panelwire::run_with_clients(
///     command,
///     &mut out,
///     &FakeTerminal,
///     link,
///     log_level,
///     panelwire::OutputFormat::Pretty,
///     &CancellationToken::new(),
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the link fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, link, cancel),
    level = "info",
    fields(command = %command.name(), ?log_level)
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    link: Box<dyn Transport>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        SERVICE_NAME,
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;
    let painter = Painter::new(terminal_client.stdout_is_terminal());

    match command {
        Command::DsiInit(args) => {
            crate::cli::dsi::run_init(link, &args, out, &painter, output_format, cancel).await
        }
        Command::DsiFrame(args) => {
            crate::cli::dsi::run_frame(link, &args, out, &painter, output_format, cancel).await
        }
        Command::PanelFrame(args) => {
            crate::cli::panel::run_frame(link, &args, out, &painter, output_format, cancel).await
        }
        Command::PanelStream(args) => {
            crate::cli::panel::run_stream(link, &args, out, &painter, output_format, cancel).await
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("interrupt received; stopping after the current transfer");
            cancel.cancel();
        }
        Err(error) => tracing::debug!(%error, "Ctrl+C handler unavailable"),
    }
}

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use assert_matches::assert_matches;
use clap::Parser;
use clap::error::ErrorKind;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl panelwire::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(
    args: panelwire::Args,
    output_format: panelwire::OutputFormat,
) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let log_level = args.log_level();
    let (command, transport) = args.into_command_and_transport()?;
    let link = panelwire::open_transport(transport).await?;
    panelwire::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        link,
        log_level,
        output_format,
        &CancellationToken::new(),
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = panelwire::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args, panelwire::OutputFormat::Json).await
}

fn temp_path(label: &str, extension: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "panelwire-{label}-{}-{timestamp}.{extension}",
        std::process::id()
    ))
}

#[tokio::test]
async fn dsi_init_command_reports_the_bring_up_batch() -> anyhow::Result<()> {
    let stdout = run_with_argv(["panelwire", "--fake", "dsi-init"]).await?;

    assert_snapshot!(stdout.trim_end(), @r#"{"action":"init","transfers":1,"packets":5,"wire_bytes":21}"#);
    Ok(())
}

#[tokio::test]
async fn dsi_init_command_renders_a_pretty_report() -> anyhow::Result<()> {
    let args = panelwire::Args::new(panelwire::Command::DsiInit(panelwire::DsiInitArgs::new(
        0x0200,
    )))
    .with_fake(panelwire::FakeArgs::default());

    let stdout = run_with_parsed_args(args, panelwire::OutputFormat::Pretty).await?;

    assert!(stdout.starts_with("✓ DSI panel initialised"));
    assert!(stdout.contains("wire_bytes"));
    Ok(())
}

#[tokio::test]
async fn dsi_frame_command_chunks_a_full_frame() -> anyhow::Result<()> {
    let frame_path = temp_path("dsi-frame", "bin");
    std::fs::write(&frame_path, vec![0x5A; 240 * 240 * 2])?;

    let stdout = run_with_argv([
        "panelwire",
        "--fake",
        "dsi-frame",
        frame_path.to_str().expect("temp path should be utf-8"),
        "--width",
        "240",
        "--height",
        "240",
    ])
    .await;
    std::fs::remove_file(&frame_path)?;

    let receipt: serde_json::Value = serde_json::from_str(stdout?.trim_end())?;
    assert_eq!("frame", receipt["action"]);
    assert_eq!("rgb565", receipt["format"]);
    assert_eq!(240, receipt["dimensions"]["width"]);
    assert_eq!(960, receipt["chunk_size"]);
    assert_eq!(122, receipt["packets"]);
    assert_eq!(122, receipt["transfers"]);
    Ok(())
}

#[tokio::test]
async fn dsi_frame_command_rejects_a_truncated_file() -> anyhow::Result<()> {
    let frame_path = temp_path("dsi-short", "bin");
    std::fs::write(&frame_path, vec![0x00; 31])?;
    let args = panelwire::Args::new(panelwire::Command::DsiFrame(panelwire::DsiFrameArgs::new(
        &frame_path,
        panelwire::GeometryArgs::new(4, 4),
    )))
    .with_fake(panelwire::FakeArgs::default());

    let result = run_with_parsed_args(args, panelwire::OutputFormat::Json).await;
    std::fs::remove_file(&frame_path)?;

    let error = result.expect_err("31 bytes is not a 4x4 RGB565 frame");
    assert!(error.chain().any(|cause| cause
        .downcast_ref::<panelwire::PixelBufferError>()
        .is_some()));
    Ok(())
}

#[tokio::test]
async fn panel_frame_command_reports_rows_and_polls() -> anyhow::Result<()> {
    let frame_path = temp_path("panel-frame", "bin");
    std::fs::write(&frame_path, vec![0xFF; 64 * 64 * 2])?;

    let stdout = run_with_argv([
        "panelwire",
        "--fake",
        "--fake-ready-after",
        "3",
        "panel-frame",
        frame_path.to_str().expect("temp path should be utf-8"),
        "--width",
        "64",
        "--height",
        "64",
    ])
    .await;
    std::fs::remove_file(&frame_path)?;

    assert_snapshot!(stdout?.trim_end(), @r#"{"action":"frame","rows":64,"polls":4}"#);
    Ok(())
}

#[tokio::test]
async fn panel_frame_command_times_out_when_the_poll_budget_runs_out() -> anyhow::Result<()> {
    let frame_path = temp_path("panel-timeout", "bin");
    std::fs::write(&frame_path, vec![0x00; 8 * 8 * 2])?;

    let result = run_with_argv([
        "panelwire",
        "--fake",
        "--fake-ready-after",
        "100",
        "panel-frame",
        frame_path.to_str().expect("temp path should be utf-8"),
        "--width",
        "8",
        "--height",
        "8",
        "--max-polls",
        "5",
    ])
    .await;
    std::fs::remove_file(&frame_path)?;

    let error = result.expect_err("five polls cannot observe a swap that needs 101");
    assert_matches!(
        error.downcast_ref::<panelwire::DriveError>(),
        Some(panelwire::DriveError::Timeout(_))
    );
    Ok(())
}

#[tokio::test]
async fn panel_stream_command_stops_at_the_end_of_the_source() -> anyhow::Result<()> {
    let frames_path = temp_path("panel-stream", "bin");
    let mut frames = vec![0x11; 3 * 4 * 4 * 2];
    frames.extend_from_slice(&[0x22; 10]);
    std::fs::write(&frames_path, frames)?;

    let stdout = run_with_argv([
        "panelwire",
        "--fake",
        "panel-stream",
        frames_path.to_str().expect("temp path should be utf-8"),
        "--width",
        "4",
        "--height",
        "4",
        "--fps",
        "1000",
    ])
    .await;
    std::fs::remove_file(&frames_path)?;

    let receipt: serde_json::Value = serde_json::from_str(stdout?.trim_end())?;
    assert_eq!("stream", receipt["action"]);
    assert_eq!(3, receipt["frames_sent"]);
    assert_eq!("source_exhausted", receipt["stop"]);
    Ok(())
}

#[tokio::test]
async fn panel_stream_command_honours_the_frame_limit() -> anyhow::Result<()> {
    let frames_path = temp_path("panel-limit", "bin");
    std::fs::write(&frames_path, vec![0x33; 5 * 2 * 2 * 2])?;
    let args = panelwire::Args::new(panelwire::Command::PanelStream(
        panelwire::PanelStreamArgs::new(&frames_path, panelwire::GeometryArgs::new(2, 2))
            .with_fps(500)
            .with_max_frames(2),
    ))
    .with_fake(panelwire::FakeArgs::default());

    let result = run_with_parsed_args(args, panelwire::OutputFormat::Json).await;
    std::fs::remove_file(&frames_path)?;

    let receipt: serde_json::Value = serde_json::from_str(result?.trim_end())?;
    assert_eq!(2, receipt["frames_sent"]);
    assert_eq!("frame_limit", receipt["stop"]);
    Ok(())
}

#[tokio::test]
async fn capture_link_records_the_bring_up_transactions() -> anyhow::Result<()> {
    let capture_path = temp_path("capture", "hex");

    let stdout = run_with_argv([
        "panelwire",
        "--capture",
        capture_path.to_str().expect("temp path should be utf-8"),
        "dsi-init",
    ])
    .await?;
    let captured = std::fs::read_to_string(&capture_path)?;
    std::fs::remove_file(&capture_path)?;

    assert!(stdout.contains(r#""action":"init""#));
    assert_snapshot!(captured.trim_end(), @r"
    W 008000
    W 000100
    W 1010
    W 1118
    W 1218
    W 004100
    W 20051100360529001C15360029153A5502080F0F01
    ");
    Ok(())
}

#[test]
fn commands_require_a_transport() {
    let args = panelwire::Args::try_parse_from(["panelwire", "dsi-init"])
        .expect("dsi-init without flags should parse");

    let error = args
        .into_command_and_transport()
        .expect_err("no link was selected");

    assert!(error.to_string().contains("--fake"));
}

#[test]
fn fake_options_require_the_fake_link() {
    let result = panelwire::Args::try_parse_from([
        "panelwire",
        "--fake-fail-at",
        "2",
        "dsi-init",
    ]);

    let error = result.expect_err("--fake-fail-at needs --fake");
    assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
}

#[test]
fn backlight_rejects_values_that_are_not_registers() {
    let result = panelwire::Args::try_parse_from([
        "panelwire",
        "--fake",
        "dsi-init",
        "--backlight",
        "0xZZ",
    ]);

    let error = result.expect_err("0xZZ is not a register value");
    assert_eq!(ErrorKind::ValueValidation, error.kind());
}

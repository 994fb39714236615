use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::ui::{Painter, Report};
use super::{GeometryArgs, OutputFormat, finish, parse_register_value, read_source, write_json_line};
use crate::dsi::{
    DEFAULT_BACKLIGHT, DEFAULT_MAX_TRANSFER, DsiBridge, DsiBridgeConfig, FrameReceipt,
    SessionReceipt,
};
use crate::media::{PanelDimensions, PixelBuffer, PixelFormat, Rgb565Encoder};
use crate::transport::Transport;

/// JSON result emitted by the DSI commands.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum DsiResult {
    Init {
        #[serde(flatten)]
        bring_up: SessionReceipt,
    },
    Frame {
        #[serde(flatten)]
        frame: FrameReceipt,
    },
}

/// Arguments for `dsi-init`.
#[derive(Debug, Clone, Args)]
pub struct DsiInitArgs {
    /// Backlight level written to the control register (decimal or 0x-prefixed, max 0x3FFF).
    #[arg(long, default_value_t = DEFAULT_BACKLIGHT, value_parser = parse_register_value)]
    backlight: u16,
}

impl Default for DsiInitArgs {
    fn default() -> Self {
        Self {
            backlight: DEFAULT_BACKLIGHT,
        }
    }
}

impl DsiInitArgs {
    #[must_use]
    pub fn new(backlight: u16) -> Self {
        Self { backlight }
    }
}

/// Layout of the bytes in a `dsi-frame` input file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum FrameSource {
    /// Little-endian RGB565, two bytes per pixel.
    Rgb565,
    /// Raw framebuffer dump, four bytes per pixel in B, G, R, X order.
    Bgrx,
    /// Any image file the decoder understands, scaled to cover the panel.
    Image,
    /// Pre-packed bytes, one per pixel, sent through the packed register.
    Packed,
}

/// Arguments for `dsi-frame`.
#[derive(Debug, Clone, Args)]
pub struct DsiFrameArgs {
    /// Frame file to send.
    file: PathBuf,
    #[command(flatten)]
    geometry: GeometryArgs,
    #[arg(long, value_enum, default_value_t = FrameSource::Rgb565)]
    source: FrameSource,
    /// Largest link transaction accepted by the bridge, register byte included.
    #[arg(long, default_value_t = DEFAULT_MAX_TRANSFER)]
    max_transfer: usize,
    /// Backlight level applied during bring-up.
    #[arg(long, default_value_t = DEFAULT_BACKLIGHT, value_parser = parse_register_value)]
    backlight: u16,
    /// Skip the full-frame column/page window before the pixel data.
    #[arg(long)]
    no_window: bool,
}

impl DsiFrameArgs {
    /// Creates frame arguments for an RGB565 file with default bridge settings.
    ///
    /// ```
    /// use panelwire::{DsiFrameArgs, FrameSource, GeometryArgs};
    ///
    /// let args = DsiFrameArgs::new("frame.bin", GeometryArgs::new(240, 240))
    ///     .with_source(FrameSource::Bgrx);
    /// assert_eq!(FrameSource::Bgrx, args.source());
    /// ```
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, geometry: GeometryArgs) -> Self {
        Self {
            file: file.into(),
            geometry,
            source: FrameSource::Rgb565,
            max_transfer: DEFAULT_MAX_TRANSFER,
            backlight: DEFAULT_BACKLIGHT,
            no_window: false,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: FrameSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_max_transfer(mut self, max_transfer: usize) -> Self {
        self.max_transfer = max_transfer;
        self
    }

    #[must_use]
    pub fn source(&self) -> FrameSource {
        self.source
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }
}

/// Executes `dsi-init`.
#[instrument(skip_all, level = "info", fields(backlight = args.backlight))]
pub(crate) async fn run_init<T, W>(
    link: T,
    args: &DsiInitArgs,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Transport,
    W: io::Write,
{
    let config = DsiBridgeConfig::builder().backlight(args.backlight).build();
    let mut bridge = DsiBridge::new(link, config);

    let command_result = bridge.initialise(cancel).await;
    let receipt = finish(command_result, bridge.close().await)?;

    match output_format {
        OutputFormat::Pretty => {
            let report = Report::new(painter, "DSI panel initialised")
                .count("transfers", receipt.transfers())
                .count("packets", receipt.packets())
                .count("wire_bytes", receipt.wire_bytes());
            writeln!(out, "{report}")?;
        }
        OutputFormat::Json => write_json_line(out, &DsiResult::Init { bring_up: receipt })?,
    }
    Ok(())
}

/// Executes `dsi-frame`: bring-up followed by one frame.
#[instrument(skip_all, level = "info", fields(source = ?args.source, file = %args.file.display()))]
pub(crate) async fn run_frame<T, W>(
    link: T,
    args: &DsiFrameArgs,
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
    let frame = load_frame(args.source, dimensions, &source_bytes)
        .with_context(|| format!("failed to prepare frame file `{}`", args.file.display()))?;

    let config = DsiBridgeConfig::builder()
        .max_transfer(args.max_transfer)
        .backlight(args.backlight)
        .address_window(!args.no_window)
        .build();
    let mut bridge = DsiBridge::new(link, config);

    let command_result = async {
        bridge.initialise(cancel).await?;
        bridge.send_frame(&frame, cancel).await
    }
    .await;
    let receipt = finish(command_result, bridge.close().await)?;

    match output_format {
        OutputFormat::Pretty => {
            let session = receipt.session();
            let report = Report::new(painter, "DSI frame sent")
                .text("dimensions", receipt.dimensions().to_string())
                .text("format", receipt.format().to_string())
                .count("chunk_size", receipt.chunk_size())
                .count("packets", session.packets())
                .count("transfers", session.transfers())
                .count("wire_bytes", session.wire_bytes());
            writeln!(out, "{report}")?;
        }
        OutputFormat::Json => write_json_line(out, &DsiResult::Frame { frame: receipt })?,
    }
    Ok(())
}

fn load_frame(
    source: FrameSource,
    dimensions: PanelDimensions,
    bytes: &[u8],
) -> Result<PixelBuffer> {
    let frame = match source {
        FrameSource::Rgb565 => PixelBuffer::new(dimensions, PixelFormat::Rgb565, bytes.to_vec())?,
        FrameSource::Packed => PixelBuffer::new(dimensions, PixelFormat::Packed8, bytes.to_vec())?,
        FrameSource::Bgrx => Rgb565Encoder::from_bgrx(dimensions, bytes)?,
        FrameSource::Image => Rgb565Encoder::from_image_bytes(dimensions, bytes)?,
    };
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::media::PixelBufferError;

    #[test]
    fn bgrx_source_is_converted_to_rgb565() -> Result<()> {
        let dimensions = PanelDimensions::new(2, 1).expect("2x1 should be valid");

        let frame = load_frame(
            FrameSource::Bgrx,
            dimensions,
            &[0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00],
        )?;

        assert_eq!(PixelFormat::Rgb565, frame.format());
        assert_eq!(&[0x00, 0xF8, 0x1F, 0x00], frame.bytes());
        Ok(())
    }

    #[test]
    fn packed_source_keeps_one_byte_per_pixel() -> Result<()> {
        let dimensions = PanelDimensions::new(4, 1).expect("4x1 should be valid");

        let frame = load_frame(FrameSource::Packed, dimensions, &[1, 2, 3, 4])?;

        assert_eq!(PixelFormat::Packed8, frame.format());
        Ok(())
    }

    #[test]
    fn truncated_rgb565_file_is_rejected() {
        let dimensions = PanelDimensions::new(4, 4).expect("4x4 should be valid");

        let result = load_frame(FrameSource::Rgb565, dimensions, &[0; 31]);

        let error = result.expect_err("31 bytes is not a 4x4 RGB565 frame");
        assert_matches!(
            error.downcast_ref::<PixelBufferError>(),
            Some(PixelBufferError::LengthMismatch {
                expected_len: 32,
                actual_len: 31,
                ..
            })
        );
    }
}

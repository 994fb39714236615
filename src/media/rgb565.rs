use image::imageops::FilterType;
use thiserror::Error;

use super::{PanelDimensions, PixelBuffer, PixelBufferError, PixelFormat};

/// Bytes per pixel in raw BGRX framebuffer dumps.
const BGRX_BYTES_PER_PIXEL: usize = 4;

/// Packs 8-bit samples into one RGB565 word.
///
/// ```
/// use panelwire::media::pack_rgb565;
///
/// assert_eq!(0xF800, pack_rgb565(0xFF, 0x00, 0x00));
/// assert_eq!(0x07E0, pack_rgb565(0x00, 0xFF, 0x00));
/// assert_eq!(0x001F, pack_rgb565(0x00, 0x00, 0xFF));
/// ```
#[must_use]
pub const fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r = ((r >> 3) & 0x1F) as u16;
    let g = ((g >> 2) & 0x3F) as u16;
    let b = ((b >> 3) & 0x1F) as u16;
    (r << 11) | (g << 5) | b
}

/// Errors returned while converting source pixels to RGB565.
#[derive(Debug, Error)]
pub enum SourceConversionError {
    #[error("source is {actual_len} bytes, expected {expected_len} for panel {dimensions}")]
    SourceLengthMismatch {
        dimensions: PanelDimensions,
        expected_len: usize,
        actual_len: usize,
    },
    #[error("failed to decode source image")]
    Decode(#[source] image::ImageError),
    #[error(transparent)]
    Frame(#[from] PixelBufferError),
}

/// Converts source pixels into little-endian RGB565 frames.
pub struct Rgb565Encoder;

impl Rgb565Encoder {
    /// Converts a raw `B, G, R, X` framebuffer dump.
    ///
    /// # Errors
    ///
    /// Returns an error when the dump is not exactly one panel of 4-byte pixels.
    pub fn from_bgrx(
        dimensions: PanelDimensions,
        source: &[u8],
    ) -> Result<PixelBuffer, SourceConversionError> {
        Self::from_pixels(dimensions, source, BGRX_BYTES_PER_PIXEL, |pixel| {
            pack_rgb565(pixel[2], pixel[1], pixel[0])
        })
    }

    /// Converts tightly packed `R, G, B` samples.
    ///
    /// # Errors
    ///
    /// Returns an error when the source is not exactly one panel of 3-byte pixels.
    pub fn from_rgb888(
        dimensions: PanelDimensions,
        source: &[u8],
    ) -> Result<PixelBuffer, SourceConversionError> {
        Self::from_pixels(dimensions, source, 3, |pixel| {
            pack_rgb565(pixel[0], pixel[1], pixel[2])
        })
    }

    /// Decodes an image file, scales it to cover the panel and crops the overflow.
    ///
    /// # Errors
    ///
    /// Returns an error when the image cannot be decoded.
    pub fn from_image_bytes(
        dimensions: PanelDimensions,
        source: &[u8],
    ) -> Result<PixelBuffer, SourceConversionError> {
        let decoded = image::load_from_memory(source).map_err(SourceConversionError::Decode)?;
        let fitted = decoded
            .resize_to_fill(
                u32::from(dimensions.width()),
                u32::from(dimensions.height()),
                FilterType::Triangle,
            )
            .to_rgb8();
        Self::from_rgb888(dimensions, fitted.as_raw())
    }

    fn from_pixels(
        dimensions: PanelDimensions,
        source: &[u8],
        source_bpp: usize,
        pack: impl Fn(&[u8]) -> u16,
    ) -> Result<PixelBuffer, SourceConversionError> {
        let expected_len = dimensions.pixel_count() * source_bpp;
        if source.len() != expected_len {
            return Err(SourceConversionError::SourceLengthMismatch {
                dimensions,
                expected_len,
                actual_len: source.len(),
            });
        }

        let bytes = source
            .chunks_exact(source_bpp)
            .flat_map(|pixel| pack(pixel).to_le_bytes())
            .collect();
        Ok(PixelBuffer::new(dimensions, PixelFormat::Rgb565, bytes)?)
    }
}

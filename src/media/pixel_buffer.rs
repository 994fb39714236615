use std::fmt::{self, Formatter};

use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;

/// Panel geometry in pixels; both sides are non-zero.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct PanelDimensions {
    width: u16,
    height: u16,
}

impl PanelDimensions {
    /// Creates panel dimensions when both values are non-zero.
    ///
    /// ```
    /// use panelwire::PanelDimensions;
    ///
    /// let dimensions = PanelDimensions::new(240, 240).expect("240x240 should be valid");
    /// assert_eq!(240, dimensions.width());
    /// assert!(PanelDimensions::new(0, 64).is_none());
    /// ```
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        Some(Self { width, height })
    }

    /// Panel width in pixels.
    #[must_use]
    pub const fn width(self) -> u16 {
        self.width
    }

    /// Panel height in pixels.
    #[must_use]
    pub const fn height(self) -> u16 {
        self.height
    }

    /// Number of pixels in one frame.
    #[must_use]
    pub fn pixel_count(self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

impl fmt::Display for PanelDimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Byte layout of a frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 16 bits per pixel, `RRRRRGGG GGGBBBBB` stored little-endian.
    Rgb565,
    /// 8 bits per pixel in the bridge's packed layout, passed through untouched.
    Packed8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 => 2,
            Self::Packed8 => 1,
        }
    }
}

/// Errors returned when validating a frame payload.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum PixelBufferError {
    /// The payload length does not match `width * height * bytes_per_pixel`.
    #[error(
        "{format} payload length mismatch for panel {dimensions}: expected {expected_len} bytes, got {actual_len}"
    )]
    LengthMismatch {
        dimensions: PanelDimensions,
        format: PixelFormat,
        expected_len: usize,
        actual_len: usize,
    },
}

/// One validated frame of pixel bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PixelBuffer {
    dimensions: PanelDimensions,
    format: PixelFormat,
    bytes: Vec<u8>,
}

impl PixelBuffer {
    /// Validates `bytes` against the frame geometry and format.
    ///
    /// # Errors
    ///
    /// Returns an error when the byte count is not exactly one frame.
    ///
    /// ```
    /// use panelwire::{PanelDimensions, PixelBuffer, PixelFormat};
    ///
    /// let dimensions = PanelDimensions::new(2, 1).expect("2x1 should be valid");
    /// let frame = PixelBuffer::new(dimensions, PixelFormat::Rgb565, vec![0; 4])?;
    /// assert_eq!(4, frame.bytes().len());
    /// # Ok::<(), panelwire::PixelBufferError>(())
    /// ```
    pub fn new(
        dimensions: PanelDimensions,
        format: PixelFormat,
        bytes: Vec<u8>,
    ) -> Result<Self, PixelBufferError> {
        let expected_len = Self::expected_len(dimensions, format);
        if bytes.len() != expected_len {
            return Err(PixelBufferError::LengthMismatch {
                dimensions,
                format,
                expected_len,
                actual_len: bytes.len(),
            });
        }

        Ok(Self {
            dimensions,
            format,
            bytes,
        })
    }

    /// Byte length of one frame at the given geometry.
    #[must_use]
    pub fn expected_len(dimensions: PanelDimensions, format: PixelFormat) -> usize {
        dimensions.pixel_count() * format.bytes_per_pixel()
    }

    #[must_use]
    pub fn dimensions(&self) -> PanelDimensions {
        self.dimensions
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes in one scanline.
    #[must_use]
    pub fn stride(&self) -> usize {
        usize::from(self.dimensions.width()) * self.format.bytes_per_pixel()
    }

    /// Iterates over scanlines, top to bottom.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[u8]> {
        self.bytes.chunks_exact(self.stride())
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PixelFormat::Rgb565, 0usize)]
    #[case(PixelFormat::Rgb565, 15usize)]
    #[case(PixelFormat::Packed8, 16usize)]
    fn new_rejects_partial_or_oversized_frames(
        #[case] format: PixelFormat,
        #[case] actual_len: usize,
    ) {
        let dimensions = PanelDimensions::new(4, 2).expect("4x2 should be valid");

        let result = PixelBuffer::new(dimensions, format, vec![0; actual_len]);

        assert_matches!(
            result,
            Err(PixelBufferError::LengthMismatch { expected_len, actual_len: len, .. })
                if expected_len == 8 * format.bytes_per_pixel() && len == actual_len
        );
    }

    #[test]
    fn rows_split_on_stride() -> Result<(), PixelBufferError> {
        let dimensions = PanelDimensions::new(2, 3).expect("2x3 should be valid");
        let frame = PixelBuffer::new(dimensions, PixelFormat::Rgb565, (0u8..12).collect())?;

        let rows: Vec<&[u8]> = frame.rows().collect();

        assert_eq!(4, frame.stride());
        assert_eq!(vec![&[0u8, 1, 2, 3][..], &[4, 5, 6, 7][..], &[8, 9, 10, 11][..]], rows);
        Ok(())
    }

    #[test]
    fn pixel_format_displays_in_snake_case() {
        assert_eq!("rgb565", PixelFormat::Rgb565.to_string());
        assert_eq!("packed8", PixelFormat::Packed8.to_string());
    }
}

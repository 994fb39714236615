mod pixel_buffer;
mod rgb565;

pub use self::pixel_buffer::{PanelDimensions, PixelBuffer, PixelBufferError, PixelFormat};
pub use self::rgb565::{Rgb565Encoder, SourceConversionError, pack_rgb565};

//! Image decoding and per-pixel brightness access.
//!
//! The gradient builder reads one scalar brightness per pixel through the
//! [`PixelBuffer`] trait. Grayscale buffers expose their sample directly;
//! colour buffers are reduced with the fixed `0.3*R + 0.59*G + 0.11*B`
//! weighting.

use image::{DynamicImage, GrayImage, RgbaImage};

use crate::types::ScissorsError;

/// Channel weights used to reduce RGB to a single brightness value.
pub const LUMA_WEIGHTS: [f64; 3] = [0.3, 0.59, 0.11];

/// Read-only 2D grid of brightness samples with the origin at top-left.
pub trait PixelBuffer {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Brightness of the pixel at `(x, y)`.
    ///
    /// Callers only pass in-bounds coordinates.
    fn luma(&self, x: u32, y: u32) -> f64;
}

impl PixelBuffer for GrayImage {
    fn width(&self) -> u32 {
        Self::width(self)
    }

    fn height(&self) -> u32 {
        Self::height(self)
    }

    fn luma(&self, x: u32, y: u32) -> f64 {
        f64::from(self.get_pixel(x, y).0[0])
    }
}

impl PixelBuffer for RgbaImage {
    fn width(&self) -> u32 {
        Self::width(self)
    }

    fn height(&self) -> u32 {
        Self::height(self)
    }

    fn luma(&self, x: u32, y: u32) -> f64 {
        let [r, g, b, _] = self.get_pixel(x, y).0;
        LUMA_WEIGHTS[2].mul_add(
            f64::from(b),
            LUMA_WEIGHTS[0].mul_add(f64::from(r), LUMA_WEIGHTS[1] * f64::from(g)),
        )
    }
}

/// Decode raw image bytes (PNG, JPEG, BMP, WebP).
///
/// # Errors
///
/// Returns [`ScissorsError::EmptyInput`] if `bytes` is empty.
/// Returns [`ScissorsError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ScissorsError> {
    if bytes.is_empty() {
        return Err(ScissorsError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Decode raw image bytes into an RGBA buffer ready for gradient building.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, ScissorsError> {
    Ok(decode(bytes)?.to_rgba8())
}

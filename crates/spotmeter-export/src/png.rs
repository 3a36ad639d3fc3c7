//! Raster export.
//!
//! Encodes overlay images in memory. [`encode_image`] picks the encoder
//! from a file extension so a writer can honour whatever name the user
//! asked for.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::ExportError;

/// Encode an RGB image as PNG.
///
/// # Errors
///
/// Returns [`ExportError::Image`] if encoding fails.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ExportError> {
    encode(&DynamicImage::ImageRgb8(image.clone()), ImageFormat::Png)
}

/// Encode an RGB image in the format matching `extension` (`png`, `jpg`,
/// `bmp`, `tif`, ...). Unknown extensions fall back to PNG.
///
/// # Errors
///
/// Returns [`ExportError::Image`] if encoding fails, e.g. because the
/// format was not compiled in.
pub fn encode_image(image: &RgbImage, extension: &str) -> Result<Vec<u8>, ExportError> {
    let format = ImageFormat::from_extension(extension).unwrap_or(ImageFormat::Png);
    encode(&DynamicImage::ImageRgb8(image.clone()), format)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format)?;
    Ok(buf)
}

//! Image reading: the `New -> Loaded` step.
//!
//! Reads the source file and decodes it with whatever formats the `image`
//! crate was built with (PNG, JPEG, BMP, TIFF).

use std::path::Path;

use crate::metadata::Metadata;
use crate::params::ParameterSet;
use crate::step::{ProcessStep, StepFunction};
use crate::types::{DynamicImage, StepError};

/// Registered name of the image reader.
pub const NAME: &str = "read_image";

/// The image reader step.
#[must_use]
pub fn step() -> ProcessStep {
    ProcessStep::new(NAME, StepFunction::Read(read_image), ParameterSet::empty())
}

/// Read and decode the image at `path`.
///
/// # Errors
///
/// Returns [`StepError::Io`] if the file cannot be read,
/// [`StepError::EmptyInput`] if it is empty, or [`StepError::Image`] if
/// the format is unrecognized or the data is corrupt.
pub fn read_image(path: &Path, _: &ParameterSet) -> Result<(DynamicImage, Metadata), StepError> {
    let bytes = std::fs::read(path).map_err(|source| StepError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((decode(&bytes)?, Metadata::new()))
}

/// Decode raw image bytes.
///
/// # Errors
///
/// Returns [`StepError::EmptyInput`] if `bytes` is empty, or
/// [`StepError::Image`] if the data cannot be decoded.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, StepError> {
    if bytes.is_empty() {
        return Err(StepError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |_, _| image::Rgb([128, 64, 32]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(StepError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_return_image_error() {
        assert!(matches!(
            decode(&[0xFF, 0xFE, 0x00, 0x01]),
            Err(StepError::Image(_))
        ));
    }

    #[test]
    fn output_dimensions_match_input() {
        let img = decode(&png_bytes(17, 31)).unwrap();
        assert_eq!((img.width(), img.height()), (17, 31));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_image(Path::new("/nonexistent/spot.png"), &ParameterSet::empty())
            .unwrap_err();
        assert!(matches!(err, StepError::Io { .. }));
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spot.png");
        std::fs::write(&path, png_bytes(5, 4)).unwrap();
        let (img, extras) = read_image(&path, &ParameterSet::empty()).unwrap();
        assert_eq!((img.width(), img.height()), (5, 4));
        assert!(extras.is_empty());
    }
}

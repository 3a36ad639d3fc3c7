//! Binarization: the `Preprocessed -> Binarized` steps.
//!
//! Every variant writes 255 for foreground and 0 for background, so the
//! contour finder can treat any non-zero pixel as part of a feature.

use image::{GrayImage, Luma};

use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::types::{DynamicImage, StepError};

/// Registered name of the fixed threshold.
pub const BINARY: &str = "binary_threshold";

/// Registered name of Otsu's threshold.
pub const OTSU: &str = "otsu_threshold";

/// Registered name of the band threshold.
pub const RANGE: &str = "range_threshold";

const FOREGROUND: u8 = 255;

/// Fixed threshold: pixels brighter than `threshold` become foreground.
#[must_use]
pub fn binary_step() -> ProcessStep {
    ProcessStep::new(
        BINARY,
        StepFunction::Binarize(binary_threshold),
        ParameterSet::from_distinct(vec![
            Parameter::int_range("threshold", 100, 0, 255)
                .with_description("pixels above this value are foreground"),
            Parameter::boolean("invert", false),
        ]),
    )
}

/// Threshold chosen by Otsu's method.
#[must_use]
pub fn otsu_step() -> ProcessStep {
    ProcessStep::new(
        OTSU,
        StepFunction::Binarize(otsu_threshold),
        ParameterSet::from_distinct(vec![Parameter::boolean("invert", false)]),
    )
}

/// Band threshold: pixels strictly between `lower_threshold` and
/// `upper_threshold` become foreground.
#[must_use]
pub fn range_step() -> ProcessStep {
    ProcessStep::new(
        RANGE,
        StepFunction::Binarize(range_threshold),
        ParameterSet::from_distinct(vec![
            Parameter::int_range("lower_threshold", 100, 0, 255),
            Parameter::int_range("upper_threshold", 200, 0, 255),
            Parameter::boolean("invert", false),
        ]),
    )
}

/// Pixels brighter than `threshold` become 255, all others 0.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if a parameter is missing.
pub fn binary_threshold(
    image: &DynamicImage,
    params: &ParameterSet,
) -> Result<DynamicImage, StepError> {
    let threshold = params.int("threshold")?;
    let invert = params.bool("invert")?;
    Ok(binarize(&image.to_luma8(), invert, |v| i64::from(v) > threshold))
}

/// Pixels brighter than the Otsu level become 255, all others 0.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if `invert` is missing.
pub fn otsu_threshold(
    image: &DynamicImage,
    params: &ParameterSet,
) -> Result<DynamicImage, StepError> {
    let invert = params.bool("invert")?;
    let gray = image.to_luma8();
    let level = imageproc::contrast::otsu_level(&gray);
    tracing::debug!(level, "otsu threshold");
    Ok(binarize(&gray, invert, |v| v > level))
}

/// Pixels strictly between the two thresholds become 255, all others 0.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if a parameter is missing, or
/// [`StepError::Other`] if the lower threshold exceeds the upper one.
pub fn range_threshold(
    image: &DynamicImage,
    params: &ParameterSet,
) -> Result<DynamicImage, StepError> {
    let lower = params.int("lower_threshold")?;
    let upper = params.int("upper_threshold")?;
    if lower > upper {
        return Err(StepError::Other(format!(
            "lower bound {lower} exceeds upper bound {upper}"
        )));
    }
    let invert = params.bool("invert")?;
    Ok(binarize(&image.to_luma8(), invert, |v| {
        let v = i64::from(v);
        lower < v && v < upper
    }))
}

fn binarize(gray: &GrayImage, invert: bool, is_foreground: impl Fn(u8) -> bool) -> DynamicImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        if is_foreground(src.0[0]) != invert {
            *dst = Luma([FOREGROUND]);
        }
    }
    DynamicImage::ImageLuma8(out)
}

//! Smoothing filters: the `Converted -> Preprocessed` steps.
//!
//! Both filters reduce high-frequency noise that would otherwise survive
//! thresholding as speckles or ragged contour edges.

use image::GrayImage;

use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::types::{DynamicImage, StepError};

/// Registered name of the mean (box) filter.
pub const MEAN_FILTER: &str = "mean_filter";

/// Registered name of the Gaussian blur.
pub const GAUSSIAN_BLUR: &str = "gaussian_blur";

/// Mean filter over a square kernel of odd size.
#[must_use]
pub fn mean_filter_step() -> ProcessStep {
    ProcessStep::new(
        MEAN_FILTER,
        StepFunction::Preprocess(mean_filter),
        ParameterSet::from_distinct(vec![
            Parameter::int_range_stepped("kernelsize", 3, 1, 47, 2)
                .with_description("side length of the averaging kernel"),
        ]),
    )
}

/// Gaussian blur with a configurable sigma.
#[must_use]
pub fn gaussian_blur_step() -> ProcessStep {
    ProcessStep::new(
        GAUSSIAN_BLUR,
        StepFunction::Preprocess(gaussian),
        ParameterSet::from_distinct(vec![
            Parameter::float_range("sigma", 1.4, 0.0, 20.0, 0.1)
                .with_description("standard deviation of the kernel"),
        ]),
    )
}

/// Replace each pixel with the mean of its `kernelsize` square
/// neighborhood.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if `kernelsize` is missing.
pub fn mean_filter(image: &DynamicImage, params: &ParameterSet) -> Result<DynamicImage, StepError> {
    let kernelsize = params.int("kernelsize")?;
    let radius = u32::try_from((kernelsize - 1) / 2).unwrap_or(0);
    let gray = image.to_luma8();
    if radius == 0 {
        return Ok(DynamicImage::ImageLuma8(gray));
    }
    Ok(DynamicImage::ImageLuma8(imageproc::filter::box_filter(
        &gray, radius, radius,
    )))
}

/// Gaussian blur of the grayscale image.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if `sigma` is missing.
#[allow(clippy::cast_possible_truncation)]
pub fn gaussian(image: &DynamicImage, params: &ParameterSet) -> Result<DynamicImage, StepError> {
    let sigma = params.float("sigma")? as f32;
    Ok(DynamicImage::ImageLuma8(gaussian_blur(
        &image.to_luma8(),
        sigma,
    )))
}

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Create a test image with a sharp black-to-white boundary at x=5.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn zero_sigma_returns_clone() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur(&img, 0.0), img);
        assert_eq!(gaussian_blur(&img, -1.0), img);
    }

    #[test]
    fn blur_softens_the_edge() {
        let blurred = gaussian_blur(&sharp_edge_image(), 1.5);
        let left = blurred.get_pixel(4, 5).0[0];
        let right = blurred.get_pixel(5, 5).0[0];
        assert!(left > 0, "left of edge should brighten, got {left}");
        assert!(right < 255, "right of edge should darken, got {right}");
    }

    #[test]
    fn mean_filter_averages_neighbors() {
        let mut img = GrayImage::new(5, 5);
        img.put_pixel(2, 2, image::Luma([90]));
        let step = mean_filter_step();
        let out = mean_filter(&DynamicImage::ImageLuma8(img), step.parameters())
            .unwrap()
            .to_luma8();
        assert_eq!(out.get_pixel(2, 2).0[0], 10);
        assert_eq!(out.get_pixel(1, 1).0[0], 10);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn kernel_size_one_is_identity() {
        let img = DynamicImage::ImageLuma8(sharp_edge_image());
        let mut step = mean_filter_step();
        step.set_parameter("kernelsize", 1).unwrap();
        let out = mean_filter(&img, step.parameters()).unwrap();
        assert_eq!(out.to_luma8(), sharp_edge_image());
    }

    #[test]
    fn even_kernel_size_is_rejected() {
        let mut step = mean_filter_step();
        assert!(step.set_parameter("kernelsize", 4).is_err());
    }

    #[test]
    fn preserves_dimensions() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(17, 31));
        let out = gaussian(&img, gaussian_blur_step().parameters()).unwrap();
        assert_eq!((out.width(), out.height()), (17, 31));
    }
}

//! Contour finding: the `Postprocessed -> FeaturesExtracted` step.
//!
//! Runs Suzuki-Abe border following via
//! [`imageproc::contours::find_contours`] and keeps outer borders only.
//! Hole borders never describe a feature of their own; they are part of
//! the region whose outer border encloses them.

use image::GrayImage;
use imageproc::contours::BorderType;

use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::types::{Contour, DynamicImage, Point, StepError};

/// Registered name of the contour finder.
pub const NAME: &str = "find_contours";

/// Selects which outer borders to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalMode {
    /// Only top-level regions; islands inside holes are dropped.
    #[default]
    External,
    /// Every outer border, including islands inside holes.
    All,
}

impl RetrievalMode {
    /// Parameter option name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::All => "all",
        }
    }

    fn parse(name: &str) -> Result<Self, StepError> {
        match name {
            "external" => Ok(Self::External),
            "all" => Ok(Self::All),
            other => Err(StepError::Other(format!("unknown retrieval mode `{other}`"))),
        }
    }

    /// Trace contours in a binary image (non-zero pixels are foreground).
    #[must_use]
    pub fn trace(self, binary: &GrayImage) -> Vec<Contour> {
        let contours: Vec<imageproc::contours::Contour<u32>> =
            imageproc::contours::find_contours(binary);

        contours
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter(|c| self == Self::All || c.parent.is_none())
            .map(|c| {
                let points = c
                    .points
                    .into_iter()
                    .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                    .collect();
                Contour::new(points)
            })
            .collect()
    }
}

/// The contour finder step.
#[must_use]
pub fn step() -> ProcessStep {
    ProcessStep::new(
        NAME,
        StepFunction::ExtractFeatures(find_contours),
        ParameterSet::from_distinct(vec![Parameter::choice(
            "mode",
            &[RetrievalMode::External.name(), RetrievalMode::All.name()],
        )]),
    )
}

/// Find the outer contours of the foreground regions of `image`.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if `mode` is missing, or
/// [`StepError::Other`] for an unknown mode.
pub fn find_contours(
    image: &DynamicImage,
    params: &ParameterSet,
) -> Result<Vec<Contour>, StepError> {
    let mode = RetrievalMode::parse(params.text("mode")?)?;
    let contours = mode.trace(&image.to_luma8());
    tracing::debug!(count = contours.len(), mode = mode.name(), "found contours");
    Ok(contours)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(img: &mut GrayImage, from: u32, to: u32, value: u8) {
        for y in from..to {
            for x in from..to {
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }

    /// A filled square with a hole, and an island inside the hole.
    fn nested() -> GrayImage {
        let mut img = GrayImage::new(30, 30);
        fill(&mut img, 2, 28, 255);
        fill(&mut img, 8, 22, 0);
        fill(&mut img, 12, 18, 255);
        img
    }

    #[test]
    fn default_is_external() {
        assert_eq!(RetrievalMode::default(), RetrievalMode::External);
    }

    #[test]
    fn empty_image_produces_no_contours() {
        let img = GrayImage::new(10, 10);
        assert!(RetrievalMode::External.trace(&img).is_empty());
    }

    #[test]
    fn rectangle_produces_one_contour() {
        let mut img = GrayImage::new(20, 20);
        fill(&mut img, 5, 15, 255);
        let result = RetrievalMode::External.trace(&img);
        assert_eq!(result.len(), 1);
        let (lo, hi) = result[0].bounds().unwrap();
        assert_eq!(lo, Point::new(5.0, 5.0));
        assert_eq!(hi, Point::new(14.0, 14.0));
    }

    #[test]
    fn external_ignores_islands_in_holes() {
        assert_eq!(RetrievalMode::External.trace(&nested()).len(), 1);
        assert_eq!(RetrievalMode::All.trace(&nested()).len(), 2);
    }

    #[test]
    fn step_uses_mode_parameter() {
        let img = DynamicImage::ImageLuma8(nested());
        let mut step = step();
        assert_eq!(find_contours(&img, step.parameters()).unwrap().len(), 1);
        step.set_parameter("mode", "all").unwrap();
        assert_eq!(find_contours(&img, step.parameters()).unwrap().len(), 2);
    }
}

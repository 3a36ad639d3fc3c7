//! Feature selection: the `FeaturesExtracted -> FeaturesFiltered` step.

use crate::geometry;
use crate::metadata::Metadata;
use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::types::{Contour, StepError};

/// Registered name of the form filter.
pub const NAME: &str = "form_filter";

/// Keep contours by size, compactness and position.
#[must_use]
pub fn step() -> ProcessStep {
    ProcessStep::new(
        NAME,
        StepFunction::FilterFeatures(form_filter),
        ParameterSet::from_distinct(vec![
            Parameter::int_range("minimal_area", 100, 0, 10_000)
                .with_description("smallest enclosed area in square pixels"),
            Parameter::float_range("solidity_limit", 0.9, 0.0, 1.0, 0.01)
                .with_description("smallest ratio of area to convex hull area"),
            Parameter::boolean("exclude_border", true)
                .with_description("drop features touching the image border"),
        ]),
    )
}

/// Keep contours with area above `minimal_area` and solidity above
/// `solidity_limit`, optionally dropping those that touch the border.
///
/// # Errors
///
/// Returns [`StepError::MissingInput`] if the metadata lacks contours or
/// the image shape, or [`StepError::Parameter`] if a parameter is
/// missing.
#[allow(clippy::cast_precision_loss)]
pub fn form_filter(metadata: &Metadata, params: &ParameterSet) -> Result<Vec<Contour>, StepError> {
    let contours = metadata
        .contours()
        .ok_or(StepError::MissingInput(Metadata::CONTOURS))?;
    let shape = metadata
        .image_shape()
        .ok_or(StepError::MissingInput(Metadata::IMAGE_SHAPE))?;
    let minimal_area = params.int("minimal_area")? as f64;
    let solidity_limit = params.float("solidity_limit")?;
    let exclude_border = params.bool("exclude_border")?;

    let kept: Vec<Contour> = contours
        .iter()
        .filter(|c| geometry::area(c) > minimal_area)
        .filter(|c| geometry::solidity(c) > solidity_limit)
        .filter(|c| !(exclude_border && geometry::touches_border(c, shape)))
        .cloned()
        .collect();
    tracing::debug!(before = contours.len(), after = kept.len(), "filtered contours");
    Ok(kept)
}

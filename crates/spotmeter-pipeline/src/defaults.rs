//! The default spot-measuring pipeline.
//!
//! Read, convert to grey, mean filter, fixed threshold, no
//! postprocessing, outer contours, form filter, ellipse analysis. The
//! tunable values live in [`DefaultPipelineConfig`].

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::stage::Stage;
use crate::types::PipelineError;
use crate::{analysis, blur, contour, convert, filter, morphology, read, threshold};

/// Parameters of the default pipeline.
///
/// Every field is written through the validated parameter API, so
/// [`default_pipeline`] rejects values outside the parameter ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultPipelineConfig {
    /// Binarization threshold; brighter pixels are foreground.
    pub threshold: i64,

    /// Side length of the mean filter kernel. Must be odd.
    pub kernel_size: i64,

    /// Features with an area at or below this are dropped (square pixels).
    pub minimal_area: i64,

    /// Features with a solidity at or below this are dropped.
    pub solidity_limit: f64,

    /// Whether features touching the image border are dropped.
    pub exclude_border: bool,

    /// Length scale for calibrated result columns; 0 disables them.
    pub pixels_per_micron: f64,
}

impl DefaultPipelineConfig {
    /// Default for [`threshold`](Self::threshold).
    pub const DEFAULT_THRESHOLD: i64 = 100;
    /// Default for [`kernel_size`](Self::kernel_size).
    pub const DEFAULT_KERNEL_SIZE: i64 = 3;
    /// Default for [`minimal_area`](Self::minimal_area).
    pub const DEFAULT_MINIMAL_AREA: i64 = 4000;
    /// Default for [`solidity_limit`](Self::solidity_limit).
    pub const DEFAULT_SOLIDITY_LIMIT: f64 = 0.98;
    /// Default for [`exclude_border`](Self::exclude_border).
    pub const DEFAULT_EXCLUDE_BORDER: bool = true;
    /// Default for [`pixels_per_micron`](Self::pixels_per_micron).
    pub const DEFAULT_PIXELS_PER_MICRON: f64 = 0.0;
}

impl Default for DefaultPipelineConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            kernel_size: Self::DEFAULT_KERNEL_SIZE,
            minimal_area: Self::DEFAULT_MINIMAL_AREA,
            solidity_limit: Self::DEFAULT_SOLIDITY_LIMIT,
            exclude_border: Self::DEFAULT_EXCLUDE_BORDER,
            pixels_per_micron: Self::DEFAULT_PIXELS_PER_MICRON,
        }
    }
}

/// Build the default pipeline from `config`.
///
/// # Errors
///
/// Returns [`PipelineError::Parameter`] if a config value is out of
/// range for its step.
pub fn default_pipeline(config: &DefaultPipelineConfig) -> Result<Pipeline, PipelineError> {
    let mut pipeline = Pipeline::new([
        read::step(),
        convert::step(),
        blur::mean_filter_step(),
        threshold::binary_step(),
        morphology::nothing_step(),
        contour::step(),
        filter::step(),
        analysis::circle_step(),
    ]);
    pipeline.set_parameter(Stage::Converted, "kernelsize", config.kernel_size)?;
    pipeline.set_parameter(Stage::Preprocessed, "threshold", config.threshold)?;
    pipeline.set_parameter(Stage::FeaturesExtracted, "minimal_area", config.minimal_area)?;
    pipeline.set_parameter(Stage::FeaturesExtracted, "solidity_limit", config.solidity_limit)?;
    pipeline.set_parameter(Stage::FeaturesExtracted, "exclude_border", config.exclude_border)?;
    pipeline.set_parameter(
        Stage::FeaturesFiltered,
        "pixels_per_micron",
        config.pixels_per_micron,
    )?;
    Ok(pipeline)
}

//! Binary cleanup: the `Binarized -> Postprocessed` steps.

use imageproc::distance_transform::Norm;

use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::types::{DynamicImage, StepError};

/// Registered name of the pass-through postprocessor.
pub const NOTHING: &str = "postprocess_nothing";

/// Registered name of the morphological operator.
pub const MORPHOLOGY: &str = "morphology";

/// Operation options, in the order they are offered.
pub const OPERATIONS: [&str; 4] = ["open", "close", "dilate", "erode"];

/// A postprocessor that leaves the binary image unchanged.
#[must_use]
pub fn nothing_step() -> ProcessStep {
    ProcessStep::new(
        NOTHING,
        StepFunction::Postprocess(postprocess_nothing),
        ParameterSet::empty(),
    )
}

/// Morphological opening, closing, dilation or erosion with a square
/// structuring element.
#[must_use]
pub fn step() -> ProcessStep {
    ProcessStep::new(
        MORPHOLOGY,
        StepFunction::Postprocess(morphology),
        ParameterSet::from_distinct(vec![
            Parameter::choice("operation", &OPERATIONS),
            Parameter::int_range("radius", 1, 0, 20)
                .with_description("half side length of the structuring element"),
        ]),
    )
}

/// Return the input unchanged.
///
/// # Errors
///
/// Never fails.
pub fn postprocess_nothing(
    image: &DynamicImage,
    _: &ParameterSet,
) -> Result<DynamicImage, StepError> {
    Ok(image.clone())
}

/// Apply the selected morphological operation.
///
/// # Errors
///
/// Returns [`StepError::Parameter`] if a parameter is missing, or
/// [`StepError::Other`] for an unknown operation.
pub fn morphology(image: &DynamicImage, params: &ParameterSet) -> Result<DynamicImage, StepError> {
    let radius = u8::try_from(params.int("radius")?).unwrap_or(u8::MAX);
    let gray = image.to_luma8();
    if radius == 0 {
        return Ok(DynamicImage::ImageLuma8(gray));
    }
    let out = match params.text("operation")? {
        "open" => imageproc::morphology::open(&gray, Norm::LInf, radius),
        "close" => imageproc::morphology::close(&gray, Norm::LInf, radius),
        "dilate" => imageproc::morphology::dilate(&gray, Norm::LInf, radius),
        "erode" => imageproc::morphology::erode(&gray, Norm::LInf, radius),
        other => return Err(StepError::Other(format!("unknown operation `{other}`"))),
    };
    Ok(DynamicImage::ImageLuma8(out))
}

//! Process steps: a pure function bound to one input stage, plus the
//! parameters it is called with.
//!
//! # Outdated tracking
//!
//! A step starts out outdated. A successful [`ProcessStep::apply`]
//! clears the flag; any write through [`ProcessStep::set_parameter`]
//! sets it again. A failed apply leaves it untouched, so a step whose
//! function errored stays outdated until it succeeds.
//!
//! # Functions
//!
//! Wrapped functions are plain `fn` pointers. They capture nothing: every
//! input they need arrives as an argument or as a parameter, which is what
//! lets a pipeline be persisted as step names plus parameter values and
//! rebound through a [`ProcessRegistry`](crate::ProcessRegistry).

use std::fmt;
use std::path::{Path, PathBuf};

use crate::metadata::Metadata;
use crate::params::{ParamValue, ParameterError, ParameterSet};
use crate::stage::Stage;
use crate::table::Table;
use crate::types::{Contour, Dimensions, DynamicImage, PipelineError, StepError};

/// Reads the image at a path; returns it with extra metadata.
pub type ReadFn = fn(&Path, &ParameterSet) -> Result<(DynamicImage, Metadata), StepError>;

/// Maps an image to a processed image.
pub type ImageFn = fn(&DynamicImage, &ParameterSet) -> Result<DynamicImage, StepError>;

/// Finds contours in a binary image.
pub type ExtractFn = fn(&DynamicImage, &ParameterSet) -> Result<Vec<Contour>, StepError>;

/// Selects contours, given the full item metadata.
pub type FilterFn = fn(&Metadata, &ParameterSet) -> Result<Vec<Contour>, StepError>;

/// Measures contours, given the full item metadata.
pub type AnalyzeFn = fn(&Metadata, &ParameterSet) -> Result<Table, StepError>;

/// Writes results somewhere and reports where.
pub type StoreFn = fn(&StoreRequest<'_>, &ParameterSet) -> Result<StoredOutputs, StepError>;

/// Everything a writer may persist for one item.
#[derive(Debug, Clone, Copy)]
pub struct StoreRequest<'a> {
    /// The loaded source image, when the item is cached.
    pub image: Option<&'a DynamicImage>,
    /// The final contours.
    pub contours: &'a [Contour],
    /// Flattened results, as returned by
    /// [`ProcessingItem::get_data`](crate::ProcessingItem::get_data).
    pub data: &'a Table,
    /// Where the item came from.
    pub source: Option<&'a Path>,
    /// Size of the source image.
    pub shape: Option<Dimensions>,
}

/// Paths a writer produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredOutputs {
    /// Overlay image, if one was written.
    pub image_path: Option<PathBuf>,
    /// Data file, if one was written.
    pub data_path: Option<PathBuf>,
}

/// The role a step plays, one per stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `New -> Loaded`.
    Reader,
    /// `Loaded -> Converted`.
    Converter,
    /// `Converted -> Preprocessed`.
    Preprocessor,
    /// `Preprocessed -> Binarized`.
    Binarization,
    /// `Binarized -> Postprocessed`.
    Postprocessor,
    /// `Postprocessed -> FeaturesExtracted`.
    FeatureFinder,
    /// `FeaturesExtracted -> FeaturesFiltered`.
    FeatureFilter,
    /// `FeaturesFiltered -> Analyzed`.
    Analysis,
    /// `Analyzed -> Stored`.
    Writer,
}

impl StepKind {
    /// The stage an item must be at for this kind of step to apply.
    #[must_use]
    pub const fn input_stage(self) -> Stage {
        match self {
            Self::Reader => Stage::New,
            Self::Converter => Stage::Loaded,
            Self::Preprocessor => Stage::Converted,
            Self::Binarization => Stage::Preprocessed,
            Self::Postprocessor => Stage::Binarized,
            Self::FeatureFinder => Stage::Postprocessed,
            Self::FeatureFilter => Stage::FeaturesExtracted,
            Self::Analysis => Stage::FeaturesFiltered,
            Self::Writer => Stage::Analyzed,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A wrapped function, tagged with the transition it implements.
#[derive(Debug, Clone, Copy)]
pub enum StepFunction {
    /// See [`StepKind::Reader`].
    Read(ReadFn),
    /// See [`StepKind::Converter`].
    Convert(ImageFn),
    /// See [`StepKind::Preprocessor`].
    Preprocess(ImageFn),
    /// See [`StepKind::Binarization`].
    Binarize(ImageFn),
    /// See [`StepKind::Postprocessor`].
    Postprocess(ImageFn),
    /// See [`StepKind::FeatureFinder`].
    ExtractFeatures(ExtractFn),
    /// See [`StepKind::FeatureFilter`].
    FilterFeatures(FilterFn),
    /// See [`StepKind::Analysis`].
    Analyze(AnalyzeFn),
    /// See [`StepKind::Writer`].
    Store(StoreFn),
}

impl StepFunction {
    /// The role of this function.
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        match self {
            Self::Read(_) => StepKind::Reader,
            Self::Convert(_) => StepKind::Converter,
            Self::Preprocess(_) => StepKind::Preprocessor,
            Self::Binarize(_) => StepKind::Binarization,
            Self::Postprocess(_) => StepKind::Postprocessor,
            Self::ExtractFeatures(_) => StepKind::FeatureFinder,
            Self::FilterFeatures(_) => StepKind::FeatureFilter,
            Self::Analyze(_) => StepKind::Analysis,
            Self::Store(_) => StepKind::Writer,
        }
    }
}

/// Input handed to [`ProcessStep::apply`].
#[derive(Debug, Clone, Copy)]
pub enum StepInput<'a> {
    /// Source path, for readers.
    Path(&'a Path),
    /// Stage payload, for image steps and feature finders.
    Image(&'a DynamicImage),
    /// Item metadata, for filters and analyses.
    Metadata(&'a Metadata),
    /// Results to persist, for writers.
    Store(StoreRequest<'a>),
}

/// Output of [`ProcessStep::apply`]; the variant follows the step kind.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// Reader output.
    Loaded(DynamicImage, Metadata),
    /// Image step output.
    Image(DynamicImage),
    /// Feature finder or filter output.
    Contours(Vec<Contour>),
    /// Analysis output.
    Table(Table),
    /// Writer output.
    Stored(StoredOutputs),
}

/// A unit of work bound to exactly one stage transition.
#[derive(Debug, Clone)]
pub struct ProcessStep {
    name: String,
    function: StepFunction,
    parameters: ParameterSet,
    outdated: bool,
}

impl ProcessStep {
    /// Wrap `function` under `name`. The step starts out outdated.
    #[must_use]
    pub fn new(name: &str, function: StepFunction, parameters: ParameterSet) -> Self {
        Self {
            name: name.to_string(),
            function,
            parameters,
            outdated: true,
        }
    }

    /// Name the function is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The role of this step.
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        self.function.kind()
    }

    /// The stage an item must be at for this step to apply.
    #[must_use]
    pub const fn input_stage(&self) -> Stage {
        self.function.kind().input_stage()
    }

    /// The wrapped function.
    #[must_use]
    pub const fn function(&self) -> StepFunction {
        self.function
    }

    /// Current parameter values.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Whether the step has not run since its parameters last changed.
    #[must_use]
    pub const fn is_outdated(&self) -> bool {
        self.outdated
    }

    /// Write a parameter value and mark the step outdated.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if the name is unknown or the value is
    /// rejected; the step is left unchanged in that case.
    pub fn set_parameter(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ParameterError> {
        self.parameters.set(name, value.into())?;
        self.outdated = true;
        Ok(())
    }

    /// Force a recompute on the next outdated-driven apply.
    pub fn mark_outdated(&mut self) {
        self.outdated = true;
    }

    pub(crate) fn restore_outdated(&mut self, outdated: bool) {
        self.outdated = outdated;
    }

    /// Run the wrapped function on `input` with the current parameters.
    ///
    /// Clears the outdated flag on success only.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WrongInput`] if `input` does not fit the
    /// step kind, or [`PipelineError::Step`] if the function fails.
    pub fn apply(&mut self, input: StepInput<'_>) -> Result<StepOutput, PipelineError> {
        let params = &self.parameters;
        let result = match (self.function, input) {
            (StepFunction::Read(f), StepInput::Path(path)) => {
                f(path, params).map(|(image, extras)| StepOutput::Loaded(image, extras))
            }
            (
                StepFunction::Convert(f)
                | StepFunction::Preprocess(f)
                | StepFunction::Binarize(f)
                | StepFunction::Postprocess(f),
                StepInput::Image(image),
            ) => f(image, params).map(StepOutput::Image),
            (StepFunction::ExtractFeatures(f), StepInput::Image(image)) => {
                f(image, params).map(StepOutput::Contours)
            }
            (StepFunction::FilterFeatures(f), StepInput::Metadata(md)) => {
                f(md, params).map(StepOutput::Contours)
            }
            (StepFunction::Analyze(f), StepInput::Metadata(md)) => {
                f(md, params).map(StepOutput::Table)
            }
            (StepFunction::Store(f), StepInput::Store(request)) => {
                f(&request, params).map(StepOutput::Stored)
            }
            _ => return Err(self.wrong_input()),
        };
        let output = result.map_err(|source| PipelineError::Step {
            step: self.name.clone(),
            source,
        })?;
        self.outdated = false;
        tracing::debug!(step = %self.name, kind = %self.kind(), "applied process step");
        Ok(output)
    }

    pub(crate) fn wrong_input(&self) -> PipelineError {
        PipelineError::WrongInput {
            step: self.name.clone(),
            kind: self.kind(),
        }
    }
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.name, self.kind())?;
        write!(f, "{}", self.parameters)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::Parameter;
    use crate::types::GrayImage;

    fn add_offset(image: &DynamicImage, params: &ParameterSet) -> Result<DynamicImage, StepError> {
        let offset = u8::try_from(params.int("offset")?).unwrap_or(u8::MAX);
        let mut gray = image.to_luma8();
        for p in gray.pixels_mut() {
            p.0[0] = p.0[0].saturating_add(offset);
        }
        Ok(DynamicImage::ImageLuma8(gray))
    }

    fn always_fails(_: &DynamicImage, _: &ParameterSet) -> Result<DynamicImage, StepError> {
        Err(StepError::Degenerate("nothing to do".to_string()))
    }

    fn offset_step() -> ProcessStep {
        ProcessStep::new(
            "add_offset",
            StepFunction::Preprocess(add_offset),
            ParameterSet::new(vec![Parameter::int_range("offset", 10, 0, 255)]).unwrap(),
        )
    }

    #[test]
    fn kind_determines_input_stage() {
        let step = offset_step();
        assert_eq!(step.kind(), StepKind::Preprocessor);
        assert_eq!(step.input_stage(), Stage::Converted);
        assert_eq!(StepKind::Reader.input_stage(), Stage::New);
        assert_eq!(StepKind::Writer.input_stage(), Stage::Analyzed);
    }

    #[test]
    fn apply_clears_outdated_and_passes_parameters() {
        let mut step = offset_step();
        assert!(step.is_outdated());
        let image = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        let StepOutput::Image(out) = step.apply(StepInput::Image(&image)).unwrap() else {
            unreachable!("image step returns an image");
        };
        assert_eq!(out.to_luma8().get_pixel(0, 0).0[0], 10);
        assert!(!step.is_outdated());
    }

    #[test]
    fn parameter_write_marks_outdated() {
        let mut step = offset_step();
        let image = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        step.apply(StepInput::Image(&image)).unwrap();
        step.set_parameter("offset", 20).unwrap();
        assert!(step.is_outdated());
    }

    #[test]
    fn rejected_parameter_write_keeps_state() {
        let mut step = offset_step();
        let image = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        step.apply(StepInput::Image(&image)).unwrap();
        assert!(step.set_parameter("offset", 1000).is_err());
        assert!(!step.is_outdated());
        assert_eq!(step.parameters().int("offset").unwrap(), 10);
    }

    #[test]
    fn failure_keeps_outdated() {
        let mut step = ProcessStep::new(
            "always_fails",
            StepFunction::Binarize(always_fails),
            ParameterSet::empty(),
        );
        let image = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        let err = step.apply(StepInput::Image(&image)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Step {
                source: StepError::Degenerate(_),
                ..
            }
        ));
        assert!(step.is_outdated());
    }

    #[test]
    fn wrong_input_is_rejected() {
        let mut step = offset_step();
        let md = Metadata::new();
        let err = step.apply(StepInput::Metadata(&md)).unwrap_err();
        assert!(matches!(err, PipelineError::WrongInput { .. }));
        assert!(step.is_outdated());
    }

    #[test]
    fn display_shows_name_kind_and_parameters() {
        assert_eq!(
            offset_step().to_string(),
            "add_offset (Preprocessor)\n- offset: 10\n"
        );
    }
}

//! Immutable processing items.
//!
//! A [`ProcessingItem`] is a cheap, clonable handle to one image at one
//! stage. Transitions never mutate: each returns a new item at the next
//! stage with its own metadata map. When the item is cached, the new item
//! also keeps handles to every earlier stage, so a later step can be
//! recomputed from an intermediate result without starting over.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::metadata::{MetaValue, Metadata};
use crate::stage::Stage;
use crate::step::{ProcessStep, StepInput, StepKind, StepOutput, StoreRequest};
use crate::table::{Cell, Table};
use crate::types::{Dimensions, DynamicImage, PipelineError};

struct ItemState {
    payload: Option<DynamicImage>,
    metadata: Metadata,
    stage: Stage,
    cached: bool,
    predecessors: BTreeMap<Stage, ProcessingItem>,
}

/// One image at one stage, plus everything known about it so far.
#[derive(Clone)]
pub struct ProcessingItem(Arc<ItemState>);

impl ProcessingItem {
    /// A `New` item pointing at a source file.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>, cached: bool) -> Self {
        Self::new(None, Metadata::with_source(path), Stage::New, cached)
    }

    /// An item at an arbitrary stage, without predecessors.
    ///
    /// Records the payload dimensions under
    /// [`Metadata::IMAGE_SHAPE`] when a payload is given.
    #[must_use]
    pub fn new(
        payload: Option<DynamicImage>,
        mut metadata: Metadata,
        stage: Stage,
        cached: bool,
    ) -> Self {
        if let Some(image) = &payload {
            metadata.insert(Metadata::IMAGE_SHAPE, MetaValue::Shape(Dimensions::of(image)));
        }
        Self(Arc::new(ItemState {
            payload,
            metadata,
            stage,
            cached,
            predecessors: BTreeMap::new(),
        }))
    }

    /// The stage this item is at.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.0.stage
    }

    /// The stage payload; `None` from `FeaturesExtracted` on, and before
    /// reading.
    #[must_use]
    pub fn payload(&self) -> Option<&DynamicImage> {
        self.0.payload.as_ref()
    }

    /// Everything accumulated so far.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.0.metadata
    }

    /// Whether earlier stages are kept.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.0.cached
    }

    /// Earlier stages, in stage order. Empty for uncached items.
    pub fn predecessors(&self) -> impl Iterator<Item = (Stage, &Self)> {
        self.0.predecessors.iter().map(|(s, p)| (*s, p))
    }

    /// Returns `true` if both handles refer to the same item.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This item or the predecessor at `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoPredecessor`] if no such item is kept.
    pub fn get_at_stage(&self, stage: Stage) -> Result<Self, PipelineError> {
        if stage == self.stage() {
            return Ok(self.clone());
        }
        self.0
            .predecessors
            .get(&stage)
            .cloned()
            .ok_or(PipelineError::NoPredecessor(stage))
    }

    /// The payload, or the latest cached predecessor's image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageNotCached`] if there is no payload
    /// and the item is not cached, or [`PipelineError::NoImage`] if no
    /// cached predecessor holds one either.
    pub fn image(&self) -> Result<&DynamicImage, PipelineError> {
        if let Some(image) = self.payload() {
            return Ok(image);
        }
        if !self.is_cached() {
            return Err(PipelineError::ImageNotCached);
        }
        self.0
            .predecessors
            .values()
            .rev()
            .find_map(|p| p.payload())
            .ok_or(PipelineError::NoImage)
    }

    /// Results flattened into a table: the analysis results with a
    /// `filename` column, or one row of scalar metadata if there are none.
    #[must_use]
    pub fn get_data(&self) -> Table {
        let md = self.metadata();
        md.results().map_or_else(
            || Table::single_row(md.to_row()),
            |results| {
                let mut table = results.clone();
                let filename = md
                    .source()
                    .map_or(Cell::Missing, |p| Cell::Text(p.display().to_string()));
                table.set_constant_column("filename", &filename);
                table
            },
        )
    }

    /// `New -> Loaded`: read the source file.
    ///
    /// Entries the reader returns are merged into the metadata; existing
    /// entries take precedence.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, a missing source path, or
    /// a reader error.
    pub fn read(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Reader, "read an image")?;
        let source = self
            .metadata()
            .source()
            .ok_or(PipelineError::MissingMetadata(Metadata::SOURCE))?
            .to_path_buf();
        let StepOutput::Loaded(image, extras) = step.apply(StepInput::Path(&source))? else {
            return Err(step.wrong_input());
        };
        let mut metadata = self.metadata().clone();
        metadata.merge_missing(extras);
        self.advance_with_image(image, metadata)
    }

    /// `Loaded -> Converted`.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, a missing image, or a
    /// function error.
    pub fn convert(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Converter, "convert")?;
        self.map_image(step)
    }

    /// `Converted -> Preprocessed`.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, a missing image, or a
    /// function error.
    pub fn preprocess(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Preprocessor, "preprocess")?;
        self.map_image(step)
    }

    /// `Preprocessed -> Binarized`.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, a missing image, or a
    /// function error.
    pub fn binarize(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Binarization, "binarize")?;
        self.map_image(step)
    }

    /// `Binarized -> Postprocessed`.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, a missing image, or a
    /// function error.
    pub fn postprocess(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Postprocessor, "postprocess")?;
        self.map_image(step)
    }

    /// `Postprocessed -> FeaturesExtracted`: find contours and drop the
    /// payload.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, a missing image, or a
    /// function error.
    pub fn extract_features(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::FeatureFinder, "extract features")?;
        let image = self.image()?;
        let StepOutput::Contours(contours) = step.apply(StepInput::Image(image))? else {
            return Err(step.wrong_input());
        };
        let mut metadata = self.metadata().clone();
        metadata.insert(Metadata::IMAGE_SHAPE, MetaValue::Shape(Dimensions::of(image)));
        metadata.insert(Metadata::CONTOURS, MetaValue::Contours(Arc::new(contours)));
        self.advance(None, metadata)
    }

    /// `FeaturesExtracted -> FeaturesFiltered`: replace the contours with
    /// the selected ones.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, missing contours or image
    /// shape, or a function error.
    pub fn filter_features(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::FeatureFilter, "filter features")?;
        self.require(&[Metadata::CONTOURS, Metadata::IMAGE_SHAPE])?;
        let StepOutput::Contours(contours) = step.apply(StepInput::Metadata(self.metadata()))?
        else {
            return Err(step.wrong_input());
        };
        let mut metadata = self.metadata().clone();
        metadata.insert(Metadata::CONTOURS, MetaValue::Contours(Arc::new(contours)));
        self.advance(None, metadata)
    }

    /// `FeaturesFiltered -> Analyzed`: measure the contours.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch, missing contours, or a
    /// function error.
    pub fn analyze(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Analysis, "analyze")?;
        self.require(&[Metadata::CONTOURS])?;
        let StepOutput::Table(results) = step.apply(StepInput::Metadata(self.metadata()))? else {
            return Err(step.wrong_input());
        };
        let mut metadata = self.metadata().clone();
        metadata.insert(Metadata::RESULTS, MetaValue::Table(Arc::new(results)));
        self.advance(None, metadata)
    }

    /// `Analyzed -> Stored`: hand the results to a writer and record the
    /// paths it reports.
    ///
    /// The loaded image is passed along only when it is still available.
    ///
    /// # Errors
    ///
    /// Fails on a stage or step kind mismatch or a writer error.
    pub fn store(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        self.check(step, StepKind::Writer, "store")?;
        let loaded = self.get_at_stage(Stage::Loaded).ok();
        let data = self.get_data();
        let request = StoreRequest {
            image: loaded.as_ref().and_then(|item| item.payload()),
            contours: self.metadata().contours().unwrap_or_default(),
            data: &data,
            source: self.metadata().source(),
            shape: self.metadata().image_shape(),
        };
        let StepOutput::Stored(outputs) = step.apply(StepInput::Store(request))? else {
            return Err(step.wrong_input());
        };
        let mut metadata = self.metadata().clone();
        if let Some(path) = outputs.image_path {
            metadata.insert(Metadata::OUTPUT_IMAGE_PATH, MetaValue::Path(path));
        }
        if let Some(path) = outputs.data_path {
            metadata.insert(Metadata::OUTPUT_DATA_PATH, MetaValue::Path(path));
        }
        self.advance(None, metadata)
    }

    /// Apply `step` through the transition matching its input stage.
    ///
    /// # Errors
    ///
    /// Propagates the error of the selected transition.
    pub fn do_process_at_stage(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        match step.kind() {
            StepKind::Reader => self.read(step),
            StepKind::Converter => self.convert(step),
            StepKind::Preprocessor => self.preprocess(step),
            StepKind::Binarization => self.binarize(step),
            StepKind::Postprocessor => self.postprocess(step),
            StepKind::FeatureFinder => self.extract_features(step),
            StepKind::FeatureFilter => self.filter_features(step),
            StepKind::Analysis => self.analyze(step),
            StepKind::Writer => self.store(step),
        }
    }

    fn check(
        &self,
        step: &ProcessStep,
        kind: StepKind,
        transition: &'static str,
    ) -> Result<(), PipelineError> {
        if step.kind() != kind {
            return Err(PipelineError::WrongTransition {
                step: step.name().to_string(),
                kind: step.kind(),
                transition,
            });
        }
        if self.stage() != step.input_stage() {
            return Err(PipelineError::StageMismatch {
                step: step.name().to_string(),
                expected: step.input_stage(),
                actual: self.stage(),
            });
        }
        Ok(())
    }

    fn require(&self, keys: &[&'static str]) -> Result<(), PipelineError> {
        for key in keys {
            if !self.metadata().contains(key) {
                return Err(PipelineError::MissingMetadata(key));
            }
        }
        Ok(())
    }

    fn map_image(&self, step: &mut ProcessStep) -> Result<Self, PipelineError> {
        let StepOutput::Image(image) = step.apply(StepInput::Image(self.image()?))? else {
            return Err(step.wrong_input());
        };
        self.advance_with_image(image, self.metadata().clone())
    }

    fn advance_with_image(
        &self,
        image: DynamicImage,
        mut metadata: Metadata,
    ) -> Result<Self, PipelineError> {
        metadata.insert(Metadata::IMAGE_SHAPE, MetaValue::Shape(Dimensions::of(&image)));
        self.advance(Some(image), metadata)
    }

    /// The item one stage on, carrying this item's history if cached.
    fn advance(
        &self,
        payload: Option<DynamicImage>,
        metadata: Metadata,
    ) -> Result<Self, PipelineError> {
        let stage = self
            .stage()
            .next()
            .ok_or(PipelineError::TerminalStage(self.stage()))?;
        let predecessors = if self.is_cached() {
            let mut history: BTreeMap<Stage, Self> = self
                .0
                .predecessors
                .iter()
                .filter(|(s, _)| **s < self.stage())
                .map(|(s, p)| (*s, p.clone()))
                .collect();
            history.insert(self.stage(), self.clone());
            history
        } else {
            BTreeMap::new()
        };
        tracing::trace!(from = %self.stage(), to = %stage, "stage transition");
        Ok(Self(Arc::new(ItemState {
            payload,
            metadata,
            stage,
            cached: self.is_cached(),
            predecessors,
        })))
    }
}

impl fmt::Debug for ProcessingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingItem")
            .field("stage", &self.stage())
            .field("cached", &self.is_cached())
            .field("has_payload", &self.payload().is_some())
            .field("predecessors", &self.0.predecessors.keys().collect::<Vec<_>>())
            .field("metadata", self.metadata())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::ParameterSet;
    use crate::step::StepFunction;
    use crate::types::{GrayImage, StepError};

    fn invert(image: &DynamicImage, _: &ParameterSet) -> Result<DynamicImage, StepError> {
        let mut out = image.clone();
        out.invert();
        Ok(out)
    }

    fn first_pixel(item: &ProcessingItem) -> u8 {
        item.image().unwrap().to_luma8().get_pixel(0, 0).0[0]
    }

    fn gray_item(stage: Stage, cached: bool) -> ProcessingItem {
        ProcessingItem::new(
            Some(DynamicImage::ImageLuma8(GrayImage::new(4, 3))),
            Metadata::with_source("a.png"),
            stage,
            cached,
        )
    }

    fn step(function: StepFunction) -> ProcessStep {
        ProcessStep::new("invert", function, ParameterSet::empty())
    }

    #[test]
    fn constructor_records_shape() {
        let item = gray_item(Stage::Binarized, true);
        assert_eq!(
            item.metadata().image_shape(),
            Some(Dimensions {
                width: 4,
                height: 3
            })
        );
    }

    #[test]
    fn transition_advances_and_keeps_history() {
        let item = gray_item(Stage::Converted, true);
        let next = item.preprocess(&mut step(StepFunction::Preprocess(invert))).unwrap();
        assert_eq!(next.stage(), Stage::Preprocessed);
        assert!(next.get_at_stage(Stage::Converted).unwrap().ptr_eq(&item));
        assert!(next.get_at_stage(Stage::Preprocessed).unwrap().ptr_eq(&next));
        assert_eq!(first_pixel(&next), 255);
        assert_eq!(first_pixel(&item), 0);
    }

    #[test]
    fn uncached_items_keep_no_history() {
        let item = gray_item(Stage::Converted, false);
        let next = item.preprocess(&mut step(StepFunction::Preprocess(invert))).unwrap();
        assert_eq!(next.predecessors().count(), 0);
        assert!(matches!(
            next.get_at_stage(Stage::Converted),
            Err(PipelineError::NoPredecessor(Stage::Converted))
        ));
    }

    #[test]
    fn stage_mismatch_is_reported() {
        let item = gray_item(Stage::Loaded, true);
        let err = item
            .preprocess(&mut step(StepFunction::Preprocess(invert)))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageMismatch {
                expected: Stage::Converted,
                actual: Stage::Loaded,
                ..
            }
        ));
    }

    #[test]
    fn wrong_transition_is_reported() {
        let item = gray_item(Stage::Converted, true);
        let err = item
            .binarize(&mut step(StepFunction::Preprocess(invert)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::WrongTransition { .. }));
    }

    #[test]
    fn missing_image_without_cache() {
        let item = ProcessingItem::new(
            None,
            Metadata::with_source("a.png"),
            Stage::FeaturesExtracted,
            false,
        );
        assert!(matches!(item.image(), Err(PipelineError::ImageNotCached)));
    }

    #[test]
    fn get_data_without_results_is_one_metadata_row() {
        let item = gray_item(Stage::Binarized, false);
        let data = item.get_data();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get(0, "filepath"), Some(&Cell::Text("a.png".to_string())));
    }
}

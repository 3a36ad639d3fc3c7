//! Ordered sets of process steps, one per stage.
//!
//! A [`Pipeline`] drives a [`ProcessingItem`] through its stages. With a
//! cached item, [`Pipeline::apply_outdated_up_to_stage`] recomputes only
//! from the earliest step whose parameters changed, reusing every earlier
//! intermediate result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::ProcessingItem;
use crate::params::{ParamValue, ParameterSet};
use crate::registry::{ProcessRegistry, RegistryError};
use crate::stage::Stage;
use crate::step::ProcessStep;
use crate::types::PipelineError;

/// Version written into persisted pipelines.
pub const FORMAT_VERSION: u32 = 1;

/// Process steps keyed by input stage.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: BTreeMap<Stage, ProcessStep>,
}

impl Pipeline {
    /// Build a pipeline. When two steps share an input stage, the later
    /// one wins.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = ProcessStep>) -> Self {
        Self {
            steps: steps.into_iter().map(|s| (s.input_stage(), s)).collect(),
        }
    }

    /// Steps in stage order.
    pub fn steps(&self) -> impl Iterator<Item = &ProcessStep> {
        self.steps.values()
    }

    /// The step taking items at `stage`.
    #[must_use]
    pub fn step(&self, stage: Stage) -> Option<&ProcessStep> {
        self.steps.get(&stage)
    }

    /// Mutable access to the step taking items at `stage`.
    pub fn step_mut(&mut self, stage: Stage) -> Option<&mut ProcessStep> {
        self.steps.get_mut(&stage)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Write a parameter of the step at `stage`, marking it outdated.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingStep`] if there is no such step, or
    /// [`PipelineError::Parameter`] if the write is rejected.
    pub fn set_parameter(
        &mut self,
        stage: Stage,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), PipelineError> {
        self.steps
            .get_mut(&stage)
            .ok_or(PipelineError::MissingStep(stage))?
            .set_parameter(name, value)?;
        Ok(())
    }

    /// A copy with `step` in place of the step at its input stage. The
    /// original pipeline is unchanged.
    #[must_use]
    pub fn replaced_with(&self, step: ProcessStep) -> Self {
        let mut steps = self.steps.clone();
        steps.insert(step.input_stage(), step);
        Self { steps }
    }

    /// Lowest input stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPipeline`] if there are no steps.
    pub fn min_stage(&self) -> Result<Stage, PipelineError> {
        self.steps
            .keys()
            .next()
            .copied()
            .ok_or(PipelineError::EmptyPipeline)
    }

    /// The stage an item reaches after the last step.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPipeline`] if there are no steps.
    pub fn terminal_stage(&self) -> Result<Stage, PipelineError> {
        let last = self
            .steps
            .keys()
            .next_back()
            .copied()
            .ok_or(PipelineError::EmptyPipeline)?;
        last.next().ok_or(PipelineError::TerminalStage(last))
    }

    /// The earliest stage whose step is outdated.
    #[must_use]
    pub fn first_outdated_stage(&self) -> Option<Stage> {
        self.steps
            .iter()
            .find(|(_, s)| s.is_outdated())
            .map(|(stage, _)| *stage)
    }

    /// Apply the steps for stages `from..to` in order. Returns `item`
    /// itself when `from == to`.
    ///
    /// Every required step is looked up before anything runs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] if `from > to`,
    /// [`PipelineError::MissingStep`] if a stage in the range has no step,
    /// or the first error raised by a transition.
    pub fn apply_from_stage_to_stage(
        &mut self,
        item: &ProcessingItem,
        from: Stage,
        to: Stage,
    ) -> Result<ProcessingItem, PipelineError> {
        if from > to {
            return Err(PipelineError::InvalidRange { from, to });
        }
        let stages: Vec<Stage> = from.through(to).filter(|s| *s < to).collect();
        if let Some(missing) = stages.iter().find(|s| !self.steps.contains_key(*s)) {
            return Err(PipelineError::MissingStep(*missing));
        }
        tracing::debug!(%from, %to, "applying pipeline");
        let mut current = item.clone();
        for stage in stages {
            let step = self
                .steps
                .get_mut(&stage)
                .ok_or(PipelineError::MissingStep(stage))?;
            current = current.do_process_at_stage(step)?;
        }
        Ok(current)
    }

    /// Apply every step from the lowest input stage through the last.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPipeline`] if there are no steps, or
    /// any error of [`Self::apply_from_stage_to_stage`].
    pub fn apply_all_steps(
        &mut self,
        item: &ProcessingItem,
    ) -> Result<ProcessingItem, PipelineError> {
        let from = self.min_stage()?;
        let to = self.terminal_stage()?;
        self.apply_from_stage_to_stage(item, from, to)
    }

    /// Run every step still owed to `item`: from its stage through the
    /// terminal stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPipeline`] if there are no steps, or
    /// any error of [`Self::apply_from_stage_to_stage`].
    pub fn apply_at_stage(
        &mut self,
        item: &ProcessingItem,
    ) -> Result<ProcessingItem, PipelineError> {
        let to = self.terminal_stage()?;
        self.apply_from_stage_to_stage(item, item.stage(), to)
    }

    /// Bring `item` to `up_to`, recomputing from the earliest outdated
    /// step.
    ///
    /// If an outdated step lies before `up_to`, processing restarts from
    /// that step's input stage (or the item's own stage, if earlier) using
    /// the cached predecessor there. Otherwise the item is advanced when
    /// it is behind `up_to`, or its stored predecessor at `up_to` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoPredecessor`] if a restart point is not
    /// cached, or any error raised while applying steps.
    pub fn apply_outdated_up_to_stage(
        &mut self,
        item: &ProcessingItem,
        up_to: Stage,
    ) -> Result<ProcessingItem, PipelineError> {
        match self.first_outdated_stage() {
            Some(outdated) if outdated < up_to => {
                let start = outdated.min(item.stage());
                tracing::debug!(%outdated, %start, %up_to, "recomputing outdated steps");
                let base = item.get_at_stage(start)?;
                self.apply_from_stage_to_stage(&base, start, up_to)
            }
            _ if up_to > item.stage() => {
                self.apply_from_stage_to_stage(item, item.stage(), up_to)
            }
            _ => item.get_at_stage(up_to),
        }
    }

    /// Encode the pipeline as a JSON blob of step names, stages,
    /// parameter values and outdated flags.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, PipelineError> {
        let blob = PipelineBlob {
            format_version: FORMAT_VERSION,
            steps: self
                .steps
                .values()
                .map(|s| StepBlob {
                    name: s.name().to_string(),
                    input_stage: s.input_stage(),
                    outdated: s.is_outdated(),
                    parameters: s.parameters().clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&blob)?)
    }

    /// Decode a pipeline written by [`Self::to_json`], rebinding each
    /// step through `registry`.
    ///
    /// Stored parameter values are validated against the registered
    /// step's parameter kinds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] for malformed input,
    /// [`PipelineError::UnsupportedVersion`] for a foreign format,
    /// [`PipelineError::Registry`] for unknown steps or stage mismatches,
    /// or [`PipelineError::Parameter`] for rejected values.
    pub fn from_json(json: &str, registry: &ProcessRegistry) -> Result<Self, PipelineError> {
        let blob: PipelineBlob = serde_json::from_str(json)?;
        if blob.format_version != FORMAT_VERSION {
            return Err(PipelineError::UnsupportedVersion(blob.format_version));
        }
        let mut steps = Vec::with_capacity(blob.steps.len());
        for stored in blob.steps {
            let mut step = registry.instantiate(&stored.name)?;
            if step.input_stage() != stored.input_stage {
                return Err(RegistryError::StageMismatch {
                    name: stored.name,
                    registered: step.input_stage(),
                    stored: stored.input_stage,
                }
                .into());
            }
            for param in &stored.parameters {
                step.set_parameter(param.name(), param.value().clone())?;
            }
            step.restore_outdated(stored.outdated);
            steps.push(step);
        }
        Ok(Self::new(steps))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (stage, step) in &self.steps {
            write!(f, "[{stage}] {step}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct PipelineBlob {
    format_version: u32,
    steps: Vec<StepBlob>,
}

#[derive(Serialize, Deserialize)]
struct StepBlob {
    name: String,
    input_stage: Stage,
    outdated: bool,
    parameters: ParameterSet,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::params::Parameter;
    use crate::step::StepFunction;
    use crate::types::{DynamicImage, GrayImage, StepError};

    fn offset(image: &DynamicImage, params: &ParameterSet) -> Result<DynamicImage, StepError> {
        let by = u8::try_from(params.int("by")?).unwrap_or(u8::MAX);
        let mut gray = image.to_luma8();
        for p in gray.pixels_mut() {
            p.0[0] = p.0[0].saturating_add(by);
        }
        Ok(DynamicImage::ImageLuma8(gray))
    }

    fn offset_step(name: &str, function: fn(crate::step::ImageFn) -> StepFunction) -> ProcessStep {
        ProcessStep::new(
            name,
            function(offset),
            ParameterSet::new(vec![Parameter::int_range("by", 1, 0, 100)]).unwrap(),
        )
    }

    fn image_pipeline() -> Pipeline {
        Pipeline::new([
            offset_step("convert", StepFunction::Convert),
            offset_step("preprocess", StepFunction::Preprocess),
            offset_step("binarize", StepFunction::Binarize),
        ])
    }

    fn loaded(cached: bool) -> ProcessingItem {
        ProcessingItem::new(
            Some(DynamicImage::ImageLuma8(GrayImage::new(2, 2))),
            Metadata::with_source("a.png"),
            Stage::Loaded,
            cached,
        )
    }

    fn value(item: &ProcessingItem) -> u8 {
        item.image().unwrap().to_luma8().get_pixel(0, 0).0[0]
    }

    #[test]
    fn last_step_per_stage_wins() {
        let p = Pipeline::new([
            offset_step("first", StepFunction::Convert),
            offset_step("second", StepFunction::Convert),
        ]);
        assert_eq!(p.len(), 1);
        assert_eq!(p.step(Stage::Loaded).unwrap().name(), "second");
    }

    #[test]
    fn apply_all_runs_every_step_and_clears_outdated() {
        let mut p = image_pipeline();
        let out = p.apply_all_steps(&loaded(true)).unwrap();
        assert_eq!(out.stage(), Stage::Postprocessed);
        assert_eq!(value(&out), 3);
        assert!(p.first_outdated_stage().is_none());
    }

    #[test]
    fn equal_range_returns_input() {
        let mut p = image_pipeline();
        let item = loaded(true);
        let out = p
            .apply_from_stage_to_stage(&item, Stage::Loaded, Stage::Loaded)
            .unwrap();
        assert!(out.ptr_eq(&item));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut p = image_pipeline();
        let err = p
            .apply_from_stage_to_stage(&loaded(true), Stage::Binarized, Stage::Loaded)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRange { .. }));
    }

    #[test]
    fn missing_step_is_reported_before_running() {
        let mut p = image_pipeline();
        let err = p
            .apply_from_stage_to_stage(&loaded(true), Stage::Loaded, Stage::FeaturesExtracted)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingStep(Stage::Postprocessed)));
        assert_eq!(p.first_outdated_stage(), Some(Stage::Loaded));
    }

    #[test]
    fn empty_pipeline() {
        let mut p = Pipeline::default();
        assert!(matches!(
            p.apply_all_steps(&loaded(true)),
            Err(PipelineError::EmptyPipeline)
        ));
    }

    #[test]
    fn apply_at_stage_runs_remaining_steps() {
        let mut p = image_pipeline();
        let converted = p
            .apply_from_stage_to_stage(&loaded(true), Stage::Loaded, Stage::Converted)
            .unwrap();
        assert!(p.step(Stage::Converted).is_some_and(ProcessStep::is_outdated));
        let out = p.apply_at_stage(&converted).unwrap();
        assert_eq!(out.stage(), Stage::Postprocessed);
        assert_eq!(value(&out), 3);
        assert!(out.get_at_stage(Stage::Converted).unwrap().ptr_eq(&converted));
    }

    #[test]
    fn outdated_recompute_reuses_earlier_stages() {
        let mut p = image_pipeline();
        let first = p.apply_all_steps(&loaded(true)).unwrap();
        p.set_parameter(Stage::Converted, "by", 10).unwrap();
        let second = p
            .apply_outdated_up_to_stage(&first, Stage::Postprocessed)
            .unwrap();
        assert_eq!(value(&second), 12);
        for stage in [Stage::Loaded, Stage::Converted] {
            assert!(
                second
                    .get_at_stage(stage)
                    .unwrap()
                    .ptr_eq(&first.get_at_stage(stage).unwrap()),
                "{stage} was recomputed"
            );
        }
        assert!(
            !second
                .get_at_stage(Stage::Preprocessed)
                .unwrap()
                .ptr_eq(&first.get_at_stage(Stage::Preprocessed).unwrap())
        );
    }

    #[test]
    fn nothing_outdated_returns_cached_stage() {
        let mut p = image_pipeline();
        let done = p.apply_all_steps(&loaded(true)).unwrap();
        let back = p.apply_outdated_up_to_stage(&done, Stage::Converted).unwrap();
        assert!(back.ptr_eq(&done.get_at_stage(Stage::Converted).unwrap()));
    }

    #[test]
    fn nothing_outdated_advances_when_behind() {
        let mut p = image_pipeline();
        let item = p
            .apply_from_stage_to_stage(&loaded(true), Stage::Loaded, Stage::Converted)
            .unwrap();
        for step in p.steps.values_mut() {
            step.restore_outdated(false);
        }
        let out = p.apply_outdated_up_to_stage(&item, Stage::Postprocessed).unwrap();
        assert_eq!(out.stage(), Stage::Postprocessed);
    }

    #[test]
    fn replaced_with_leaves_original_alone() {
        let p = image_pipeline();
        let q = p.replaced_with(offset_step("other", StepFunction::Binarize));
        assert_eq!(p.step(Stage::Preprocessed).unwrap().name(), "binarize");
        assert_eq!(q.step(Stage::Preprocessed).unwrap().name(), "other");
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn display_lists_steps_in_order() {
        let text = image_pipeline().to_string();
        let convert = text.find("convert").unwrap();
        let binarize = text.find("binarize").unwrap();
        assert!(convert < binarize);
        assert!(text.contains("[loaded] convert (Converter)"));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let json = r#"{"format_version": 99, "steps": []}"#;
        assert!(matches!(
            Pipeline::from_json(json, &ProcessRegistry::new()),
            Err(PipelineError::UnsupportedVersion(99))
        ));
    }
}

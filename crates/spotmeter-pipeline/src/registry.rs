//! Name-keyed catalog of available process steps.
//!
//! Persisted pipelines store step names, not functions; loading resolves
//! each name here and rebinds the stored parameter values.

use std::collections::BTreeMap;

use crate::params::{Parameter, ParameterError, ParameterSet};
use crate::stage::Stage;
use crate::step::{ProcessStep, StepFunction};
use crate::{analysis, blur, contour, convert, filter, morphology, read, threshold};

/// Errors from registering or resolving steps.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// A step with this name is already registered.
    #[error("a process step named `{0}` is already registered")]
    Duplicate(String),

    /// No step with this name is registered.
    #[error("unknown process step `{0}`")]
    Unknown(String),

    /// A stored step claims a different input stage than the registered one.
    #[error("process step `{name}` takes stage {registered}, but stage {stored} was stored")]
    StageMismatch {
        /// Name of the step.
        name: String,
        /// Input stage of the registered function.
        registered: Stage,
        /// Input stage found in the stored pipeline.
        stored: Stage,
    },

    /// A plugin's parameter list is invalid.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Catalog of step templates, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    available: BTreeMap<String, ProcessStep>,
}

impl ProcessRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in step.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for step in [
            read::step(),
            convert::step(),
            blur::mean_filter_step(),
            blur::gaussian_blur_step(),
            threshold::binary_step(),
            threshold::otsu_step(),
            threshold::range_step(),
            morphology::nothing_step(),
            morphology::step(),
            contour::step(),
            filter::step(),
            analysis::circle_step(),
            analysis::line_step(),
        ] {
            registry.available.insert(step.name().to_string(), step);
        }
        registry
    }

    /// Add a step template.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken.
    pub fn register(&mut self, step: ProcessStep) -> Result<(), RegistryError> {
        if self.available.contains_key(step.name()) {
            return Err(RegistryError::Duplicate(step.name().to_string()));
        }
        tracing::debug!(name = step.name(), kind = %step.kind(), "registered process step");
        self.available.insert(step.name().to_string(), step);
        Ok(())
    }

    /// Wrap a user function and add it under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Parameter`] if two parameters share a name,
    /// or [`RegistryError::Duplicate`] if `name` is taken.
    pub fn register_plugin(
        &mut self,
        name: &str,
        function: StepFunction,
        parameters: Vec<Parameter>,
    ) -> Result<(), RegistryError> {
        let parameters = ParameterSet::new(parameters)?;
        self.register(ProcessStep::new(name, function, parameters))
    }

    /// Look up a template.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProcessStep> {
        self.available.get(name)
    }

    /// A fresh, outdated copy of the named template.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] if no step has this name.
    pub fn instantiate(&self, name: &str) -> Result<ProcessStep, RegistryError> {
        let mut step = self
            .available
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        step.mark_outdated();
        Ok(step)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.available.keys().map(String::as_str)
    }

    /// Names of the steps that take items at `stage`.
    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &str> {
        self.available
            .values()
            .filter(move |s| s.input_stage() == stage)
            .map(ProcessStep::name)
    }
}

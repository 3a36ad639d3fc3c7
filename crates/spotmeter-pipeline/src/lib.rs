//! spotmeter-pipeline: Staged image analysis pipeline (sans-IO apart from
//! reading the source image).
//!
//! An image moves through a fixed sequence of [`Stage`]s:
//! new -> loaded -> grey -> preprocessed -> binarized -> postprocessed ->
//! features extracted -> features filtered -> analyzed -> stored.
//!
//! Each transition is performed by a [`ProcessStep`]: a named, pluggable
//! function with a [`ParameterSet`] and an outdated flag. A [`Pipeline`]
//! holds at most one step per input stage and re-runs only what changed
//! since the last run, reusing the cached [`ProcessingItem`] history.
//!
//! Result files are written by steps registered from `spotmeter-io`; this
//! crate only reads source images.

pub mod analysis;
pub mod blur;
pub mod calibration;
pub mod contour;
pub mod convert;
pub mod defaults;
pub mod filter;
pub mod geometry;
pub mod item;
pub mod metadata;
pub mod morphology;
pub mod params;
pub mod pipeline;
pub mod preview;
pub mod read;
pub mod registry;
pub mod stage;
pub mod step;
pub mod table;
pub mod threshold;
pub mod types;

pub use calibration::{Calibration, CalibrationCatalog, CalibrationError};
pub use contour::RetrievalMode;
pub use defaults::{DefaultPipelineConfig, default_pipeline};
pub use item::ProcessingItem;
pub use metadata::{MetaValue, Metadata};
pub use params::{ParamKind, ParamValue, Parameter, ParameterError, ParameterSet};
pub use pipeline::{FORMAT_VERSION, Pipeline};
pub use preview::overlay;
pub use registry::{ProcessRegistry, RegistryError};
pub use stage::{STAGE_COUNT, Stage};
pub use step::{
    AnalyzeFn, ExtractFn, FilterFn, ImageFn, ProcessStep, ReadFn, StepFunction, StepInput,
    StepKind, StepOutput, StoreFn, StoreRequest, StoredOutputs,
};
pub use table::{Cell, Table, TableError};
pub use types::{
    Contour, Dimensions, DynamicImage, GrayImage, PipelineError, Point, RgbImage, StepError,
};

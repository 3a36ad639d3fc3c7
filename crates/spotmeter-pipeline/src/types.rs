//! Shared types for the spotmeter processing pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::params::ParameterError;
use crate::registry::RegistryError;
use crate::stage::Stage;
use crate::step::StepKind;

/// Re-export the image types so downstream crates can handle stage
/// payloads without depending on `image` directly.
pub use image::{DynamicImage, GrayImage, RgbImage};

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

/// The closed boundary of one connected image region, as an ordered
/// sequence of pixel-center points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from its boundary points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of boundary points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// All boundary points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Axis-aligned bounds as `(min, max)` corners, or `None` when empty.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let first = *self.0.first()?;
        Some(self.0.iter().fold((first, first), |(lo, hi), p| {
            (
                Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        }))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image payload.
    #[must_use]
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Error raised by a wrapped processing function.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// A parameter was missing or had the wrong type.
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// The source could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source could not be decoded or encoded as an image.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The source file is empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A metadata entry the function reads is absent.
    #[error("missing input `{0}`")]
    MissingInput(&'static str),

    /// The input had no usable geometry.
    #[error("degenerate input: {0}")]
    Degenerate(String),

    /// Any other failure reported by a plugin function.
    #[error("{0}")]
    Other(String),
}

/// Errors that can occur while building or applying a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A step was applied to an item at the wrong stage.
    #[error("step `{step}` expects an item at stage {expected}, but the item is at stage {actual}")]
    StageMismatch {
        /// Name of the step.
        step: String,
        /// The step's input stage.
        expected: Stage,
        /// The item's stage.
        actual: Stage,
    },

    /// A step was handed input that does not fit its kind.
    #[error("step `{step}` ({kind}) cannot process this input")]
    WrongInput {
        /// Name of the step.
        step: String,
        /// The step's kind.
        kind: StepKind,
    },

    /// A step was used for a transition of a different kind.
    #[error("step `{step}` is a {kind} and cannot be used to {transition}")]
    WrongTransition {
        /// Name of the step.
        step: String,
        /// The step's kind.
        kind: StepKind,
        /// The attempted transition.
        transition: &'static str,
    },

    /// No stage follows the given one.
    #[error("no stage follows stage {0}")]
    TerminalStage(Stage),

    /// `from` lies after `to`.
    #[error("invalid apply request: stage {from} is after stage {to}")]
    InvalidRange {
        /// First stage requested.
        from: Stage,
        /// Last stage requested.
        to: Stage,
    },

    /// No step is registered for a stage that has to be applied.
    #[error("no process step registered for stage {0}")]
    MissingStep(Stage),

    /// The pipeline holds no steps.
    #[error("pipeline has no process steps")]
    EmptyPipeline,

    /// The item has no predecessor at the requested stage.
    #[error("item has no predecessor at stage {0}")]
    NoPredecessor(Stage),

    /// The image payload was dropped and the item is not cached.
    #[error("image not found, has not been cached")]
    ImageNotCached,

    /// Neither the item nor any cached predecessor holds an image.
    #[error("no image found in item or its predecessors")]
    NoImage,

    /// A metadata entry required by a transition is absent.
    #[error("metadata entry `{0}` is missing or has the wrong type")]
    MissingMetadata(&'static str),

    /// A wrapped processing function failed.
    #[error("process step `{step}` failed: {source}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// What went wrong.
        #[source]
        source: StepError,
    },

    /// The step kind cannot render a preview.
    #[error("process step `{0}` has no preview")]
    PreviewUnavailable(String),

    /// A parameter write was rejected.
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// A step could not be resolved through the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A persisted pipeline could not be encoded or decoded.
    #[error("invalid pipeline data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted pipeline was written by an incompatible version.
    #[error("unsupported pipeline format version {0}")]
    UnsupportedVersion(u32),
}

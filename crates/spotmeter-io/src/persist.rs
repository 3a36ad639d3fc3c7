//! Pipeline files.
//!
//! A pipeline file holds the JSON blob produced by
//! [`Pipeline::to_json`]. Loading resolves step names through a
//! [`ProcessRegistry`], so plugins must be registered before their
//! pipelines can be read back.

use std::path::Path;

use spotmeter_pipeline::{Pipeline, ProcessRegistry};

use crate::IoError;
use crate::writer::write_file;

/// Save `pipeline` to `path`.
///
/// # Errors
///
/// Returns [`IoError::Pipeline`] if encoding fails or [`IoError::Io`] if
/// the file cannot be written.
pub fn save_pipeline(pipeline: &Pipeline, path: &Path) -> Result<(), IoError> {
    let json = pipeline.to_json()?;
    write_file(path, json.as_bytes())?;
    tracing::info!(path = %path.display(), steps = pipeline.len(), "saved pipeline");
    Ok(())
}

/// Load a pipeline from `path`.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be read, or
/// [`IoError::Pipeline`] if it is not a valid pipeline for `registry`.
pub fn load_pipeline(path: &Path, registry: &ProcessRegistry) -> Result<Pipeline, IoError> {
    let json = std::fs::read_to_string(path).map_err(|e| IoError::io(path, e))?;
    let pipeline = Pipeline::from_json(&json, registry)?;
    tracing::debug!(path = %path.display(), steps = pipeline.len(), "loaded pipeline");
    Ok(pipeline)
}

//! Batch processing: one saved pipeline, many images.
//!
//! Every image gets its own uncached item, is run through the whole
//! pipeline and contributes its [`ProcessingItem::get_data`] rows to one
//! concatenated table. The sequential path keeps input order. The
//! parallel path only guarantees that every image contributes its rows;
//! callers must not rely on their order.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use spotmeter_pipeline::{Pipeline, PipelineError, ProcessRegistry, ProcessingItem, Table};

use crate::IoError;
use crate::persist::load_pipeline;

/// Errors from a batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The pipeline file could not be loaded.
    #[error("failed to load pipeline: {0}")]
    Load(#[from] IoError),

    /// An image failed to process.
    #[error("failed to process {}: {source}", path.display())]
    Image {
        /// The image that failed.
        path: PathBuf,
        /// What went wrong.
        #[source]
        source: PipelineError,
    },
}

/// Run `pipeline` over the image at `path` and return its data rows.
///
/// # Errors
///
/// Returns the first [`PipelineError`] raised by a step.
pub fn process_image(pipeline: &mut Pipeline, path: &Path) -> Result<Table, PipelineError> {
    let item = ProcessingItem::from_file(path, false);
    let done = pipeline.apply_at_stage(&item)?;
    Ok(done.get_data())
}

/// Apply the pipeline saved at `pipeline_path` to every image and
/// concatenate the results.
///
/// With `parallel`, images are spread over the rayon thread pool and
/// each worker runs its own copy of the pipeline.
///
/// # Errors
///
/// Returns [`BatchError::Load`] if the pipeline file cannot be loaded,
/// or [`BatchError::Image`] for the first image that fails.
pub fn batch_process(
    pipeline_path: &Path,
    image_paths: &[PathBuf],
    parallel: bool,
    registry: &ProcessRegistry,
) -> Result<Table, BatchError> {
    let mut pipeline = load_pipeline(pipeline_path, registry)?;
    tracing::info!(
        pipeline = %pipeline_path.display(),
        images = image_paths.len(),
        parallel,
        "starting batch"
    );

    let tables: Vec<Table> = if parallel {
        image_paths
            .par_iter()
            .map_init(|| pipeline.clone(), |pipeline, path| run_one(pipeline, path))
            .collect::<Result<_, _>>()?
    } else {
        image_paths
            .iter()
            .map(|path| run_one(&mut pipeline, path))
            .collect::<Result<_, _>>()?
    };

    let table = Table::concat(&tables);
    tracing::info!(images = tables.len(), rows = table.len(), "batch finished");
    Ok(table)
}

fn run_one(pipeline: &mut Pipeline, path: &Path) -> Result<Table, BatchError> {
    let table = process_image(pipeline, path).map_err(|source| BatchError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(image = %path.display(), rows = table.len(), "processed image");
    Ok(table)
}

//! spotmeter-io: Filesystem collaborators for the spotmeter pipeline.
//!
//! Writes result tables and overlay images, saves and loads pipeline
//! files and calibration catalogs, and runs a saved pipeline over many
//! images. All encoding is delegated to `spotmeter-export`.

use std::path::{Path, PathBuf};

use spotmeter_export::ExportError;
use spotmeter_pipeline::{
    CalibrationError, PipelineError, ProcessRegistry, RegistryError, StepError,
};

pub mod batch;
pub mod catalog;
pub mod persist;
pub mod writer;

pub use batch::{BatchError, batch_process, process_image};
pub use catalog::load_catalog;
pub use persist::{load_pipeline, save_pipeline};
pub use writer::{FileWriter, ResultWriter};

/// Errors from filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Reading or writing a file failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A pipeline could not be encoded or restored.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An output could not be encoded.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// A calibration catalog is malformed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// A vector overlay was requested but the image size is unknown.
    #[error("cannot draw {}: image size unknown", .0.display())]
    UnknownShape(PathBuf),
}

impl IoError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<IoError> for StepError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Io { path, source } => Self::Io { path, source },
            IoError::Export(ExportError::Image(e)) => Self::Image(e),
            other => Self::Other(other.to_string()),
        }
    }
}

/// A registry with every built-in step plus the file writer.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if a built-in already uses the
/// writer's name.
pub fn registry() -> Result<ProcessRegistry, RegistryError> {
    let mut registry = ProcessRegistry::with_builtins();
    writer::register(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use spotmeter_pipeline::{Stage, StepKind};

    #[test]
    fn registry_includes_the_writer() {
        let registry = registry().unwrap();
        assert_eq!(
            registry.for_stage(Stage::Analyzed).collect::<Vec<_>>(),
            [writer::NAME]
        );
        assert_eq!(
            registry.get(writer::NAME).unwrap().kind(),
            StepKind::Writer
        );
    }

    #[test]
    fn io_errors_keep_their_path_as_step_errors() {
        let err = IoError::io(
            Path::new("out/a.csv"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let StepError::Io { path, .. } = StepError::from(err) else {
            unreachable!("expected an I/O step error");
        };
        assert_eq!(path, Path::new("out/a.csv"));
    }
}

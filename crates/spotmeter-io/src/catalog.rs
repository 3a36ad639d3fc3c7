//! Calibration catalog files.

use std::path::Path;

use spotmeter_pipeline::CalibrationCatalog;

use crate::IoError;

/// Read a calibration catalog from a JSON file.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be read, or
/// [`IoError::Calibration`] if it is malformed.
pub fn load_catalog(path: &Path) -> Result<CalibrationCatalog, IoError> {
    let json = std::fs::read_to_string(path).map_err(|e| IoError::io(path, e))?;
    Ok(CalibrationCatalog::from_json(&json)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.json");
        std::fs::write(&path, r#"{"axio": {"10x": 1.5}}"#).unwrap();
        let catalog = load_catalog(&path).unwrap();
        let cal = catalog.calibration("axio", "10x").unwrap();
        assert!((cal.pixels_per_micron() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load_catalog(&path), Err(IoError::Calibration(_))));
    }
}

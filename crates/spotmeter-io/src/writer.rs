//! Result writers: the `Analyzed -> Stored` step.
//!
//! A [`FileWriter`] chooses the output format from each target path's
//! extension. Data goes to `.json` as an array of records and to any
//! other extension as CSV. The overlay goes to `.svg` as vector contours
//! and fits, or to a raster format the `image` crate knows. An empty path
//! writes nothing.
//!
//! Paths may contain `{stem}`, which is replaced by the source file
//! stem, so one writer step can serve a whole batch.

use std::path::{Path, PathBuf};

use spotmeter_pipeline::{
    Parameter, ParameterError, ParameterSet, ProcessRegistry, ProcessStep, RegistryError,
    StepError, StepFunction, StoreRequest, StoredOutputs, Table, overlay,
};

use crate::IoError;

/// Registered name of the file writer.
pub const NAME: &str = "write_results";

/// Placeholder for the source file stem in output paths.
pub const STEM_PLACEHOLDER: &str = "{stem}";

/// Persists the outputs of one item.
pub trait ResultWriter {
    /// Write the overlay of contours and fits. Returns the written path,
    /// or `None` if nothing was written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    fn store_image(&self, request: &StoreRequest<'_>) -> Result<Option<PathBuf>, IoError>;

    /// Write the result table. Returns the written path, or `None` if
    /// nothing was written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    fn store_data(&self, data: &Table) -> Result<Option<PathBuf>, IoError>;
}

/// Writes outputs to files, picking formats by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileWriter {
    image_path: Option<PathBuf>,
    data_path: Option<PathBuf>,
}

impl FileWriter {
    /// A writer for the given targets; empty paths disable that output.
    #[must_use]
    pub fn new(image_path: impl Into<PathBuf>, data_path: impl Into<PathBuf>) -> Self {
        let non_empty = |p: PathBuf| (!p.as_os_str().is_empty()).then_some(p);
        Self {
            image_path: non_empty(image_path.into()),
            data_path: non_empty(data_path.into()),
        }
    }

    /// A writer from the `image_path` and `data_path` parameters, with
    /// `{stem}` expanded for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if a parameter is missing.
    pub fn from_parameters(
        params: &ParameterSet,
        source: Option<&Path>,
    ) -> Result<Self, ParameterError> {
        let stem = source
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let expand = |template: &str| template.replace(STEM_PLACEHOLDER, &stem);
        Ok(Self::new(
            expand(params.text("image_path")?),
            expand(params.text("data_path")?),
        ))
    }

    /// Overlay target.
    #[must_use]
    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    /// Data target.
    #[must_use]
    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }
}

impl ResultWriter for FileWriter {
    fn store_image(&self, request: &StoreRequest<'_>) -> Result<Option<PathBuf>, IoError> {
        let Some(path) = &self.image_path else {
            return Ok(None);
        };
        let bytes = if extension(path) == "svg" {
            let shape = request
                .shape
                .ok_or_else(|| IoError::UnknownShape(path.clone()))?;
            let title = request
                .source
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned());
            spotmeter_export::to_svg(
                request.contours,
                shape,
                Some(request.data),
                &spotmeter_export::SvgMetadata {
                    title: title.as_deref(),
                    ..spotmeter_export::SvgMetadata::default()
                },
            )
            .into_bytes()
        } else {
            let Some(image) = request.image else {
                tracing::warn!(path = %path.display(), "source image not cached, skipping overlay");
                return Ok(None);
            };
            let picture = overlay(image, request.contours, Some(request.data));
            spotmeter_export::encode_image(&picture, &extension(path))?
        };
        write_file(path, &bytes)?;
        Ok(Some(path.clone()))
    }

    fn store_data(&self, data: &Table) -> Result<Option<PathBuf>, IoError> {
        let Some(path) = &self.data_path else {
            return Ok(None);
        };
        let text = if extension(path) == "json" {
            spotmeter_export::to_json(data)?
        } else {
            spotmeter_export::to_csv(data)
        };
        write_file(path, text.as_bytes())?;
        Ok(Some(path.clone()))
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Write `bytes` to `path`, creating missing parent directories.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| IoError::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| IoError::io(path, e))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

fn parameters(image_path: &str, data_path: &str) -> Vec<Parameter> {
    vec![
        Parameter::text("image_path", image_path)
            .with_description("overlay output; `{stem}` is the source file stem"),
        Parameter::text("data_path", data_path)
            .with_description("results output; `.json` or CSV"),
    ]
}

/// A writer step with the given targets.
///
/// # Errors
///
/// Returns [`ParameterError`] if the parameter set cannot be built.
pub fn step(image_path: &str, data_path: &str) -> Result<ProcessStep, ParameterError> {
    Ok(ProcessStep::new(
        NAME,
        StepFunction::Store(write_results),
        ParameterSet::new(parameters(image_path, data_path))?,
    ))
}

/// Add the writer, with empty targets, to `registry`.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if the name is taken.
pub fn register(registry: &mut ProcessRegistry) -> Result<(), RegistryError> {
    registry.register_plugin(NAME, StepFunction::Store(write_results), parameters("", ""))
}

/// Store the overlay and the data of one item with a [`FileWriter`].
///
/// # Errors
///
/// Returns [`StepError`] if a parameter is missing or writing fails.
pub fn write_results(
    request: &StoreRequest<'_>,
    params: &ParameterSet,
) -> Result<StoredOutputs, StepError> {
    let writer = FileWriter::from_parameters(params, request.source)?;
    Ok(StoredOutputs {
        image_path: writer.store_image(request)?,
        data_path: writer.store_data(request.data)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use spotmeter_pipeline::{Cell, Contour, Dimensions, DynamicImage, GrayImage, Point};

    use super::*;

    fn data() -> Table {
        let mut table = Table::new(&["area_px2", "filename"]);
        table
            .push_row(vec![Cell::Float(16.0), Cell::Text("a.png".to_string())])
            .unwrap();
        table
    }

    fn square() -> Contour {
        Contour::new(vec![
            Point::new(2.0, 2.0),
            Point::new(6.0, 2.0),
            Point::new(6.0, 6.0),
            Point::new(2.0, 6.0),
        ])
    }

    fn request<'a>(
        image: Option<&'a DynamicImage>,
        contours: &'a [Contour],
        data: &'a Table,
    ) -> StoreRequest<'a> {
        StoreRequest {
            image,
            contours,
            data,
            source: Some(Path::new("images/a.png")),
            shape: Some(Dimensions {
                width: 10,
                height: 10,
            }),
        }
    }

    #[test]
    fn empty_paths_write_nothing() {
        let writer = FileWriter::new("", "");
        assert_eq!(writer, FileWriter::default());
        let contours = [square()];
        let data = data();
        assert_eq!(writer.store_image(&request(None, &contours, &data)).unwrap(), None);
        assert_eq!(writer.store_data(&data).unwrap(), None);
    }

    #[test]
    fn csv_and_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("out.csv");
        let json = dir.path().join("nested/out.json");
        FileWriter::new("", &csv).store_data(&data()).unwrap();
        FileWriter::new("", &json).store_data(&data()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&csv).unwrap(),
            "area_px2,filename\n16,a.png\n"
        );
        assert!(std::fs::read_to_string(&json).unwrap().contains("\"filename\": \"a.png\""));
    }

    #[test]
    fn raster_overlay_needs_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("overlay.png");
        let writer = FileWriter::new(&png, "");
        let contours = [square()];
        let data = data();
        assert_eq!(writer.store_image(&request(None, &contours, &data)).unwrap(), None);
        assert!(!png.exists());

        let image = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        let written = writer
            .store_image(&request(Some(&image), &contours, &data))
            .unwrap();
        assert_eq!(written.as_deref(), Some(png.as_path()));
        let decoded = image::open(&png).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(2, 2), &image::Rgb([0, 255, 0]));
    }

    #[test]
    fn svg_overlay_uses_the_shape() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("overlay.svg");
        let contours = [square()];
        let data = data();
        FileWriter::new(&svg, "")
            .store_image(&request(None, &contours, &data))
            .unwrap();
        let text = std::fs::read_to_string(&svg).unwrap();
        assert!(text.contains(r#"viewBox="0 0 10 10""#));
        assert!(text.contains("<title>a.png</title>"));
    }

    #[test]
    fn stem_is_expanded() {
        let step = step("out/{stem}_overlay.png", "out/{stem}.csv").unwrap();
        let writer =
            FileWriter::from_parameters(step.parameters(), Some(Path::new("x/img_01.tif")))
                .unwrap();
        assert_eq!(writer.image_path(), Some(Path::new("out/img_01_overlay.png")));
        assert_eq!(writer.data_path(), Some(Path::new("out/img_01.csv")));
    }

    #[test]
    fn write_results_reports_paths() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("{stem}.csv");
        let step = step("", data_path.to_str().unwrap()).unwrap();
        let contours = [square()];
        let data = data();
        let outputs = write_results(&request(None, &contours, &data), step.parameters()).unwrap();
        assert_eq!(outputs.image_path, None);
        assert_eq!(outputs.data_path, Some(dir.path().join("a.csv")));
        assert!(dir.path().join("a.csv").exists());
    }
}

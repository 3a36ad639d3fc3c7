//! Pixel to micron conversion.
//!
//! Result columns measured in pixels carry a `_px` suffix, areas a `_px2`
//! suffix. [`Calibration::calibrate`] adds the matching `_um` and `_um2`
//! columns next to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// Errors from building a calibration.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// The scale is zero, negative or not finite.
    #[error("pixels per micron must be positive and finite, got {0}")]
    InvalidScale(f64),

    /// The catalog has no such microscope.
    #[error("unknown microscope `{0}`")]
    UnknownMicroscope(String),

    /// The microscope has no such objective.
    #[error("microscope `{microscope}` has no objective `{objective}`")]
    UnknownObjective {
        /// Microscope name.
        microscope: String,
        /// Objective name.
        objective: String,
    },

    /// The catalog could not be parsed.
    #[error("invalid calibration catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A length scale in pixels per micron.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pixels_per_micron: f64,
}

impl Calibration {
    /// Create a calibration.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidScale`] unless the scale is
    /// positive and finite.
    pub fn new(pixels_per_micron: f64) -> Result<Self, CalibrationError> {
        if !(pixels_per_micron.is_finite() && pixels_per_micron > 0.0) {
            return Err(CalibrationError::InvalidScale(pixels_per_micron));
        }
        Ok(Self { pixels_per_micron })
    }

    /// The scale.
    #[must_use]
    pub const fn pixels_per_micron(&self) -> f64 {
        self.pixels_per_micron
    }

    /// Convert a length.
    #[must_use]
    pub fn pixel_to_micron(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_micron
    }

    /// Convert an area.
    #[must_use]
    pub fn squarepixel_to_squaremicron(&self, square_pixels: f64) -> f64 {
        square_pixels / (self.pixels_per_micron * self.pixels_per_micron)
    }

    /// Convert a length back.
    #[must_use]
    pub fn micron_to_pixel(&self, microns: f64) -> f64 {
        microns * self.pixels_per_micron
    }

    /// Convert an area back.
    #[must_use]
    pub fn squaremicron_to_squarepixel(&self, square_microns: f64) -> f64 {
        square_microns * self.pixels_per_micron * self.pixels_per_micron
    }

    /// A copy of `table` with a micron column appended for every pixel
    /// column.
    #[must_use]
    pub fn calibrate(&self, table: &Table) -> Table {
        let mut out = table.clone();
        for column in table.columns() {
            if let Some(stem) = column.strip_suffix("_px2") {
                out.push_derived_column(column, &format!("{stem}_um2"), |v| {
                    self.squarepixel_to_squaremicron(v)
                });
            } else if let Some(stem) = column.strip_suffix("_px") {
                out.push_derived_column(column, &format!("{stem}_um"), |v| {
                    self.pixel_to_micron(v)
                });
            }
        }
        out
    }
}

/// Known scales, keyed by microscope and objective.
///
/// The JSON form is `{ "<microscope>": { "<objective>": <pixels_per_micron> } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationCatalog(BTreeMap<String, BTreeMap<String, f64>>);

impl CalibrationCatalog {
    /// Parse a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::Parse`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, microscope: &str, objective: &str, pixels_per_micron: f64) {
        self.0
            .entry(microscope.to_string())
            .or_default()
            .insert(objective.to_string(), pixels_per_micron);
    }

    /// Microscope names, sorted.
    pub fn microscopes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Objective names of a microscope, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::UnknownMicroscope`] if there is no such
    /// microscope.
    pub fn objectives(&self, microscope: &str) -> Result<Vec<&str>, CalibrationError> {
        Ok(self
            .0
            .get(microscope)
            .ok_or_else(|| CalibrationError::UnknownMicroscope(microscope.to_string()))?
            .keys()
            .map(String::as_str)
            .collect())
    }

    /// The calibration for a microscope and objective.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is unknown or the stored scale is
    /// invalid.
    pub fn calibration(
        &self,
        microscope: &str,
        objective: &str,
    ) -> Result<Calibration, CalibrationError> {
        let scale = self
            .0
            .get(microscope)
            .ok_or_else(|| CalibrationError::UnknownMicroscope(microscope.to_string()))?
            .get(objective)
            .ok_or_else(|| CalibrationError::UnknownObjective {
                microscope: microscope.to_string(),
                objective: objective.to_string(),
            })?;
        Calibration::new(*scale)
    }
}

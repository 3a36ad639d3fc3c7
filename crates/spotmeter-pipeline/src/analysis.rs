//! Measurement: the `FeaturesFiltered -> Analyzed` steps.
//!
//! Both analyses read the contours from the item metadata and return a
//! [`Table`]. A positive `pixels_per_micron` appends calibrated columns;
//! zero leaves the table in pixels.

use crate::calibration::Calibration;
use crate::geometry;
use crate::metadata::Metadata;
use crate::params::{Parameter, ParameterSet};
use crate::step::{ProcessStep, StepFunction};
use crate::table::{Cell, Table};
use crate::types::{Point, StepError};

/// Registered name of the ellipse analysis.
pub const CIRCLE: &str = "circle_analysis";

/// Registered name of the line analysis.
pub const LINE: &str = "line_analysis";

/// Columns of the ellipse analysis, in order.
pub const CIRCLE_COLUMNS: [&str; 6] = [
    "area_px2",
    "ellipse_x_px",
    "ellipse_y_px",
    "ellipse_majorAxis_px",
    "ellipse_minorAxis_px",
    "ellipse_angle",
];

/// Columns of the line analysis, in order.
pub const LINE_COLUMNS: [&str; 10] = [
    "area_px2",
    "linewidth_px",
    "linewidth2_px",
    "bb_width_px",
    "bb_height_px",
    "bb_angle",
    "line_x",
    "line_y",
    "line_vx",
    "line_vy",
];

fn calibration_parameter() -> Parameter {
    Parameter::float_range("pixels_per_micron", 0.0, 0.0, 10_000.0, 0.001)
        .with_description("length scale; 0 keeps results in pixels")
}

/// One row per contour: area and the fitted ellipse.
#[must_use]
pub fn circle_step() -> ProcessStep {
    ProcessStep::new(
        CIRCLE,
        StepFunction::Analyze(circle_analysis),
        ParameterSet::from_distinct(vec![calibration_parameter()]),
    )
}

/// One row for all contours together: the width of a line-shaped
/// feature.
#[must_use]
pub fn line_step() -> ProcessStep {
    ProcessStep::new(
        LINE,
        StepFunction::Analyze(line_analysis),
        ParameterSet::from_distinct(vec![
            Parameter::int_range("linewidth_percentile", 95, 1, 100)
                .with_description("percentile of point distances taken as half width"),
            calibration_parameter(),
        ]),
    )
}

/// Fit an ellipse to every contour.
///
/// Contours that enclose no area get NaN ellipse cells.
///
/// # Errors
///
/// Returns [`StepError::MissingInput`] if the metadata has no contours,
/// or [`StepError::Parameter`] if a parameter is missing.
pub fn circle_analysis(metadata: &Metadata, params: &ParameterSet) -> Result<Table, StepError> {
    let contours = metadata
        .contours()
        .ok_or(StepError::MissingInput(Metadata::CONTOURS))?;
    let mut table = Table::new(&CIRCLE_COLUMNS);
    for (i, contour) in contours.iter().enumerate() {
        let area = geometry::area(contour);
        let row = geometry::fit_ellipse(contour).map_or_else(
            || {
                tracing::warn!(feature = i, points = contour.len(), "ellipse fit failed");
                vec![f64::NAN; 5]
            },
            |e| vec![e.center.x, e.center.y, e.major_axis, e.minor_axis, e.angle],
        );
        table
            .push_row(
                std::iter::once(area)
                    .chain(row)
                    .map(Cell::Float)
                    .collect(),
            )
            .map_err(|e| StepError::Other(e.to_string()))?;
    }
    calibrated(table, params)
}

/// Measure the width of the line formed by all contours.
///
/// The interior pixels of every contour are pooled, a straight line is
/// fitted through them, and the chosen percentile of their distances from
/// the line, doubled, is the line width. A second estimate divides the
/// area by the length of the first contour's minimum-area rectangle.
///
/// # Errors
///
/// Returns [`StepError::MissingInput`] if the metadata has no contours,
/// [`StepError::Degenerate`] if the pooled pixels do not define a line,
/// or [`StepError::Parameter`] if a parameter is missing.
#[allow(clippy::cast_precision_loss)]
pub fn line_analysis(metadata: &Metadata, params: &ParameterSet) -> Result<Table, StepError> {
    let contours = metadata
        .contours()
        .ok_or(StepError::MissingInput(Metadata::CONTOURS))?;
    let mut table = Table::new(&LINE_COLUMNS);
    let Some(first) = contours.first() else {
        return calibrated(table, params);
    };

    let pixels: Vec<Point> = contours.iter().flat_map(geometry::interior_pixels).collect();
    let line = geometry::fit_line(&pixels)
        .ok_or_else(|| StepError::Degenerate("line fit needs at least two pixels".to_string()))?;
    let distances: Vec<f64> = pixels.iter().map(|p| line.distance(*p)).collect();
    let pct = params.int("linewidth_percentile")? as f64;
    let half_width = geometry::percentile(&distances, pct).unwrap_or(f64::NAN);
    let area = pixels.len() as f64;
    let rect = geometry::min_area_rect(first);
    let (length, width, angle) = rect.map_or((f64::NAN, f64::NAN, f64::NAN), |r| {
        (r.length, r.width, r.angle)
    });
    let linewidth2 = if length > 0.0 { area / length } else { f64::NAN };

    table
        .push_row(
            [
                area,
                2.0 * half_width,
                linewidth2,
                length,
                width,
                angle,
                line.origin.x,
                line.origin.y,
                line.direction.x,
                line.direction.y,
            ]
            .into_iter()
            .map(Cell::Float)
            .collect(),
        )
        .map_err(|e| StepError::Other(e.to_string()))?;
    calibrated(table, params)
}

fn calibrated(table: Table, params: &ParameterSet) -> Result<Table, StepError> {
    let ppm = params.float("pixels_per_micron")?;
    if ppm <= 0.0 {
        return Ok(table);
    }
    let calibration = Calibration::new(ppm).map_err(|e| StepError::Other(e.to_string()))?;
    Ok(calibration.calibrate(&table))
}

//! Side-effect-free previews of a single step.
//!
//! A preview runs the step's function on a cached item and renders the
//! result as an RGB image. Unlike [`ProcessStep::apply`] it never touches
//! the outdated flag, so a preview can be shown while a parameter is being
//! tuned without disturbing incremental recomputation.

use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::item::ProcessingItem;
use crate::stage::Stage;
use crate::step::{ProcessStep, StepFunction};
use crate::table::{Cell, Table};
use crate::types::{Contour, DynamicImage, PipelineError, RgbImage, StepError};

const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const FIT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ELLIPSE_SEGMENTS: u32 = 72;

impl ProcessStep {
    /// Render what this step would produce for `item`.
    ///
    /// Image steps show their output for the item's image at the step's
    /// input stage. Feature finders and filters draw the contours they
    /// keep; analyses draw their fits over the loaded image. The item
    /// must be at or past the step's input stage and, for later steps,
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PreviewUnavailable`] for readers and
    /// writers, [`PipelineError::NoPredecessor`] or
    /// [`PipelineError::ImageNotCached`] if the needed input is not
    /// kept, or [`PipelineError::Step`] if the function fails.
    pub fn preview(&self, item: &ProcessingItem) -> Result<RgbImage, PipelineError> {
        let params = self.parameters();
        let unavailable = || PipelineError::PreviewUnavailable(self.name().to_string());
        if matches!(self.function(), StepFunction::Read(_) | StepFunction::Store(_)) {
            return Err(unavailable());
        }
        let input = item.get_at_stage(self.input_stage())?;
        match self.function() {
            StepFunction::Read(_) | StepFunction::Store(_) => Err(unavailable()),
            StepFunction::Convert(f)
            | StepFunction::Preprocess(f)
            | StepFunction::Binarize(f)
            | StepFunction::Postprocess(f) => {
                let out = f(input.image()?, params).map_err(|e| self.failed(e))?;
                Ok(out.to_rgb8())
            }
            StepFunction::ExtractFeatures(f) => {
                let background = input.image()?;
                let contours = f(background, params).map_err(|e| self.failed(e))?;
                Ok(overlay(background, &contours, None))
            }
            StepFunction::FilterFeatures(f) => {
                let contours = f(input.metadata(), params).map_err(|e| self.failed(e))?;
                Ok(overlay(input.image()?, &contours, None))
            }
            StepFunction::Analyze(f) => {
                let results = f(input.metadata(), params).map_err(|e| self.failed(e))?;
                let loaded = input.get_at_stage(Stage::Loaded)?;
                let contours = input.metadata().contours().unwrap_or_default();
                Ok(overlay(loaded.image()?, contours, Some(&results)))
            }
        }
    }

    fn failed(&self, source: StepError) -> PipelineError {
        PipelineError::Step {
            step: self.name().to_string(),
            source,
        }
    }
}

/// Draw contours, and any fitted ellipses or lines in `results`, over
/// `background`.
#[must_use]
pub fn overlay(background: &DynamicImage, contours: &[Contour], results: Option<&Table>) -> RgbImage {
    let mut canvas = background.to_rgb8();
    for contour in contours {
        draw_contour(&mut canvas, contour);
    }
    if let Some(table) = results {
        draw_ellipses(&mut canvas, table);
        draw_lines(&mut canvas, table);
    }
    canvas
}

#[allow(clippy::cast_possible_truncation)]
fn draw_contour(canvas: &mut RgbImage, contour: &Contour) {
    let pts = contour.points();
    for (i, p) in pts.iter().enumerate() {
        let q = pts[(i + 1) % pts.len()];
        draw_line_segment_mut(
            canvas,
            (p.x as f32, p.y as f32),
            (q.x as f32, q.y as f32),
            CONTOUR_COLOR,
        );
    }
}

fn finite(table: &Table, row: usize, column: &str) -> Option<f64> {
    table
        .get(row, column)
        .and_then(Cell::as_f64)
        .filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn draw_ellipses(canvas: &mut RgbImage, table: &Table) {
    for row in 0..table.len() {
        let (Some(cx), Some(cy), Some(major), Some(minor), Some(angle)) = (
            finite(table, row, "ellipse_x_px"),
            finite(table, row, "ellipse_y_px"),
            finite(table, row, "ellipse_majorAxis_px"),
            finite(table, row, "ellipse_minorAxis_px"),
            finite(table, row, "ellipse_angle"),
        ) else {
            continue;
        };
        let (a, b) = (major / 2.0, minor / 2.0);
        let (sin, cos) = angle.to_radians().sin_cos();
        let at = |i: u32| {
            let t = std::f64::consts::TAU * f64::from(i) / f64::from(ELLIPSE_SEGMENTS);
            let (x, y) = (a * t.cos(), b * t.sin());
            ((cx + x * cos - y * sin) as f32, (cy + x * sin + y * cos) as f32)
        };
        for i in 0..ELLIPSE_SEGMENTS {
            draw_line_segment_mut(canvas, at(i), at(i + 1), FIT_COLOR);
        }
        draw_filled_circle_mut(canvas, (cx as i32, cy as i32), 2, FIT_COLOR);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn draw_lines(canvas: &mut RgbImage, table: &Table) {
    let reach = f64::from(canvas.width().max(canvas.height()));
    for row in 0..table.len() {
        let (Some(x), Some(y), Some(vx), Some(vy)) = (
            finite(table, row, "line_x"),
            finite(table, row, "line_y"),
            finite(table, row, "line_vx"),
            finite(table, row, "line_vy"),
        ) else {
            continue;
        };
        draw_line_segment_mut(
            canvas,
            ((x - reach * vx) as f32, (y - reach * vy) as f32),
            ((x + reach * vx) as f32, (y + reach * vy) as f32),
            FIT_COLOR,
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::types::{GrayImage, Point};
    use crate::{analysis, contour, read, threshold};

    fn binarized_item() -> ProcessingItem {
        let mut img = GrayImage::new(40, 40);
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, image::Luma([200]));
            }
        }
        ProcessingItem::new(
            Some(DynamicImage::ImageLuma8(img)),
            Metadata::with_source("a.png"),
            Stage::Preprocessed,
            true,
        )
    }

    #[test]
    fn image_preview_leaves_step_outdated() {
        let step = threshold::binary_step();
        let out = step.preview(&binarized_item()).unwrap();
        assert_eq!(out.get_pixel(20, 20), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert!(step.is_outdated());
    }

    #[test]
    fn contour_preview_draws_over_the_image() {
        let mut binarize = threshold::binary_step();
        let binarized = binarized_item().binarize(&mut binarize).unwrap();
        let postprocessed = ProcessingItem::new(
            binarized.payload().cloned(),
            binarized.metadata().clone(),
            Stage::Postprocessed,
            true,
        );
        let out = contour::step().preview(&postprocessed).unwrap();
        assert_eq!(out.get_pixel(10, 10), &CONTOUR_COLOR);
    }

    #[test]
    fn reader_has_no_preview() {
        let item = ProcessingItem::from_file("a.png", true);
        assert!(matches!(
            read::step().preview(&item),
            Err(PipelineError::PreviewUnavailable(_))
        ));
    }

    #[test]
    fn preview_needs_the_input_stage() {
        let item = ProcessingItem::from_file("a.png", true);
        assert!(matches!(
            analysis::circle_step().preview(&item),
            Err(PipelineError::NoPredecessor(Stage::FeaturesFiltered))
        ));
    }

    #[test]
    fn overlay_draws_fitted_ellipse() {
        let background = DynamicImage::ImageLuma8(GrayImage::new(60, 60));
        let mut table = Table::new(&analysis::CIRCLE_COLUMNS);
        table
            .push_row(
                [400.0, 30.0, 30.0, 20.0, 20.0, 0.0]
                    .into_iter()
                    .map(Cell::Float)
                    .collect(),
            )
            .unwrap();
        let contour = Contour::new(vec![Point::new(5.0, 5.0), Point::new(8.0, 5.0)]);
        let out = overlay(&background, &[contour], Some(&table));
        assert_eq!(out.get_pixel(40, 30), &FIT_COLOR);
        assert_eq!(out.get_pixel(30, 30), &FIT_COLOR);
        assert_eq!(out.get_pixel(6, 5), &CONTOUR_COLOR);
    }
}

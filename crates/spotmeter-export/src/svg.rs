//! SVG export serializer.
//!
//! Draws contours as closed `<path>` elements in image pixel
//! coordinates, so the document can be laid over the source image.
//! When a result table with fitted ellipses is given, each fit becomes an
//! `<ellipse>` element.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Ellipse, Group, Path, Title};
use svg::node::{Text, Value};

use spotmeter_pipeline::{Cell, Contour, Dimensions, Table};

const CONTOUR_STROKE: &str = "lime";
const FIT_STROKE: &str = "red";

/// Metadata to embed in the SVG document.
///
/// Text values are XML-escaped by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`. Typically the source image
    /// file name.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,
}

/// Build a closed SVG path `d` attribute from a contour.
///
/// Returns an empty string for contours with fewer than 2 points.
///
/// # Examples
///
/// ```
/// use spotmeter_pipeline::{Contour, Point};
/// use spotmeter_export::svg::build_path_data;
///
/// let contour = Contour::new(vec![
///     Point::new(10.0, 20.0),
///     Point::new(30.0, 20.0),
///     Point::new(30.0, 40.0),
/// ]);
/// assert_eq!(build_path_data(&contour), "M10,20 L30,20 L30,40 z");
/// ```
#[must_use]
pub fn build_path_data(contour: &Contour) -> String {
    let points = contour.points();
    if points.len() < 2 {
        return String::new();
    }
    let first = &points[0];
    let mut data = Data::new().move_to((first.x, first.y));
    for p in &points[1..] {
        data = data.line_to((p.x, p.y));
    }
    String::from(Value::from(data.close()))
}

/// Serialize contours, and the ellipses in `results`, into an SVG
/// document sized to the source image.
#[must_use]
pub fn to_svg(
    contours: &[Contour],
    dimensions: Dimensions,
    results: Option<&Table>,
    metadata: &SvgMetadata<'_>,
) -> String {
    let (w, h) = (dimensions.width, dimensions.height);
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    let mut features = Group::new()
        .set("id", "contours")
        .set("fill", "none")
        .set("stroke", CONTOUR_STROKE)
        .set("stroke-width", 1);
    for contour in contours {
        let d = build_path_data(contour);
        if d.is_empty() {
            continue;
        }
        features = features.add(Path::new().set("d", d));
    }
    doc = doc.add(features);

    if let Some(table) = results {
        doc = doc.add(ellipses(table));
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

fn ellipses(table: &Table) -> Group {
    let mut group = Group::new()
        .set("id", "fits")
        .set("fill", "none")
        .set("stroke", FIT_STROKE)
        .set("stroke-width", 1);
    let value = |row: usize, column: &str| {
        table
            .get(row, column)
            .and_then(Cell::as_f64)
            .filter(|v| v.is_finite())
    };
    for row in 0..table.len() {
        let (Some(cx), Some(cy), Some(major), Some(minor), Some(angle)) = (
            value(row, "ellipse_x_px"),
            value(row, "ellipse_y_px"),
            value(row, "ellipse_majorAxis_px"),
            value(row, "ellipse_minorAxis_px"),
            value(row, "ellipse_angle"),
        ) else {
            continue;
        };
        group = group.add(
            Ellipse::new()
                .set("cx", cx)
                .set("cy", cy)
                .set("rx", major / 2.0)
                .set("ry", minor / 2.0)
                .set("transform", format!("rotate({angle} {cx} {cy})")),
        );
    }
    group
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use spotmeter_pipeline::Point;

    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn square() -> Contour {
        Contour::new(vec![
            Point::new(1.0, 2.0),
            Point::new(5.0, 2.0),
            Point::new(5.0, 6.0),
            Point::new(1.0, 6.0),
        ])
    }

    #[test]
    fn single_point_contour_has_no_path_data() {
        assert!(build_path_data(&Contour::new(vec![Point::new(1.0, 1.0)])).is_empty());
    }

    #[test]
    fn one_path_per_contour() {
        let contours = vec![square(), Contour::new(vec![]), square()];
        let svg = to_svg(&contours, dims(10, 10), None, &SvgMetadata::default());
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(r#"d="M1,2 L5,2 L5,6 L1,6 z""#));
    }

    #[test]
    fn viewbox_reflects_dimensions() {
        let svg = to_svg(&[], dims(1920, 1080), None, &SvgMetadata::default());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"width="1920""#));
        assert!(svg.contains(r#"viewBox="0 0 1920 1080""#));
    }

    #[test]
    fn title_is_escaped() {
        let metadata = SvgMetadata {
            title: Some("a<b>.png"),
            description: Some("threshold 100"),
        };
        let svg = to_svg(&[], dims(10, 10), None, &metadata);
        assert!(svg.contains("<title>a&lt;b&gt;.png</title>"));
        assert!(svg.contains("<desc>threshold 100</desc>"));
    }

    #[test]
    fn fitted_ellipses_are_drawn() {
        let mut table = Table::new(&[
            "area_px2",
            "ellipse_x_px",
            "ellipse_y_px",
            "ellipse_majorAxis_px",
            "ellipse_minorAxis_px",
            "ellipse_angle",
        ]);
        table
            .push_row(
                [314.0, 20.0, 30.0, 20.0, 10.0, 45.0]
                    .into_iter()
                    .map(Cell::Float)
                    .collect(),
            )
            .unwrap();
        table
            .push_row(
                [0.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN]
                    .into_iter()
                    .map(Cell::Float)
                    .collect(),
            )
            .unwrap();
        let svg = to_svg(&[square()], dims(64, 64), Some(&table), &SvgMetadata::default());
        assert_eq!(svg.matches("<ellipse").count(), 1);
        assert!(svg.contains(r#"rx="10""#));
        assert!(svg.contains(r#"ry="5""#));
        assert!(svg.contains("rotate(45 20 30)"));
    }
}

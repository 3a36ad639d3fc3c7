//! Shape measurements on contours.
//!
//! A contour is treated as a closed polygon through its boundary pixel
//! centers. Areas and moments come from the polygon (Green's theorem);
//! convex hulls and minimum-area rectangles come from `geo`.

use geo::{Area, ConvexHull, Coord, LineString, MinimumRotatedRect, Polygon};

use crate::types::{Contour, Dimensions, Point};

/// Convert a pipeline `Point` to a `geo::Coord`.
const fn point_to_coord(p: Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// The contour as a `geo` polygon.
#[must_use]
pub fn polygon(contour: &Contour) -> Polygon<f64> {
    let ring: LineString<f64> = contour.points().iter().copied().map(point_to_coord).collect();
    Polygon::new(ring, vec![])
}

/// Enclosed area in square pixels. Zero for fewer than three points.
#[must_use]
pub fn area(contour: &Contour) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    polygon(contour).unsigned_area()
}

/// Area of the convex hull in square pixels.
#[must_use]
pub fn hull_area(contour: &Contour) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    polygon(contour).convex_hull().unsigned_area()
}

/// Ratio of area to convex hull area; 1 for convex shapes, 0 when the
/// hull is degenerate.
#[must_use]
pub fn solidity(contour: &Contour) -> f64 {
    let hull = hull_area(contour);
    if hull <= 0.0 {
        return 0.0;
    }
    area(contour) / hull
}

/// Whether the contour reaches the outermost row or column of an image.
#[must_use]
pub fn touches_border(contour: &Contour, dims: Dimensions) -> bool {
    let Some((lo, hi)) = contour.bounds() else {
        return false;
    };
    lo.x <= 0.0
        || lo.y <= 0.0
        || hi.x >= f64::from(dims.width) - 1.0
        || hi.y >= f64::from(dims.height) - 1.0
}

/// An ellipse in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// Center.
    pub center: Point,
    /// Full length of the major axis.
    pub major_axis: f64,
    /// Full length of the minor axis.
    pub minor_axis: f64,
    /// Angle of the major axis against the x axis, in degrees.
    pub angle: f64,
}

/// The ellipse with the same area moments as the contour polygon.
///
/// Returns `None` for contours that enclose no area.
#[must_use]
#[allow(clippy::suboptimal_flops)]
pub fn fit_ellipse(contour: &Contour) -> Option<Ellipse> {
    let pts = contour.points();
    if pts.len() < 3 {
        return None;
    }

    // Raw moments of the polygon, all scaled by the same signed factor.
    let (mut a, mut cx, mut cy, mut xx, mut yy, mut xy) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for (i, p) in pts.iter().enumerate() {
        let q = pts[(i + 1) % pts.len()];
        let cross = p.x * q.y - q.x * p.y;
        a += cross;
        cx += (p.x + q.x) * cross;
        cy += (p.y + q.y) * cross;
        xx += (p.x * p.x + p.x * q.x + q.x * q.x) * cross;
        yy += (p.y * p.y + p.y * q.y + q.y * q.y) * cross;
        xy += (p.x * q.y + 2.0 * p.x * p.y + 2.0 * q.x * q.y + q.x * p.y) * cross;
    }
    a /= 2.0;
    if a.abs() < f64::EPSILON {
        return None;
    }
    let cx = cx / (6.0 * a);
    let cy = cy / (6.0 * a);
    let mu20 = xx / (12.0 * a) - cx * cx;
    let mu02 = yy / (12.0 * a) - cy * cy;
    let mu11 = xy / (24.0 * a) - cx * cy;

    let mean = (mu20 + mu02) / 2.0;
    let spread = ((mu20 - mu02) / 2.0).hypot(mu11);
    let major = mean + spread;
    let minor = mean - spread;
    if !(minor.is_finite() && minor > 0.0) {
        return None;
    }
    Some(Ellipse {
        center: Point::new(cx, cy),
        major_axis: 4.0 * major.sqrt(),
        minor_axis: 4.0 * minor.sqrt(),
        angle: (0.5 * (2.0 * mu11).atan2(mu20 - mu02)).to_degrees(),
    })
}

/// A minimum-area bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    /// Length of the longer side.
    pub length: f64,
    /// Length of the shorter side.
    pub width: f64,
    /// Angle of the longer side against the x axis, in degrees.
    pub angle: f64,
}

/// The smallest rotated rectangle enclosing the contour.
#[must_use]
pub fn min_area_rect(contour: &Contour) -> Option<RotatedRect> {
    let rect = polygon(contour).minimum_rotated_rect()?;
    let corners: Vec<Coord<f64>> = rect.exterior().coords().copied().collect();
    let [a, b, c, ..] = corners.as_slice() else {
        return None;
    };
    let side_ab = (b.x - a.x).hypot(b.y - a.y);
    let side_bc = (c.x - b.x).hypot(c.y - b.y);
    let (length, width, from, to) = if side_ab >= side_bc {
        (side_ab, side_bc, a, b)
    } else {
        (side_bc, side_ab, b, c)
    };
    Some(RotatedRect {
        length,
        width,
        angle: (to.y - from.y).atan2(to.x - from.x).to_degrees(),
    })
}

/// A straight line through a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// A point on the line (the centroid of the cloud).
    pub origin: Point,
    /// Unit direction.
    pub direction: Point,
}

impl Line {
    /// Perpendicular distance of `p` from the line.
    #[must_use]
    pub fn distance(&self, p: Point) -> f64 {
        let dx = p.x - self.origin.x;
        let dy = p.y - self.origin.y;
        dx.mul_add(self.direction.y, -(dy * self.direction.x)).abs()
    }
}

/// Total least-squares line through `points`: the centroid and the
/// principal axis of their scatter.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fit_line(points: &[Point]) -> Option<Line> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - mx, p.y - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx + syy <= 0.0 {
        return None;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some(Line {
        origin: Point::new(mx, my),
        direction: Point::new(theta.cos(), theta.sin()),
    })
}

/// Integer pixel positions enclosed by (or on) the contour.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn interior_pixels(contour: &Contour) -> Vec<Point> {
    use geo::Intersects;

    let Some((lo, hi)) = contour.bounds() else {
        return Vec::new();
    };
    let poly = polygon(contour);
    let (x0, x1) = (lo.x.floor() as i64, hi.x.ceil() as i64);
    let (y0, y1) = (lo.y.floor() as i64, hi.y.ceil() as i64);
    (y0..=y1)
        .flat_map(|y| (x0..=x1).map(move |x| Point::new(x as f64, y as f64)))
        .filter(|p| poly.intersects(&geo::Point::new(p.x, p.y)))
        .collect()
}

/// Linearly interpolated percentile (`0..=100`) of `values`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - rank.floor();
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(side: f64) -> Contour {
        Contour::new(vec![
            Point::new(10.0, 10.0),
            Point::new(10.0 + side, 10.0),
            Point::new(10.0 + side, 10.0 + side),
            Point::new(10.0, 10.0 + side),
        ])
    }

    fn sampled_ellipse(cx: f64, cy: f64, a: f64, b: f64, angle_deg: f64) -> Contour {
        let (s, c) = angle_deg.to_radians().sin_cos();
        Contour::new(
            (0..720)
                .map(|i| {
                    let t = f64::from(i).to_radians() / 2.0;
                    let (x, y) = (a * t.cos(), b * t.sin());
                    Point::new(cx + x * c - y * s, cy + x * s + y * c)
                })
                .collect(),
        )
    }

    #[test]
    fn square_area_and_solidity() {
        let sq = square(10.0);
        assert!((area(&sq) - 100.0).abs() < 1e-9);
        assert!((solidity(&sq) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn concave_shape_has_lower_solidity() {
        let l_shape = Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 2.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(solidity(&l_shape) < 0.7);
    }

    #[test]
    fn degenerate_contours_have_no_area() {
        let line = Contour::new(vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0)]);
        assert_eq!(area(&line), 0.0);
        assert_eq!(solidity(&line), 0.0);
        assert!(fit_ellipse(&line).is_none());
    }

    #[test]
    fn border_touch() {
        let dims = Dimensions {
            width: 20,
            height: 30,
        };
        assert!(!touches_border(&square(5.0), dims));
        assert!(touches_border(&square(9.0), dims));
        let at_origin = Contour::new(vec![Point::new(0.0, 4.0), Point::new(3.0, 4.0)]);
        assert!(touches_border(&at_origin, dims));
    }

    #[test]
    fn ellipse_fit_recovers_circle() {
        let circle = sampled_ellipse(100.0, 50.0, 30.0, 30.0, 0.0);
        let e = fit_ellipse(&circle).unwrap();
        assert!((e.center.x - 100.0).abs() < 0.01);
        assert!((e.center.y - 50.0).abs() < 0.01);
        assert!((e.major_axis - 60.0).abs() < 0.1);
        assert!((e.minor_axis - 60.0).abs() < 0.1);
    }

    #[test]
    fn ellipse_fit_recovers_axes_and_angle() {
        let ellipse = sampled_ellipse(200.0, 120.0, 40.0, 10.0, 30.0);
        let e = fit_ellipse(&ellipse).unwrap();
        assert!((e.major_axis - 80.0).abs() < 0.1);
        assert!((e.minor_axis - 20.0).abs() < 0.1);
        assert!((e.angle - 30.0).abs() < 0.1);
    }

    #[test]
    fn line_fit_follows_points() {
        let pts: Vec<Point> = (0..20).map(|i| Point::new(f64::from(i), 5.0)).collect();
        let line = fit_line(&pts).unwrap();
        assert!(line.direction.y.abs() < 1e-9);
        assert!((line.origin.y - 5.0).abs() < 1e-9);
        assert!((line.distance(Point::new(3.0, 8.0)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rotated_rect_of_square() {
        let r = min_area_rect(&square(10.0)).unwrap();
        assert!((r.length - 10.0).abs() < 1e-6);
        assert!((r.width - 10.0).abs() < 1e-6);
    }

    #[test]
    fn interior_pixels_include_boundary() {
        let pixels = interior_pixels(&square(2.0));
        assert_eq!(pixels.len(), 9);
    }

    #[test]
    fn percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert_eq!(percentile(&v, 50.0), Some(2.5));
        assert_eq!(percentile(&[], 50.0), None);
    }
}

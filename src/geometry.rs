//! Quad geometry helpers
//!
//! Bounding boxes, hit testing and corner ordering for destination quads.
//! These are shared by the warp engine and by the scene editing helpers.

use serde::{Deserialize, Serialize};

/// A 2D point in canvas pixel coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Offset by a delta
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Four destination corners.
/// Order by convention: top-left, top-right, bottom-right, bottom-left
pub type Quad = [Point; 4];

/// Integer pixel rectangle that fully encloses a set of points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min_x: i64,
    pub min_y: i64,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn max_x(&self) -> i64 {
        self.min_x + self.width as i64
    }

    pub fn max_y(&self) -> i64 {
        self.min_y + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Bounding box using floor(min) / ceil(max) per axis.
///
/// An empty slice gives an empty box at the origin.
pub fn bounding_box(points: &[Point]) -> BoundingBox {
    if points.is_empty() {
        return BoundingBox {
            min_x: 0,
            min_y: 0,
            width: 0,
            height: 0,
        };
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let min_x = min_x.floor();
    let min_y = min_y.floor();
    let max_x = max_x.ceil();
    let max_y = max_y.ceil();

    BoundingBox {
        min_x: min_x as i64,
        min_y: min_y as i64,
        width: (max_x - min_x).max(0.0) as u32,
        height: (max_y - min_y).max(0.0) as u32,
    }
}

/// Layer hit test.
///
/// This checks the axis-aligned extent of the corners (edges inclusive), not
/// the polygon itself, so a probe in the empty triangle next to a skewed quad
/// still counts as a hit. Selection behaviour depends on this.
pub fn point_in_quad(p: Point, quad: &Quad) -> bool {
    let min_x = quad.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
    let max_x = quad.iter().map(|c| c.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = quad.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);
    let max_y = quad.iter().map(|c| c.y).fold(f64::NEG_INFINITY, f64::max);

    p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y
}

/// Centroid of a point set (origin for an empty set)
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Order points by angle around their centroid.
///
/// Angles come from `atan2(y - cy, x - cx)` ascending, so with the canvas
/// y-axis pointing down the result runs clockwise starting from the point
/// closest to the negative x-axis. Input order does not matter.
pub fn sort_by_angle_from_centroid(points: &[Point]) -> Vec<Point> {
    let center = centroid(points);
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| {
        let angle_a = (a.y - center.y).atan2(a.x - center.x);
        let angle_b = (b.y - center.y).atan2(b.x - center.x);
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Compare two point sets positionally after angle sorting.
///
/// True when every sorted pair lies within `tolerance` (euclidean distance).
pub fn quads_match(a: &[Point], b: &[Point], tolerance: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let a = sort_by_angle_from_centroid(a);
    let b = sort_by_angle_from_centroid(b);
    a.iter().zip(b.iter()).all(|(p, q)| {
        let dx = p.x - q.x;
        let dy = p.y - q.y;
        (dx * dx + dy * dy).sqrt() <= tolerance
    })
}

/// Move every corner by the same delta
pub fn translate_quad(quad: &Quad, dx: f64, dy: f64) -> Quad {
    quad.map(|p| p.translate(dx, dy))
}

/// Padding kept between a freshly placed layer and the canvas edge
pub const PLACEMENT_PADDING: f64 = 50.0;

/// Starting corners for a new layer: the image at its natural size inside
/// the padded canvas, scaled down uniformly if it does not fit.
pub fn initial_corner_points(
    image_width: u32,
    image_height: u32,
    canvas_width: u32,
    canvas_height: u32,
) -> Quad {
    let max_width = canvas_width as f64 - PLACEMENT_PADDING * 2.0;
    let max_height = canvas_height as f64 - PLACEMENT_PADDING * 2.0;

    let mut width = image_width as f64;
    let mut height = image_height as f64;

    if width > max_width || height > max_height {
        let scale = (max_width / width).min(max_height / height);
        width *= scale;
        height *= scale;
    }

    let p = PLACEMENT_PADDING;
    [
        Point::new(p, p),                  // Top-left
        Point::new(p + width, p),          // Top-right
        Point::new(p + width, p + height), // Bottom-right
        Point::new(p, p + height),         // Bottom-left
    ]
}

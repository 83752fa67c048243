//! Perspective transformation between two quads
//!
//! This module builds the 3x3 homography that maps the corners of a source
//! image onto four destination points, inverts it, and applies it to points
//! in homogeneous coordinates.

use crate::error::{Result, WarpError};
use crate::geometry::{Point, Quad};
use crate::solver::solve_linear_system;

/// Row-major 3x3 projective matrix
pub type Matrix3 = [[f64; 3]; 3];

/// Determinants smaller than this are not inverted
pub const DET_EPSILON: f64 = 1e-12;

/// Homogeneous `w` values smaller than this map to infinity
pub const W_EPSILON: f64 = 1e-10;

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Forward and inverse homography for one pair of quads
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveTransform {
    /// Source to destination
    matrix: Matrix3,
    /// Destination to source, used for inverse mapping while warping
    inverse: Matrix3,
}

impl PerspectiveTransform {
    /// Compute the transform mapping `src[i]` onto `dst[i]`
    pub fn compute(src: &Quad, dst: &Quad) -> Result<Self> {
        let matrix = compute_homography(src, dst)?;
        let inverse = invert(&matrix)?;
        Ok(Self { matrix, inverse })
    }

    pub fn matrix(&self) -> &Matrix3 {
        &self.matrix
    }

    pub fn inverse(&self) -> &Matrix3 {
        &self.inverse
    }

    /// Transform a point from source to destination coordinates
    #[inline]
    pub fn transform_point(&self, x: f64, y: f64) -> Option<Point> {
        apply_homography(&self.matrix, x, y)
    }

    /// Transform a point from destination to source coordinates
    #[inline]
    pub fn inverse_transform_point(&self, x: f64, y: f64) -> Option<Point> {
        apply_homography(&self.inverse, x, y)
    }
}

/// Compute the homography mapping four source points onto four destination points.
///
/// Each correspondence (x,y) -> (x',y') contributes two equations with
/// `h22` fixed to 1:
///   h00*x + h01*y + h02 - x'*x*h20 - x'*y*h21 = x'
///   h10*x + h11*y + h12 - y'*x*h20 - y'*y*h21 = y'
pub fn compute_homography(src: &Quad, dst: &Quad) -> Result<Matrix3> {
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let Point { x, y } = src[i];
        let Point { x: xp, y: yp } = dst[i];

        a[i * 2] = [x, y, 1.0, 0.0, 0.0, 0.0, -xp * x, -xp * y];
        b[i * 2] = xp;

        a[i * 2 + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -yp * x, -yp * y];
        b[i * 2 + 1] = yp;
    }

    let h = solve_linear_system(&a, &b)?;

    Ok([[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]])
}

pub fn determinant(m: &Matrix3) -> f64 {
    let [[a, b, c], [d, e, f], [g, h, i]] = *m;
    a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g)
}

/// Closed-form inverse via the adjugate.
///
/// The result is rescaled so its bottom-right entry is 1 whenever that
/// entry is not near zero. Scaling a homography does not change the mapping.
pub fn invert(m: &Matrix3) -> Result<Matrix3> {
    let det = determinant(m);
    if !det.is_finite() || det.abs() < DET_EPSILON {
        return Err(WarpError::SingularMatrix);
    }

    let [[a, b, c], [d, e, f], [g, h, i]] = *m;
    let mut inv = [
        [(e * i - f * h) / det, (c * h - b * i) / det, (b * f - c * e) / det],
        [(f * g - d * i) / det, (a * i - c * g) / det, (c * d - a * f) / det],
        [(d * h - e * g) / det, (b * g - a * h) / det, (a * e - b * d) / det],
    ];

    let corner = inv[2][2];
    if corner.abs() > W_EPSILON {
        for row in inv.iter_mut() {
            for v in row.iter_mut() {
                *v /= corner;
            }
        }
    }

    if inv.iter().flatten().any(|v| !v.is_finite()) {
        return Err(WarpError::SingularMatrix);
    }

    Ok(inv)
}

/// Apply a homography to a point.
///
/// Returns `None` when the point maps to infinity (`w` near zero).
#[inline]
pub fn apply_homography(h: &Matrix3, x: f64, y: f64) -> Option<Point> {
    let w = h[2][0] * x + h[2][1] * y + h[2][2];
    if w.abs() < W_EPSILON {
        return None;
    }
    let xp = (h[0][0] * x + h[0][1] * y + h[0][2]) / w;
    let yp = (h[1][0] * x + h[1][1] * y + h[1][2]) / w;
    Some(Point::new(xp, yp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(w: f64, h: f64) -> Quad {
        [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ]
    }

    fn skewed() -> Quad {
        [
            Point::new(12.0, 30.0),
            Point::new(180.0, 8.0),
            Point::new(210.0, 160.0),
            Point::new(25.0, 140.0),
        ]
    }

    #[test]
    fn test_identity_transform() {
        let src = rect(100.0, 100.0);
        let transform = PerspectiveTransform::compute(&src, &src).unwrap();

        let p = transform.transform_point(50.0, 50.0).unwrap();
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!((p.y - 50.0).abs() < 1e-9);

        for (row, expected) in transform.matrix().iter().zip(IDENTITY.iter()) {
            for (v, e) in row.iter().zip(expected.iter()) {
                assert!((v - e).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_corners_map_exactly() {
        let src = rect(64.0, 48.0);
        let dst = skewed();
        let h = compute_homography(&src, &dst).unwrap();

        assert_eq!(h[2][2], 1.0);
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = apply_homography(&h, s.x, s.y).unwrap();
            assert!((p.x - d.x).abs() < 1e-6, "{:?} -> {:?}, want {:?}", s, p, d);
            assert!((p.y - d.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_round_trip_through_inverse() {
        let transform = PerspectiveTransform::compute(&rect(64.0, 48.0), &skewed()).unwrap();

        for sy in 0..=12 {
            for sx in 0..=16 {
                let (x, y) = (sx as f64 * 4.0, sy as f64 * 4.0);
                let fwd = transform.transform_point(x, y).unwrap();
                let back = transform.inverse_transform_point(fwd.x, fwd.y).unwrap();
                assert!((back.x - x).abs() < 1e-6, "x: {} vs {}", back.x, x);
                assert!((back.y - y).abs() < 1e-6, "y: {} vs {}", back.y, y);
            }
        }
    }

    #[test]
    fn test_inverse_matches_nalgebra() {
        let h = compute_homography(&rect(64.0, 48.0), &skewed()).unwrap();
        let inv = invert(&h).unwrap();

        let n = nalgebra::Matrix3::from_row_slice(&[
            h[0][0], h[0][1], h[0][2], h[1][0], h[1][1], h[1][2], h[2][0], h[2][1], h[2][2],
        ]);
        let n_inv = n.try_inverse().unwrap();
        let scale = n_inv[(2, 2)];

        for r in 0..3 {
            for c in 0..3 {
                let expected = n_inv[(r, c)] / scale;
                assert!(
                    (inv[r][c] - expected).abs() < 1e-9 * expected.abs().max(1.0),
                    "[{}][{}]: {} vs {}",
                    r,
                    c,
                    inv[r][c],
                    expected
                );
            }
        }
    }

    #[test]
    fn test_duplicate_corner_is_rejected() {
        // The 8x8 system still solves here, but to a rank-deficient matrix
        let mut dst = skewed();
        dst[1] = dst[0];
        let result = PerspectiveTransform::compute(&rect(10.0, 10.0), &dst);
        assert!(
            matches!(
                result,
                Err(WarpError::DegenerateGeometry) | Err(WarpError::SingularMatrix)
            ),
            "{:?}",
            result
        );
    }

    #[test]
    fn test_collinear_source_is_degenerate() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ];
        assert!(PerspectiveTransform::compute(&src, &skewed()).is_err());
    }

    #[test]
    fn test_invert_singular() {
        let m = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert_eq!(invert(&m), Err(WarpError::SingularMatrix));
    }

    #[test]
    fn test_apply_at_infinity() {
        // w = x - 5
        let h = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, -5.0]];
        assert!(apply_homography(&h, 5.0, 3.0).is_none());
        assert!(apply_homography(&h, 6.0, 3.0).is_some());
    }
}

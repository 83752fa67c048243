//! Pixel resampling for the warp engine
//!
//! Bilinear lookups with edge clamping, supersampling of a destination pixel
//! through an inverse homography, and the box filter that brings the
//! high-quality working buffer back down to output size.

use image::{Rgba, RgbaImage};

use crate::transform::{apply_homography, Matrix3};

/// RGBA8, row-major, top-left origin
pub type PixelBuffer = RgbaImage;

/// Bilinear interpolation at a fractional source position.
///
/// The floor and ceil neighbours are clamped to the image independently, so
/// any finite position (and any position at all along an axis of size 1)
/// reads valid pixels.
#[inline]
pub fn bilinear_sample(src: &PixelBuffer, x: f64, y: f64) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let max_x = src.width() as i64 - 1;
    let max_y = src.height() as i64 - 1;
    let clamp_x = |v: f64| (v as i64).clamp(0, max_x) as u32;
    let clamp_y = |v: f64| (v as i64).clamp(0, max_y) as u32;

    let (x1, x2) = (clamp_x(x0), clamp_x(x.ceil()));
    let (y1, y2) = (clamp_y(y0), clamp_y(y.ceil()));

    let p11 = src.get_pixel(x1, y1);
    let p21 = src.get_pixel(x2, y1);
    let p12 = src.get_pixel(x1, y2);
    let p22 = src.get_pixel(x2, y2);

    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = bilerp(p11[c], p21[c], p12[c], p22[c], fx, fy);
    }
    Rgba(out)
}

#[inline]
fn bilerp(p11: u8, p21: u8, p12: u8, p22: u8, fx: f64, fy: f64) -> u8 {
    let top = p11 as f64 * (1.0 - fx) + p21 as f64 * fx;
    let bottom = p12 as f64 * (1.0 - fx) + p22 as f64 * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

/// Whether a mapped position lies on the source image, `[0, w) x [0, h)`
#[inline]
pub fn in_bounds(src: &PixelBuffer, x: f64, y: f64) -> bool {
    x >= 0.0 && x < src.width() as f64 && y >= 0.0 && y < src.height() as f64
}

/// Inverse-map one destination position and sample the source there.
///
/// `None` when the position maps to infinity or off the source image.
#[inline]
pub fn inverse_sample(inv: &Matrix3, x: f64, y: f64, src: &PixelBuffer) -> Option<Rgba<u8>> {
    let p = apply_homography(inv, x, y)?;
    if !in_bounds(src, p.x, p.y) {
        return None;
    }
    Some(bilinear_sample(src, p.x, p.y))
}

/// Regular n x n grid of sub-pixel positions inside the cell at (x, y)
pub fn sample_points(x: f64, y: f64, samples: u32) -> impl Iterator<Item = (f64, f64)> {
    let step = 1.0 / samples.max(1) as f64;
    (0..samples).flat_map(move |dy| {
        (0..samples).map(move |dx| (x + dx as f64 * step, y + dy as f64 * step))
    })
}

/// Average the in-bounds sub-samples of one destination pixel.
///
/// Returns `None` when no sub-sample lands on the source; the caller leaves
/// that pixel transparent.
pub fn supersample(
    inv: &Matrix3,
    dest_x: f64,
    dest_y: f64,
    samples: u32,
    src: &PixelBuffer,
) -> Option<Rgba<u8>> {
    let mut sum = [0u32; 4];
    let mut valid = 0u32;

    for (sx, sy) in sample_points(dest_x, dest_y, samples) {
        if let Some(px) = inverse_sample(inv, sx, sy, src) {
            for c in 0..4 {
                sum[c] += px[c] as u32;
            }
            valid += 1;
        }
    }

    if valid == 0 {
        return None;
    }

    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = (sum[c] as f64 / valid as f64).round() as u8;
    }
    Some(Rgba(out))
}

/// Shrink by an integer factor with a box filter.
///
/// Each output pixel averages its `factor x factor` block with colour
/// weighted by alpha, so transparent holes do not darken the edges of a
/// warped layer. Integer arithmetic keeps the result identical everywhere.
pub fn downscale_box(src: &PixelBuffer, factor: u32) -> PixelBuffer {
    if factor <= 1 {
        return src.clone();
    }

    let out_w = src.width() / factor;
    let out_h = src.height() / factor;
    let area = (factor * factor) as u64;

    PixelBuffer::from_fn(out_w, out_h, |ox, oy| {
        let mut alpha = 0u64;
        let mut color = [0u64; 3];
        for y in oy * factor..(oy + 1) * factor {
            for x in ox * factor..(ox + 1) * factor {
                let p = src.get_pixel(x, y);
                let a = p[3] as u64;
                alpha += a;
                for c in 0..3 {
                    color[c] += p[c] as u64 * a;
                }
            }
        }

        if alpha == 0 {
            return Rgba([0, 0, 0, 0]);
        }

        let mut out = [0u8; 4];
        for c in 0..3 {
            out[c] = ((color[c] * 2 + alpha) / (alpha * 2)) as u8;
        }
        out[3] = ((alpha * 2 + area) / (area * 2)) as u8;
        Rgba(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::IDENTITY;

    fn gradient() -> PixelBuffer {
        // 2x2: red, green / blue, yellow
        let mut img = PixelBuffer::new(2, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        img.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        img.put_pixel(1, 1, Rgba([255, 255, 0, 255]));
        img
    }

    #[test]
    fn test_bilinear_exact_pixels() {
        let img = gradient();
        assert_eq!(bilinear_sample(&img, 0.0, 0.0), Rgba([255, 0, 0, 255]));
        assert_eq!(bilinear_sample(&img, 1.0, 1.0), Rgba([255, 255, 0, 255]));
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = gradient();
        // Average of the four corners: r = 510/4, g = 510/4, b = 255/4
        assert_eq!(bilinear_sample(&img, 0.5, 0.5), Rgba([128, 128, 64, 255]));
        // Halfway along the top edge
        assert_eq!(bilinear_sample(&img, 0.5, 0.0), Rgba([128, 128, 0, 255]));
    }

    #[test]
    fn test_bilinear_clamps_at_edges() {
        let img = gradient();
        // Right of the last column reads the last column
        assert_eq!(bilinear_sample(&img, 1.5, 0.0), Rgba([0, 255, 0, 255]));
        // Far outside still lands on a corner instead of indexing out of range
        assert_eq!(bilinear_sample(&img, -1e9, 1e9), Rgba([0, 0, 255, 255]));
        assert_eq!(bilinear_sample(&img, 1e300, -1e300), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_bilinear_single_pixel_image() {
        let img = PixelBuffer::from_pixel(1, 1, Rgba([9, 8, 7, 6]));
        assert_eq!(bilinear_sample(&img, 0.7, 0.3), Rgba([9, 8, 7, 6]));
    }

    #[test]
    fn test_sample_points_grid() {
        let pts: Vec<_> = sample_points(3.0, 4.0, 2).collect();
        assert_eq!(pts, vec![(3.0, 4.0), (3.5, 4.0), (3.0, 4.5), (3.5, 4.5)]);
        assert_eq!(sample_points(0.0, 0.0, 3).count(), 9);
    }

    #[test]
    fn test_inverse_sample_out_of_bounds() {
        let img = gradient();
        assert!(inverse_sample(&IDENTITY, 0.0, 0.0, &img).is_some());
        assert!(inverse_sample(&IDENTITY, 1.99, 1.99, &img).is_some());
        assert!(inverse_sample(&IDENTITY, 2.0, 0.0, &img).is_none());
        assert!(inverse_sample(&IDENTITY, -0.01, 0.0, &img).is_none());
    }

    #[test]
    fn test_supersample_partial_coverage() {
        let img = PixelBuffer::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        // Cell at x = 1.5: sub-samples at x = 1.5 (inside) and x = 2.0 (outside)
        let px = supersample(&IDENTITY, 1.5, 0.0, 2, &img).unwrap();
        assert_eq!(px, Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn test_supersample_hole() {
        let img = gradient();
        assert!(supersample(&IDENTITY, 5.0, 5.0, 2, &img).is_none());
    }

    #[test]
    fn test_downscale_box_weights_by_alpha() {
        let mut img = PixelBuffer::new(2, 2);
        img.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([100, 0, 0, 255]));
        // Other two pixels are fully transparent holes

        let out = downscale_box(&img, 2);
        assert_eq!(out.dimensions(), (1, 1));
        // Colour from opaque pixels only, alpha averaged over the block
        assert_eq!(*out.get_pixel(0, 0), Rgba([150, 0, 0, 128]));
    }

    #[test]
    fn test_downscale_box_factor_one() {
        let img = gradient();
        assert_eq!(downscale_box(&img, 1), img);
    }
}

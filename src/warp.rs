//! Perspective warp engine
//!
//! Takes a source raster and four destination corners, computes the
//! homography from the image rectangle onto the corners, and fills the
//! destination bounding box by inverse-mapping every pixel back into the
//! source. In high-quality mode the working buffer is rendered at twice the
//! linear resolution with 2x2 supersampling and box-filtered back down.
//!
//! Rows are independent, so the pixel loop is sharded across the rayon pool
//! with each worker writing its own row slice.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compositor::{BlendMode, Compositor};
use crate::error::{Result, WarpError};
use crate::geometry::{bounding_box, BoundingBox, Point, Quad};
use crate::sample::{downscale_box, inverse_sample, supersample, PixelBuffer};
use crate::transform::PerspectiveTransform;

/// Rendering quality for a warp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// One bilinear sample per output pixel (interactive preview)
    #[default]
    Fast,
    /// 2x working resolution, 2x2 supersampling, box downscale (export)
    High,
}

impl Quality {
    pub fn from_flag(high_quality: bool) -> Self {
        if high_quality {
            Quality::High
        } else {
            Quality::Fast
        }
    }

    /// Linear scale of the working buffer relative to the output
    pub fn scale(&self) -> u32 {
        match self {
            Quality::Fast => 1,
            Quality::High => 2,
        }
    }

    /// Sub-samples per axis for each working pixel
    pub fn samples_per_axis(&self) -> u32 {
        match self {
            Quality::Fast => 1,
            Quality::High => 2,
        }
    }
}

/// Upper bound on working buffer pixels (about 1 GiB of RGBA)
pub const DEFAULT_MAX_WORKING_PIXELS: u64 = 1 << 28;

/// Engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpOptions {
    /// Shard the pixel loop across the rayon pool
    pub parallel: bool,
    /// Warps whose working buffer would exceed this are rejected
    pub max_working_pixels: u64,
}

impl Default for WarpOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_working_pixels: DEFAULT_MAX_WORKING_PIXELS,
        }
    }
}

/// Working-resolution result of a warp, before downscaling
#[derive(Debug, Clone)]
pub struct Rasterized {
    /// `bounds.width * scale` by `bounds.height * scale`
    pub buffer: PixelBuffer,
    /// Destination bounding box in canvas pixels
    pub bounds: BoundingBox,
    pub scale: u32,
    /// Maps source pixels into working-buffer pixels
    pub transform: PerspectiveTransform,
}

/// A warped layer ready for compositing
#[derive(Debug, Clone)]
pub struct WarpedLayer {
    /// Exactly `bounds.width` by `bounds.height`
    pub image: PixelBuffer,
    pub bounds: BoundingBox,
}

impl WarpedLayer {
    /// Canvas position of the top-left pixel
    pub fn origin(&self) -> (i64, i64) {
        (self.bounds.min_x, self.bounds.min_y)
    }

    /// Blend onto a surface at the layer's own origin
    pub fn composite_onto<C: Compositor + ?Sized>(&self, surface: &mut C, mode: BlendMode) {
        surface.composite(&self.image, self.origin(), mode);
    }
}

/// Stateless apart from its options; every call starts from scratch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarpEngine {
    options: WarpOptions,
}

impl WarpEngine {
    pub fn new(options: WarpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WarpOptions {
        &self.options
    }

    /// Render `source` into the bounding box of `points` at working resolution.
    pub fn rasterize(
        &self,
        source: &PixelBuffer,
        points: &[Point],
        quality: Quality,
    ) -> Result<Rasterized> {
        let quad = validate(source, points)?;

        let bounds = bounding_box(&quad);
        let scale = quality.scale();

        let (src_w, src_h) = (source.width() as f64, source.height() as f64);
        let source_points: Quad = [
            Point::new(0.0, 0.0),
            Point::new(src_w, 0.0),
            Point::new(src_w, src_h),
            Point::new(0.0, src_h),
        ];

        // Destination corners in working-buffer pixels
        let (min_x, min_y) = (bounds.min_x as f64, bounds.min_y as f64);
        let adjusted: Quad = quad.map(|p| {
            Point::new((p.x - min_x) * scale as f64, (p.y - min_y) * scale as f64)
        });

        let transform = PerspectiveTransform::compute(&source_points, &adjusted)?;
        if bounds.is_empty() {
            return Err(WarpError::DegenerateGeometry);
        }

        let work_w = bounds.width as u64 * scale as u64;
        let work_h = bounds.height as u64 * scale as u64;
        if work_w > u32::MAX as u64
            || work_h > u32::MAX as u64
            || work_w * work_h > self.options.max_working_pixels
        {
            return Err(WarpError::invalid(format!(
                "working buffer {}x{} exceeds the limit of {} pixels",
                work_w, work_h, self.options.max_working_pixels
            )));
        }

        debug!(
            "Warp {}x{} source into {}x{} at ({}, {}), scale {}",
            source.width(),
            source.height(),
            bounds.width,
            bounds.height,
            bounds.min_x,
            bounds.min_y,
            scale
        );

        let mut buffer = PixelBuffer::new(work_w as u32, work_h as u32);
        let inv = *transform.inverse();
        let samples = quality.samples_per_axis();
        let row_len = work_w as usize * 4;

        let fill_row = |(y, row): (usize, &mut [u8])| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let (dx, dy) = (x as f64, y as f64);
                let sample = match quality {
                    Quality::Fast => inverse_sample(&inv, dx, dy, source),
                    Quality::High => supersample(&inv, dx, dy, samples, source),
                };
                if let Some(color) = sample {
                    px.copy_from_slice(&color.0);
                }
            }
        };

        if self.options.parallel {
            buffer.par_chunks_mut(row_len).enumerate().for_each(fill_row);
        } else {
            buffer.chunks_mut(row_len).enumerate().for_each(fill_row);
        }

        Ok(Rasterized {
            buffer,
            bounds,
            scale,
            transform,
        })
    }

    /// Render `source` onto the quad and bring it to output resolution.
    pub fn warp(&self, source: &PixelBuffer, points: &[Point], quality: Quality) -> Result<WarpedLayer> {
        let raster = self.rasterize(source, points, quality)?;
        let image = if raster.scale > 1 {
            downscale_box(&raster.buffer, raster.scale)
        } else {
            raster.buffer
        };
        Ok(WarpedLayer {
            image,
            bounds: raster.bounds,
        })
    }

    /// Full pipeline: warp, then blend onto `surface` with `mode`.
    ///
    /// On error nothing is drawn.
    pub fn draw_image<C: Compositor + ?Sized>(
        &self,
        surface: &mut C,
        source: &PixelBuffer,
        points: &[Point],
        mode: BlendMode,
        quality: Quality,
    ) -> Result<()> {
        let layer = self.warp(source, points, quality)?;
        layer.composite_onto(surface, mode);
        Ok(())
    }
}

fn validate(source: &PixelBuffer, points: &[Point]) -> Result<Quad> {
    if source.width() == 0 || source.height() == 0 {
        return Err(WarpError::invalid("source image is empty"));
    }
    let quad: Quad = points.try_into().map_err(|_| {
        WarpError::invalid(format!("expected 4 destination points, got {}", points.len()))
    })?;
    if let Some(p) = quad.iter().find(|p| !p.is_finite()) {
        return Err(WarpError::invalid(format!("non-finite destination point {:?}", p)));
    }
    Ok(quad)
}

/// [`WarpEngine::warp`] with default options
pub fn warp(source: &PixelBuffer, points: &[Point], quality: Quality) -> Result<WarpedLayer> {
    WarpEngine::default().warp(source, points, quality)
}

/// [`WarpEngine::draw_image`] with default options
pub fn draw_image<C: Compositor + ?Sized>(
    surface: &mut C,
    source: &PixelBuffer,
    points: &[Point],
    mode: BlendMode,
    quality: Quality,
) -> Result<()> {
    WarpEngine::default().draw_image(surface, source, points, mode, quality)
}

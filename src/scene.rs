//! Layered mockup scenes
//!
//! A scene is a background plus an ordered stack of layers, each an image
//! pinned to four corner points with its own blend mode. Rendering warps all
//! layers in parallel and then composites them one by one in stack order.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::compositor::{BlendMode, Canvas};
use crate::error::Result;
use crate::geometry::{
    bounding_box, initial_corner_points, point_in_quad, translate_quad, BoundingBox, Point, Quad,
};
use crate::sample::PixelBuffer;
use crate::warp::{Quality, WarpEngine, WarpedLayer};

/// Side length of the square grab handle drawn around each corner
pub const MARKER_SIZE: f64 = 24.0;

/// One image placed on the canvas
#[derive(Debug, Clone)]
pub struct Layer {
    pub image: PixelBuffer,
    /// Order: top-left, top-right, bottom-right, bottom-left
    pub corners: Quad,
    pub blend_mode: BlendMode,
}

impl Layer {
    pub fn new(image: PixelBuffer, corners: Quad, blend_mode: BlendMode) -> Self {
        Self {
            image,
            corners,
            blend_mode,
        }
    }
}

/// What a probe point landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    /// A corner handle of a layer
    Corner { layer: usize, corner: usize },
    /// Somewhere on the layer itself
    Layer(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Drawn,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub index: usize,
    pub status: LayerStatus,
    pub blend_mode: BlendMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-layer outcome of a render
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderReport {
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub layers: Vec<LayerReport>,
}

impl RenderReport {
    pub fn drawn(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| l.status == LayerStatus::Drawn)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.layers.len() - self.drawn()
    }
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub image: PixelBuffer,
    pub report: RenderReport,
}

#[derive(Debug, Clone)]
pub struct Scene {
    width: u32,
    height: u32,
    pub background: Option<PixelBuffer>,
    pub layers: Vec<Layer>,
    engine: WarpEngine,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_engine(width, height, WarpEngine::default())
    }

    pub fn with_engine(width: u32, height: u32, engine: WarpEngine) -> Self {
        Self {
            width,
            height,
            background: None,
            layers: Vec::new(),
            engine,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Add an image on top of the stack at its default placement.
    /// Returns the new layer index.
    pub fn add_layer(&mut self, image: PixelBuffer) -> usize {
        let corners = initial_corner_points(image.width(), image.height(), self.width, self.height);
        self.push_layer(Layer::new(image, corners, BlendMode::Normal))
    }

    pub fn push_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    /// Find what sits under `p`, topmost layer first.
    ///
    /// Within a layer the corner handles win over the layer body. The body
    /// test uses the corners' bounding box, see [`point_in_quad`].
    pub fn hit_test(&self, p: Point) -> Option<Hit> {
        let half = MARKER_SIZE / 2.0;
        for (i, layer) in self.layers.iter().enumerate().rev() {
            for (j, c) in layer.corners.iter().enumerate() {
                if p.x >= c.x - half && p.x <= c.x + half && p.y >= c.y - half && p.y <= c.y + half {
                    return Some(Hit::Corner { layer: i, corner: j });
                }
            }
            if point_in_quad(p, &layer.corners) {
                return Some(Hit::Layer(i));
            }
        }
        None
    }

    /// Move a single corner. False if the indices do not exist.
    pub fn move_corner(&mut self, layer: usize, corner: usize, to: Point) -> bool {
        match self.layers.get_mut(layer) {
            Some(l) if corner < 4 => {
                l.corners[corner] = to;
                true
            }
            _ => false,
        }
    }

    /// Drag a whole layer by a delta
    pub fn translate_layer(&mut self, layer: usize, dx: f64, dy: f64) -> bool {
        match self.layers.get_mut(layer) {
            Some(l) => {
                l.corners = translate_quad(&l.corners, dx, dy);
                true
            }
            None => false,
        }
    }

    /// Set the blend mode of one layer, or of every layer with `None`
    pub fn set_blend_mode(&mut self, layer: Option<usize>, mode: BlendMode) {
        match layer {
            Some(i) => {
                if let Some(l) = self.layers.get_mut(i) {
                    l.blend_mode = mode;
                }
            }
            None => {
                for l in &mut self.layers {
                    l.blend_mode = mode;
                }
            }
        }
    }

    /// Render the full scene.
    ///
    /// Layers that fail to warp are left out and reported; the rest of the
    /// stack still renders.
    pub fn render(&self, quality: Quality) -> Rendered {
        let mut canvas = Canvas::new(self.width, self.height);
        if let Some(bg) = &self.background {
            canvas.draw_stretched(bg);
        }

        let warped: Vec<Result<WarpedLayer>> = self
            .layers
            .par_iter()
            .map(|layer| self.engine.warp(&layer.image, &layer.corners, quality))
            .collect();

        // Blending is order dependent, so this part stays sequential
        let mut reports = Vec::with_capacity(self.layers.len());
        for (index, (layer, result)) in self.layers.iter().zip(warped).enumerate() {
            match result {
                Ok(warped) => {
                    warped.composite_onto(&mut canvas, layer.blend_mode);
                    debug!("Layer {} drawn at {:?} ({})", index, warped.bounds, layer.blend_mode);
                    reports.push(LayerReport {
                        index,
                        status: LayerStatus::Drawn,
                        blend_mode: layer.blend_mode,
                        bounds: Some(warped.bounds),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Skipping layer {}: {}", index, e);
                    reports.push(LayerReport {
                        index,
                        status: LayerStatus::Skipped,
                        blend_mode: layer.blend_mode,
                        bounds: Some(bounding_box(&layer.corners)),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Rendered {
            image: canvas.into_image(),
            report: RenderReport {
                width: self.width,
                height: self.height,
                quality,
                layers: reports,
            },
        }
    }
}

//! mockwarp - perspective-correct image overlays
//!
//! Projects a rectangular image onto any four destination corners on a
//! canvas, as if the image were shown on a screen photographed at an angle.
//! The core is the warp engine: a homography from the image rectangle to the
//! corners, inverse mapping of every destination pixel, bilinear or
//! supersampled resampling, and compositing through a pluggable blend surface.

pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod sample;
pub mod scene;
pub mod solver;
pub mod transform;
pub mod warp;

pub use compositor::{BlendMode, Canvas, Compositor};
pub use error::WarpError;
pub use geometry::{BoundingBox, Point, Quad};
pub use sample::PixelBuffer;
pub use scene::{Layer, Scene};
pub use transform::{Matrix3, PerspectiveTransform};
pub use warp::{draw_image, warp, Quality, WarpEngine, WarpOptions, WarpedLayer};

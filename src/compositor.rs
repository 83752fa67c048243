//! Blend modes and the compositing surface
//!
//! The warp engine never blends pixels itself. It hands each finished layer
//! to a [`Compositor`], which owns the target surface and the blend math.
//! [`Canvas`] is the software surface used by the scene renderer: standard
//! source-over alpha compositing with the separable blend functions of the
//! 2D canvas compositing model.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::Rgba;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sample::PixelBuffer;

/// Pixel blend operator, named after the canvas `globalCompositeOperation` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    #[serde(rename = "source-over", alias = "normal")]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }

    /// Canvas operator name
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Normal => "source-over",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
        }
    }

    /// Blend one backdrop channel `cb` with one source channel `cs` (both 0..1)
    pub fn blend_channel(&self, cb: f64, cs: f64) -> f64 {
        match self {
            BlendMode::Normal => cs,
            BlendMode::Multiply => cb * cs,
            BlendMode::Screen => screen(cb, cs),
            BlendMode::Overlay => hard_light(cs, cb),
            BlendMode::Darken => cb.min(cs),
            BlendMode::Lighten => cb.max(cs),
            BlendMode::ColorDodge => {
                if cb == 0.0 {
                    0.0
                } else if cs >= 1.0 {
                    1.0
                } else {
                    (cb / (1.0 - cs)).min(1.0)
                }
            }
            BlendMode::ColorBurn => {
                if cb >= 1.0 {
                    1.0
                } else if cs == 0.0 {
                    0.0
                } else {
                    1.0 - ((1.0 - cb) / cs).min(1.0)
                }
            }
            BlendMode::HardLight => hard_light(cb, cs),
            BlendMode::SoftLight => {
                if cs <= 0.5 {
                    cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
                } else {
                    let d = if cb <= 0.25 {
                        ((16.0 * cb - 12.0) * cb + 4.0) * cb
                    } else {
                        cb.sqrt()
                    };
                    cb + (2.0 * cs - 1.0) * (d - cb)
                }
            }
            BlendMode::Difference => (cb - cs).abs(),
            BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
        }
    }
}

#[inline]
fn screen(cb: f64, cs: f64) -> f64 {
    cb + cs - cb * cs
}

#[inline]
fn hard_light(cb: f64, cs: f64) -> f64 {
    if cs <= 0.5 {
        cb * 2.0 * cs
    } else {
        screen(cb, 2.0 * cs - 1.0)
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown blend mode '{0}'")]
pub struct UnknownBlendMode(pub String);

impl FromStr for BlendMode {
    type Err = UnknownBlendMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "normal" {
            return Ok(BlendMode::Normal);
        }
        BlendMode::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str() == name)
            .ok_or_else(|| UnknownBlendMode(s.to_string()))
    }
}

/// Blend one RGBA8 source pixel over one RGBA8 backdrop pixel.
///
/// Uses the general compositing formula: the blend function applies where
/// both layers are present, plain source and backdrop colour elsewhere.
pub fn blend_pixel(backdrop: Rgba<u8>, source: Rgba<u8>, mode: BlendMode) -> Rgba<u8> {
    let a_s = source[3] as f64 / 255.0;
    if a_s == 0.0 {
        return backdrop;
    }
    let a_b = backdrop[3] as f64 / 255.0;
    let a_o = a_s + a_b * (1.0 - a_s);

    let mut out = [0u8; 4];
    for c in 0..3 {
        let cs = source[c] as f64 / 255.0;
        let cb = backdrop[c] as f64 / 255.0;
        let mixed = mode.blend_channel(cb, cs);
        // Premultiplied result
        let co = a_s * (1.0 - a_b) * cs + a_s * a_b * mixed + (1.0 - a_s) * a_b * cb;
        out[c] = (co / a_o * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (a_o * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// A surface that can take finished layers
pub trait Compositor {
    /// Blend `layer` onto the surface with its top-left pixel at `origin`.
    /// Parts of the layer outside the surface are clipped.
    fn composite(&mut self, layer: &PixelBuffer, origin: (i64, i64), mode: BlendMode);
}

/// RGBA software surface
#[derive(Debug, Clone)]
pub struct Canvas {
    image: PixelBuffer,
}

impl Canvas {
    /// Fully transparent canvas
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: PixelBuffer::new(width, height),
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self {
            image: PixelBuffer::from_pixel(width, height, color),
        }
    }

    pub fn from_image(image: PixelBuffer) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &PixelBuffer {
        &self.image
    }

    pub fn into_image(self) -> PixelBuffer {
        self.image
    }

    /// Reset every pixel to transparent
    pub fn clear(&mut self) {
        for p in self.image.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
    }

    /// Draw an image stretched over the whole canvas
    pub fn draw_stretched(&mut self, image: &PixelBuffer) {
        if image.dimensions() == self.image.dimensions() {
            self.composite(image, (0, 0), BlendMode::Normal);
        } else {
            let resized = imageops::resize(image, self.width(), self.height(), FilterType::Triangle);
            self.composite(&resized, (0, 0), BlendMode::Normal);
        }
    }
}

impl Compositor for Canvas {
    fn composite(&mut self, layer: &PixelBuffer, origin: (i64, i64), mode: BlendMode) {
        let (ox, oy) = origin;
        let cw = self.image.width() as i64;
        let ch = self.image.height() as i64;

        // Visible part of the layer in layer coordinates
        let x_start = (-ox).clamp(0, layer.width() as i64);
        let y_start = (-oy).clamp(0, layer.height() as i64);
        let x_end = (cw - ox).clamp(0, layer.width() as i64);
        let y_end = (ch - oy).clamp(0, layer.height() as i64);

        for ly in y_start..y_end {
            for lx in x_start..x_end {
                let src = *layer.get_pixel(lx as u32, ly as u32);
                if src[3] == 0 {
                    continue;
                }
                let (cx, cy) = ((lx + ox) as u32, (ly + oy) as u32);
                let dst = self.image.get_pixel_mut(cx, cy);
                *dst = blend_pixel(*dst, src, mode);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    #[test]
    fn test_parse_names() {
        for mode in BlendMode::all() {
            assert_eq!(mode.as_str().parse::<BlendMode>(), Ok(*mode));
        }
        assert_eq!("normal".parse::<BlendMode>(), Ok(BlendMode::Normal));
        assert_eq!("Multiply".parse::<BlendMode>(), Ok(BlendMode::Multiply));
        assert!("plus-darker".parse::<BlendMode>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&BlendMode::ColorDodge).unwrap();
        assert_eq!(json, "\"color-dodge\"");
        let mode: BlendMode = serde_json::from_str("\"source-over\"").unwrap();
        assert_eq!(mode, BlendMode::Normal);
        let mode: BlendMode = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(mode, BlendMode::Normal);
    }

    #[test]
    fn test_normal_over_opaque() {
        let out = blend_pixel(GREY, Rgba([255, 0, 0, 255]), BlendMode::Normal);
        assert_eq!(out, Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_half_alpha_over_opaque() {
        let out = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]), BlendMode::Normal);
        assert_eq!(out, Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_over_transparent_backdrop_keeps_source() {
        // With nothing underneath every mode degrades to plain source
        for mode in BlendMode::all() {
            let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([10, 200, 30, 255]), *mode);
            assert_eq!(out, Rgba([10, 200, 30, 255]), "{}", mode);
        }
    }

    #[test]
    fn test_separable_modes() {
        let white = Rgba([255, 255, 255, 255]);
        let black = Rgba([0, 0, 0, 255]);
        assert_eq!(blend_pixel(GREY, white, BlendMode::Multiply), GREY);
        assert_eq!(blend_pixel(GREY, black, BlendMode::Screen), GREY);
        assert_eq!(blend_pixel(GREY, white, BlendMode::Difference), Rgba([127, 127, 127, 255]));
        assert_eq!(blend_pixel(GREY, black, BlendMode::Darken), black);
        assert_eq!(blend_pixel(GREY, black, BlendMode::Lighten), GREY);
        assert_eq!(blend_pixel(white, GREY, BlendMode::Exclusion), Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn test_transparent_source_is_noop() {
        for mode in BlendMode::all() {
            assert_eq!(blend_pixel(GREY, Rgba([255, 0, 0, 0]), *mode), GREY);
        }
    }

    #[test]
    fn test_composite_clips_to_canvas() {
        let mut canvas = Canvas::new(4, 4);
        let layer = PixelBuffer::from_pixel(3, 3, Rgba([255, 0, 0, 255]));

        canvas.composite(&layer, (-1, 2), BlendMode::Normal);

        let img = canvas.image();
        assert_eq!(img.get_pixel(0, 2)[3], 255);
        assert_eq!(img.get_pixel(1, 3)[3], 255);
        assert_eq!(img.get_pixel(2, 2)[3], 0);
        assert_eq!(img.get_pixel(0, 1)[3], 0);

        // Entirely off canvas
        canvas.composite(&layer, (10, -10), BlendMode::Normal);
        canvas.composite(&layer, (-3, -3), BlendMode::Normal);
        assert_eq!(canvas.image().pixels().filter(|p| p[3] == 255).count(), 4);
    }

    #[test]
    fn test_draw_stretched_and_clear() {
        let mut canvas = Canvas::new(8, 6);
        canvas.draw_stretched(&PixelBuffer::from_pixel(2, 2, Rgba([0, 0, 255, 255])));
        assert!(canvas.image().pixels().all(|p| *p == Rgba([0, 0, 255, 255])));

        canvas.clear();
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
    }
}

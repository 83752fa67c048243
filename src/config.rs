//! Scene configuration for mockwarp
//!
//! A scene file is TOML: canvas size and background, render settings, and
//! the layer stack. Image paths are resolved relative to the scene file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compositor::BlendMode;
use crate::geometry::{Point, Quad};
use crate::sample::PixelBuffer;
use crate::scene::{Layer, Scene};
use crate::warp::{Quality, WarpEngine, WarpOptions, DEFAULT_MAX_WORKING_PIXELS};

/// Target canvas
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    /// Background photo, stretched to the canvas size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<PathBuf>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            background: None,
        }
    }
}

/// Warp settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    /// Exports default to high quality; use `fast` for quick previews
    #[serde(default = "default_quality")]
    pub quality: Quality,

    /// Shard pixel rows across threads
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Reject layers whose working buffer would be larger than this
    #[serde(default = "default_max_working_pixels")]
    pub max_working_pixels: u64,
}

fn default_quality() -> Quality {
    Quality::High
}

fn default_parallel() -> bool {
    true
}

fn default_max_working_pixels() -> u64 {
    DEFAULT_MAX_WORKING_PIXELS
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            parallel: default_parallel(),
            max_working_pixels: default_max_working_pixels(),
        }
    }
}

impl RenderConfig {
    pub fn warp_options(&self) -> WarpOptions {
        WarpOptions {
            parallel: self.parallel,
            max_working_pixels: self.max_working_pixels,
        }
    }
}

/// One layer of the stack
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerConfig {
    pub image: PathBuf,

    /// Destination corners: top-left, top-right, bottom-right, bottom-left.
    /// Omitted corners place the image at its default position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corners: Option<Vec<Point>>,

    #[serde(default)]
    pub blend_mode: BlendMode,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneConfig {
    /// Where the rendered image is written
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub canvas: CanvasConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

fn default_output() -> PathBuf {
    PathBuf::from("mockup.png")
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            canvas: CanvasConfig::default(),
            render: RenderConfig::default(),
            layers: Vec::new(),
        }
    }
}

impl SceneConfig {
    /// Load a scene file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene from {:?}", path))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse scene from {:?}", path))?;
        tracing::info!(
            "Loaded scene from {:?} ({} layers)",
            path,
            config.layers.len()
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SceneConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can never render
    pub fn validate(&self) -> Result<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            bail!(
                "canvas size must be non-zero, got {}x{}",
                self.canvas.width,
                self.canvas.height
            );
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if let Some(corners) = &layer.corners {
                if corners.len() != 4 {
                    bail!("layer {} has {} corners, expected 4", i, corners.len());
                }
            }
        }
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize scene")?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create scene directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write scene to {:?}", path))?;

        tracing::info!("Saved scene to {:?}", path);
        Ok(())
    }

    /// Decode every referenced image and assemble the scene.
    ///
    /// Relative paths are taken from `base_dir`.
    pub fn build_scene(&self, base_dir: &Path) -> Result<Scene> {
        let engine = WarpEngine::new(self.render.warp_options());
        let mut scene = Scene::with_engine(self.canvas.width, self.canvas.height, engine);

        if let Some(bg) = &self.canvas.background {
            scene.background = Some(load_image(&base_dir.join(bg))?);
        }

        for (i, layer) in self.layers.iter().enumerate() {
            let image = load_image(&base_dir.join(&layer.image))
                .with_context(|| format!("Failed to load layer {}", i))?;
            match &layer.corners {
                Some(corners) => {
                    let quad: Quad = corners
                        .as_slice()
                        .try_into()
                        .with_context(|| format!("layer {} needs exactly 4 corners", i))?;
                    scene.push_layer(Layer::new(image, quad, layer.blend_mode));
                }
                None => {
                    let index = scene.add_layer(image);
                    scene.set_blend_mode(Some(index), layer.blend_mode);
                }
            }
        }

        Ok(scene)
    }
}

fn load_image(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image {:?}", path))?
        .to_rgba8();
    tracing::debug!("Loaded {:?} ({}x{})", path, image.width(), image.height());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const SCENE: &str = r#"
output = "out/shot.png"

[canvas]
width = 400
height = 300

[render]
quality = "fast"

[[layers]]
image = "screen.png"
blend_mode = "multiply"
corners = [
    { x = 10.0, y = 20.0 },
    { x = 200.0, y = 30.0 },
    { x = 190.0, y = 180.0 },
    { x = 15.0, y = 170.0 },
]

[[layers]]
image = "screen.png"
"#;

    #[test]
    fn test_parse_scene() {
        let config = SceneConfig::from_toml(SCENE).unwrap();
        assert_eq!(config.output, PathBuf::from("out/shot.png"));
        assert_eq!(config.canvas.width, 400);
        assert_eq!(config.canvas.background, None);
        assert_eq!(config.render.quality, Quality::Fast);
        assert!(config.render.parallel);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers[0].blend_mode, BlendMode::Multiply);
        assert_eq!(config.layers[1].blend_mode, BlendMode::Normal);
        assert!(config.layers[1].corners.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = SceneConfig::from_toml("").unwrap();
        assert_eq!(config, SceneConfig::default());
        assert_eq!(config.render.quality, Quality::High);
    }

    #[test]
    fn test_rejects_bad_scenes() {
        assert!(SceneConfig::from_toml("[canvas]\nwidth = 0\nheight = 10\n").is_err());
        let three = r#"
[[layers]]
image = "a.png"
corners = [{ x = 0.0, y = 0.0 }, { x = 1.0, y = 0.0 }, { x = 1.0, y = 1.0 }]
"#;
        assert!(SceneConfig::from_toml(three).is_err());
        assert!(SceneConfig::from_toml("[[layers]]\nimage = \"a.png\"\nblend_mode = \"plus\"\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scene.toml");

        let config = SceneConfig::from_toml(SCENE).unwrap();
        config.save(&path).unwrap();
        let loaded = SceneConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_build_scene_loads_images() {
        let dir = tempfile::tempdir().unwrap();
        PixelBuffer::from_pixel(40, 30, Rgba([0, 200, 0, 255]))
            .save(dir.path().join("screen.png"))
            .unwrap();

        let config = SceneConfig::from_toml(SCENE).unwrap();
        let scene = config.build_scene(dir.path()).unwrap();

        assert_eq!((scene.width(), scene.height()), (400, 300));
        assert_eq!(scene.layers.len(), 2);
        assert_eq!(scene.layers[0].corners[1], Point::new(200.0, 30.0));
        assert_eq!(scene.layers[0].blend_mode, BlendMode::Multiply);
        // Default placement: natural size inside the padding
        assert_eq!(scene.layers[1].corners[2], Point::new(90.0, 80.0));

        let rendered = scene.render(config.render.quality);
        assert_eq!(rendered.report.drawn(), 2);
    }

    #[test]
    fn test_build_scene_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let config = SceneConfig::from_toml(SCENE).unwrap();
        assert!(config.build_scene(dir.path()).is_err());
    }
}

//! mockwarp - render device mockups from a scene file
//!
//! Loads a TOML scene (background photo plus image layers pinned to corner
//! points), warps every layer into place with correct perspective, and
//! writes the composited result.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mockwarp::config::SceneConfig;
use mockwarp::Quality;

/// mockwarp - perspective image overlays for device mockups
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene file path
    #[arg(short, long, default_value = "scene.toml")]
    config: PathBuf,

    /// Output image (overrides the scene file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Single-sample preview quality instead of supersampled export quality
    #[arg(long)]
    fast: bool,

    /// Write a template scene file to --config and exit
    #[arg(long)]
    init: bool,

    /// Print a JSON report of the rendered layers
    #[arg(long)]
    report: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("mockwarp v{}", env!("CARGO_PKG_VERSION"));

    if args.init {
        if args.config.exists() {
            anyhow::bail!("{:?} already exists", args.config);
        }
        SceneConfig::default().save(&args.config)?;
        return Ok(());
    }

    let config = SceneConfig::load(&args.config)?;
    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let scene = config.build_scene(base_dir)?;

    let quality = if args.fast {
        Quality::Fast
    } else {
        config.render.quality
    };
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| base_dir.join(&config.output));

    info!(
        "Rendering {}x{} canvas, {} layers, {:?} quality",
        scene.width(),
        scene.height(),
        scene.layers.len(),
        quality
    );

    let start = Instant::now();
    let rendered = scene.render(quality);
    info!(
        "Rendered {} of {} layers in {:.1} ms",
        rendered.report.drawn(),
        rendered.report.layers.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    if rendered.report.skipped() > 0 {
        warn!(
            "{} layer(s) were skipped, see the warnings above",
            rendered.report.skipped()
        );
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }
    }
    rendered
        .image
        .save(&output)
        .with_context(|| format!("Failed to write {:?}", output))?;
    info!("Saved {:?}", output);

    if args.report {
        let json = serde_json::to_string_pretty(&rendered.report)
            .context("Failed to serialize render report")?;
        println!("{}", json);
    }

    Ok(())
}

//! shardmap - multi-shard projection mapping renderer
//!
//! Splits one source image across up to 14 independently warped screen
//! regions. Shard descriptors (point correspondences plus mask polygons)
//! and a source image come in from disk; the composited frame goes out as
//! a PNG for the display or preview consumer.

mod compositor;
mod config;
mod error;
mod homography;
mod shard;
mod stencil;
mod texture;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::compositor::Compositor;
use crate::shard::Registry;
use crate::texture::SourceTexture;
use crate::view::Controls;

/// shardmap - stencil-partitioned homography warping
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Source image (overrides the configured path)
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Shard descriptor JSON (overrides the configured path)
    #[arg(short, long)]
    shards: Option<PathBuf>,

    /// Output PNG path
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,

    /// Render only this shard slot instead of all visible shards
    #[arg(long)]
    shard: Option<usize>,

    /// Hide a shard slot (repeatable)
    #[arg(long = "hide", value_name = "SLOT")]
    hidden: Vec<usize>,

    /// Tint each shard with its slot color
    #[arg(long)]
    debug_tint: bool,

    /// Pan offset X for the source window
    #[arg(long)]
    pan_x: Option<f64>,

    /// Pan offset Y for the source window
    #[arg(long)]
    pan_y: Option<f64>,

    /// Zoom multiplier for the source window
    #[arg(long)]
    zoom: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("shardmap v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration, with CLI args as overrides
    let config = config::Config::load_or_create(&args.config)?;

    let image_path = args.image.unwrap_or_else(|| config.data.image.clone());
    let shards_path = args.shards.unwrap_or_else(|| config.data.shards.clone());

    // Publish the configured view settings, then apply CLI overrides the
    // same way a live control surface would
    let controls = Controls::new(config.view.clone());
    if let Some(slot) = args.shard {
        controls.set_show_all(false);
        controls.select_shard(slot);
    }
    for slot in &args.hidden {
        controls.set_visible(*slot, false);
    }
    if args.debug_tint {
        controls.set_debug_tint(true);
    }
    if args.pan_x.is_some() || args.pan_y.is_some() || args.zoom.is_some() {
        let base = controls.snapshot();
        controls.set_pan_zoom(
            args.pan_x.unwrap_or(base.pan_x),
            args.pan_y.unwrap_or(base.pan_y),
            args.zoom.unwrap_or(base.zoom),
        );
    }

    info!("Render target: {}x{}", config.display.width, config.display.height);

    // Build the shard registry from descriptor data
    let descriptors = config::load_shards(&shards_path)?;
    let registry = Registry::new();
    registry.replace(&descriptors);

    let shards = registry.current();
    info!(
        "Shards available: {}/{} ready",
        shards.ready_count(),
        shards.len()
    );

    // Source texture must be ready before the compositor runs
    let texture = SourceTexture::load(&image_path)?;

    let compositor = Compositor::new(config.display.width, config.display.height)
        .context("Failed to initialize compositor")?;

    // Render one frame from a consistent view snapshot
    let snapshot = controls.snapshot();

    let frame = compositor
        .render(&shards, &texture, &snapshot)
        .context("Failed to composite frame")?;

    frame.save_png(&args.output)?;
    info!("Wrote {}x{} frame to {:?}", frame.width(), frame.height(), args.output);

    Ok(())
}

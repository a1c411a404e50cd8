//! Headless driver for the scratch surface.
//!
//! Replays a gesture script (or a seeded random scribble) against a surface,
//! logs reveal events and writes the rendered result as a PNG.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use image::{Rgba, RgbaImage};
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use scratch_reveal::config::Configuration;
use scratch_reveal::events::RevealEvent;
use scratch_reveal::gesture::{self, GestureScript};
use scratch_reveal::{GlyphMeasure, MeasureText, ScratchSurface, TextExtent, fonts};

#[derive(Debug, Parser)]
#[command(
    name = "scratch-reveal",
    version,
    about = "Replay pointer gestures against a scratch-off surface"
)]
struct Cli {
    /// Path to YAML config file; defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// YAML gesture script to replay; takes precedence over the scribble
    #[arg(short, long, value_name = "FILE")]
    gesture: Option<PathBuf>,

    /// Replay this many random strokes instead of a script
    #[arg(long, value_name = "STROKES", default_value_t = 8)]
    scribble: usize,

    /// Seed for the random scribble
    #[arg(long, value_name = "SEED", default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 400)]
    width: u32,

    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Call reveal() after the gesture
    #[arg(long)]
    reveal: bool,

    /// Where to write the rendered surface
    #[arg(short, long, value_name = "FILE", default_value = "scratch.png")]
    output: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("scratch_reveal={level}")
            .parse()
            .context("invalid log directive")?,
    );
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn text_measure(cfg: &Configuration) -> Box<dyn MeasureText> {
    if cfg.content.text.is_empty() {
        return Box::new(TextExtent::default());
    }
    match fonts::load_font(cfg.content.font_path.as_deref()) {
        Ok(font) => Box::new(GlyphMeasure::new(font, cfg.content.font_size)),
        Err(err) => {
            warn!("text measurement unavailable, content bounds will be empty: {err}");
            Box::new(TextExtent::default())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    }
    .validated()
    .context("invalid configuration values")?;

    let script = match &cli.gesture {
        Some(path) => GestureScript::from_yaml_file(path)
            .with_context(|| format!("failed to load gesture script from {}", path.display()))?,
        None => gesture::scribble(cli.width, cli.height, cli.scribble, cli.seed),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start sampling runtime")?;

    let mut surface = ScratchSurface::from_config(&cfg, runtime.handle().clone(), text_measure(&cfg))?;
    surface.set_reveal_listener(|event| match event {
        RevealEvent::PercentChanged(percent) => info!(percent, "reveal percent changed"),
        RevealEvent::FullyRevealed => info!("fully revealed"),
    });
    surface
        .on_resize(cli.width, cli.height)
        .context("failed to build the cover mask")?;

    info!(events = script.len(), "replaying gesture");
    for event in &script.events {
        surface.handle_pointer(*event);
        surface.poll();
    }
    if cli.reveal {
        surface.reveal();
    }
    if !surface.settle(cfg.settle_timeout) {
        warn!(timeout = ?cfg.settle_timeout, "gave up waiting for reveal samples");
    }

    let stats = surface.stats();
    info!(
        percent = surface.reveal_percent() * 100.0,
        revealed = surface.is_revealed(),
        commits = stats.commits,
        samples = stats.samples_dispatched,
        dropped = stats.samples_dropped,
        "gesture finished"
    );

    let mut canvas = RgbaImage::from_pixel(cli.width, cli.height, Rgba([255, 255, 255, 255]));
    surface.render(&mut canvas);
    canvas
        .save(&cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    info!(path = %cli.output.display(), "wrote rendered surface");
    Ok(())
}

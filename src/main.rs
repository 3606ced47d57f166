#![forbid(unsafe_code)]

mod config;
mod demo;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tessera_blocks::BlockRegistry;

use crate::config::TesseraConfig;

#[derive(Parser, Debug)]
#[command(name = "tessera", about = "Headless driver for the staged voxel pipeline")]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Block definitions TOML; the built-in set is used when omitted
    #[arg(long)]
    blocks: Option<PathBuf>,
    /// Override the view radius in chunks
    #[arg(long)]
    radius: Option<i32>,
    /// Give up after this many scheduler ticks
    #[arg(long, default_value_t = 100_000)]
    max_ticks: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => TesseraConfig::load(path)?,
        None => TesseraConfig::default(),
    };
    if let Some(r) = cli.radius {
        cfg.world.view_radius = r;
    }
    cfg.validate()?;

    let registry = match &cli.blocks {
        Some(path) => BlockRegistry::load_from_path(path)?,
        None => BlockRegistry::builtin(),
    };
    log::info!(
        "{} block types, chunk edge {}, radius {}",
        registry.len(),
        cfg.world.chunk_size,
        cfg.world.view_radius
    );

    demo::run(&cfg, Arc::new(registry), cli.max_ticks)
}

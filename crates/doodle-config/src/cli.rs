//! Command-line argument parsing for the terrain server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Doodle Empires terrain server arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "doodle-server", about = "Doodle Empires terrain server")]
pub struct CliArgs {
    /// Map width in tiles (new maps only).
    #[arg(long)]
    pub width: Option<u32>,

    /// Map height in tiles (new maps only).
    #[arg(long)]
    pub height: Option<u32>,

    /// Generator seed.
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i32>,

    /// Listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Tile ticks per second.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Map file to load instead of generating one.
    #[arg(long)]
    pub load: Option<PathBuf>,

    /// Stop after this many seconds (runs until interrupted otherwise).
    #[arg(long)]
    pub run_seconds: Option<u64>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.terrain.width = w;
        }
        if let Some(h) = args.height {
            self.terrain.height = h;
        }
        if let Some(seed) = args.seed {
            self.terrain.seed = Some(seed);
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(rate) = args.tick_rate {
            self.simulation.tick_rate_hz = rate;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

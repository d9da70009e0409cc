//! Doodle Empires terrain server.
//!
//! Loads a saved map (or generates one from the configured seed), hands it to
//! the terrain authority thread, and saves it again on the way out.
//!
//! Run with: `cargo run -p doodle-server -- --run-seconds 10`

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use doodle_config::{CliArgs, Config, ConfigError, default_config_dir};
use doodle_net::{AuthorityError, Outbound, TerrainAuthority, TickSettings};
use doodle_terrain::{
    CatalogError, GridError, MapSettings, SaveError, TerrainMap, TileCatalog, load_from_path,
    save_to_path,
};
use tracing::{error, info, warn};

/// How often a long-running server writes its map to disk.
const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build tile catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("{}: {source}", path.display())]
    Load { path: PathBuf, source: SaveError },
    #[error("{}: unsupported save version", .0.display())]
    UnsupportedVersion(PathBuf),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error ({err}), using defaults");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    doodle_log::init_logging(
        Some(&config.storage.save_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );

    match run(&config, args.load.as_deref(), args.run_seconds) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, load: Option<&Path>, run_seconds: Option<u64>) -> Result<(), ServerError> {
    let catalog = Arc::new(TileCatalog::standard()?);
    let settings = map_settings(config, config.terrain.seed.unwrap_or_else(rand::random));
    info!(
        "Map: {}x{} | Seed: {} | Port: {}",
        settings.width, settings.height, settings.seed, config.network.port
    );

    let map = open_map(catalog, settings, load)?;
    let tick = TickSettings {
        rate_hz: config.simulation.tick_rate_hz,
        rows_per_tick: config.simulation.rows_per_tick,
    };
    let authority = TerrainAuthority::spawn(map, tick)?;

    let save_path = config.storage.map_path();
    let deadline = run_seconds.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut next_autosave = Instant::now() + AUTOSAVE_INTERVAL;
    loop {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }
        if now >= next_autosave {
            let bytes = authority.save_bytes()?;
            if let Err(err) = write_save(&save_path, &bytes) {
                warn!(path = %save_path.display(), error = %err, "autosave failed");
            }
            next_autosave = now + AUTOSAVE_INTERVAL;
        }

        let wait = deadline
            .map_or(next_autosave, |deadline| deadline.min(next_autosave))
            .saturating_duration_since(now);
        // No transport is attached yet; outbound traffic is only logged.
        match authority.outbound().recv_timeout(wait) {
            Ok(Outbound::Broadcast(bytes)) => tracing::trace!(len = bytes.len(), "broadcast"),
            Ok(Outbound::Disconnect { client, reason }) => {
                info!(client = client.0, %reason, "disconnect");
            }
            Err(_) => {}
        }
    }

    let map = authority.shutdown()?;
    save_to_path(&map, &save_path)?;
    info!(changes = map.deltas().len(), "server stopped");
    Ok(())
}

/// Generator settings for a new map from the terrain section of the config.
fn map_settings(config: &Config, seed: i32) -> MapSettings {
    let terrain = &config.terrain;
    MapSettings {
        width: terrain.width,
        height: terrain.height,
        tile_width: terrain.tile_width,
        tile_height: terrain.tile_height,
        surface_row: terrain.surface_row,
        height_modifier: terrain.height_modifier,
        seed,
        ..MapSettings::default()
    }
}

fn open_map(
    catalog: Arc<TileCatalog>,
    settings: MapSettings,
    load: Option<&Path>,
) -> Result<TerrainMap, ServerError> {
    let Some(path) = load else {
        return Ok(TerrainMap::generate(catalog, settings)?);
    };
    match load_from_path(path, catalog, &settings) {
        Ok(Some(map)) => Ok(map),
        Ok(None) => Err(ServerError::UnsupportedVersion(path.to_path_buf())),
        Err(source) => Err(ServerError::Load {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_save(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    info!(path = %path.display(), "autosaved terrain");
    Ok(())
}

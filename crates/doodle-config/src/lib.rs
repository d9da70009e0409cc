//! Configuration for the Doodle Empires terrain server.
//!
//! Settings persist to disk as `config.ron`, every section falls back to its
//! defaults when missing, and command-line flags override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, NetworkConfig, SimulationConfig, StorageConfig, TerrainConfig,
    default_config_dir,
};
pub use error::ConfigError;

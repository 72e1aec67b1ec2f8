//! Profile configuration for the `sas` command-line tool.
//!
//! Profiles live in `~/.sas/config.json` (or `config.toml`), keyed by name.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::ConfigError,
    loader::{config_dir, credentials_path, discover_and_load, load_config, load_from_dir},
    schema::{ProfileConfig, SasConfig},
};

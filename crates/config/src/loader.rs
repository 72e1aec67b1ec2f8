use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{error::ConfigError, schema::SasConfig};

/// Config file names inside the config directory, checked in order.
const CONFIG_FILENAMES: &[&str] = &["config.json", "config.toml"];

/// Environment variable that relocates the config directory.
pub const CONFIG_DIR_ENV: &str = "SAS_CONFIG_DIR";

/// Returns the config directory: `$SAS_CONFIG_DIR`, or `~/.sas/`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    home_dir()
        .map(|h| h.join(".sas"))
        .unwrap_or_else(|| PathBuf::from(".sas"))
}

/// Path of the credential file shared by every profile.
pub fn credentials_path() -> PathBuf {
    config_dir().join("credentials.json")
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Discover and load the config file from the config directory.
pub fn discover_and_load() -> Result<SasConfig, ConfigError> {
    load_from_dir(&config_dir())
}

/// Load the first config file found in `dir`.
pub fn load_from_dir(dir: &Path) -> Result<SasConfig, ConfigError> {
    let path = find_config_file(dir).ok_or_else(|| ConfigError::NotFound {
        dir: dir.to_path_buf(),
    })?;
    debug!(path = %path.display(), "loading config");
    load_config(&path)
}

fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Load config from the given path (JSON or TOML, by extension).
pub fn load_config(path: &Path) -> Result<SasConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> Result<SasConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "toml" => toml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

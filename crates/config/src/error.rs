use std::path::PathBuf;

/// Failures while locating, reading or querying the profile configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found in {}", dir.display())]
    NotFound { dir: PathBuf },

    #[error("could not open config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),

    #[error("profile '{0}' not found in config")]
    ProfileNotFound(String),
}

//! Config schema: a map of profile name to per-profile settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration, keyed by profile name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SasConfig {
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Settings for a single profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProfileConfig {
    /// OAuth client registered with the SAS Logon service.
    pub oauth_client_id: String,

    /// Base URL of the SAS deployment, e.g. `https://sas.example.com`.
    pub sas_endpoint: String,

    /// Preferred output format. Carried for other commands; auth ignores it.
    pub output: String,

    pub ansi_colors_enabled: String,
}

impl SasConfig {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&ProfileConfig, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

use std::{
    collections::BTreeMap,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{error::Error, types::TokenRecord};

/// Every stored token, keyed by profile name.
pub type Credentials = BTreeMap<String, TokenRecord>;

/// File-based token storage at `~/.sas/credentials.json`.
///
/// Every save rewrites the whole file in place; there is no temp-file rename
/// and no lock. Two processes saving at the same time can lose one update or
/// expose a half-written file to a concurrent reader.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            path: sas_config::credentials_path(),
        }
    }

    /// Store at a path other than `~/.sas/credentials.json`.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every stored token. A missing file is an empty store.
    pub fn load(&self) -> Result<Credentials, Error> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Credentials::new()),
            Err(source) => {
                return Err(Error::StorageRead {
                    path: self.path.clone(),
                    source,
                });
            },
        };

        serde_json::from_slice(&data).map_err(|source| Error::StorageFormat {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the file contents with `creds`, owner read/write only.
    pub fn save(&self, creds: &Credentials) -> Result<(), Error> {
        let write_err = |source| Error::StorageWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let data = serde_json::to_string_pretty(creds)
            .map_err(|e| write_err(std::io::Error::other(e)))?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(write_err)?;
        file.write_all(data.as_bytes()).map_err(write_err)?;
        file.flush().map_err(write_err)?;

        // The mode above only applies when the file is created.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }

        debug!(path = %self.path.display(), profiles = creds.len(), "saved credentials");
        Ok(())
    }

    /// The stored token for `profile`.
    pub fn get_token(&self, profile: &str) -> Result<TokenRecord, Error> {
        self.load()?
            .remove(profile)
            .ok_or_else(|| Error::ProfileNotAuthenticated(profile.to_string()))
    }

    /// Store `record` for `profile`, keeping every other profile as it is on
    /// disk right now.
    pub fn save_token(&self, profile: &str, record: &TokenRecord) -> Result<(), Error> {
        let mut creds = self.load()?;
        creds.insert(profile.to_string(), record.clone());
        self.save(&creds)
    }

    /// Remove the token for `profile`. Returns whether one was stored.
    pub fn delete(&self, profile: &str) -> Result<bool, Error> {
        let mut creds = self.load()?;
        if creds.remove(profile).is_none() {
            return Ok(false);
        }
        self.save(&creds)?;
        Ok(true)
    }

    /// Names of every profile with a stored token, sorted.
    pub fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.load()?.into_keys().collect())
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can end a login attempt or a credential store operation.
///
/// All variants are terminal for the attempt that produced them; nothing is
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    #[error("could not open browser: {0}")]
    BrowserLaunchFailed(#[source] std::io::Error),

    #[error("failed to start callback listener on {addr}: {source}")]
    ListenerStart {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("callback listener failed: {0}")]
    ListenerServe(#[source] std::io::Error),

    #[error("login cancelled before the authorization redirect arrived")]
    Cancelled,

    #[error("authorization code not found")]
    AuthorizationCodeMissing,

    #[error("timed out after {0:?} waiting for the authorization redirect")]
    AuthorizationTimedOut(Duration),

    #[error("failed to exchange token: {0}")]
    TokenRequest(#[from] reqwest::Error),

    #[error("failed to exchange token: HTTP {status}: {body}")]
    TokenRejected { status: u16, body: String },

    #[error("failed to read credentials file {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse credentials file {}: {source}", path.display())]
    StorageFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write credentials file {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no token found for profile {0}")]
    ProfileNotAuthenticated(String),
}

impl Error {
    /// The credential file could not be read, parsed or written.
    ///
    /// During a login this means the provider issued tokens that were not
    /// persisted.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageRead { .. } | Self::StorageFormat { .. } | Self::StorageWrite { .. }
        )
    }

    /// The token endpoint call failed or was rejected.
    pub fn is_exchange(&self) -> bool {
        matches!(self, Self::TokenRequest(_) | Self::TokenRejected { .. })
    }
}

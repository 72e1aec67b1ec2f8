use {
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

/// Authorization settings for one login, derived from a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Anti-forgery value sent with the authorization request.
    pub state: String,
}

/// One profile's stored credentials.
///
/// Saving a record replaces whatever was stored for the profile before; the
/// fields are never merged individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TokenRecord {
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,

    pub expiry: DateTime<Utc>,

    /// Empty when the provider did not issue a refresh token.
    #[serde(serialize_with = "serialize_secret", default = "empty_secret")]
    pub refresh_token: Secret<String>,
}

impl TokenRecord {
    pub fn new(
        access_token: impl Into<String>,
        expiry: DateTime<Utc>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            expiry,
            refresh_token: Secret::new(refresh_token.into()),
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.expose_secret().is_empty()
    }

    /// Whether the provider reported a lifetime for the access token.
    ///
    /// Anything at or before the Unix epoch means unknown, which also covers
    /// `0001-01-01T00:00:00Z` written by older tools for the same file.
    pub fn has_expiry(&self) -> bool {
        self.expiry > DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.has_expiry() && self.expiry <= now
    }
}

impl PartialEq for TokenRecord {
    fn eq(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.expiry == other.expiry
            && self.refresh_token.expose_secret() == other.refresh_token.expose_secret()
    }
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

/// Serialize a secret string as plain text (for the on-disk credential file).
pub fn serialize_secret<S: Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

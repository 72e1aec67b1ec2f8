use {
    async_trait::async_trait,
    chrono::{DateTime, TimeDelta, Utc},
    serde::Deserialize,
    tracing::debug,
};

use crate::{
    error::Error,
    types::{OAuthConfig, TokenRecord},
};

/// Trades an authorization code for tokens.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<TokenRecord, Error>;
}

/// Authorization Code flow against a SAS Logon token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    config: OAuthConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// The URL the user must visit to grant access (offline access requested).
    pub fn authorization_url(&self) -> Result<String, Error> {
        let scope = self.config.scopes.join(" ");
        let url = url::Url::parse_with_params(&self.config.auth_url, [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", self.config.state.as_str()),
            ("access_type", "offline"),
        ])
        .map_err(|e| Error::InvalidConfig(format!("auth url {}: {e}", self.config.auth_url)))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens, using the same redirect URI
    /// and client id the authorization request carried.
    pub async fn exchange(&self, code: &str) -> Result<TokenRecord, Error> {
        debug!(token_url = %self.config.token_url, "exchanging authorization code");
        let resp = self
            .client
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = resp.json().await?;
        Ok(TokenRecord::new(
            body.access_token,
            expiry_from(Utc::now(), body.expires_in),
            body.refresh_token.unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl TokenExchanger for OAuthFlow {
    async fn exchange(&self, code: &str) -> Result<TokenRecord, Error> {
        OAuthFlow::exchange(self, code).await
    }
}

/// Absolute expiry for a relative lifetime; the Unix epoch when unknown.
fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    expires_in
        .filter(|secs| *secs > 0)
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

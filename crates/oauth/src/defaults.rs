use sas_config::ProfileConfig;

use crate::{error::Error, types::OAuthConfig};

/// Port of the local redirect listener.
pub const CALLBACK_PORT: u16 = 8080;

/// Path the provider redirects the browser to.
pub const CALLBACK_PATH: &str = "/callback";

/// Redirect URI registered for the CLI client.
pub const REDIRECT_URI: &str = "http://localhost:8080/callback";

/// Anti-forgery value sent with every authorization request.
pub const STATE_TOKEN: &str = "state-token";

pub const DEFAULT_SCOPES: &[&str] = &["openid"];

const AUTHORIZE_PATH: &str = "/SASLogon/oauth/authorize";
const TOKEN_PATH: &str = "/SASLogon/oauth/token";

/// Build the authorization settings for a profile.
pub fn oauth_config_for_profile(profile: &ProfileConfig) -> Result<OAuthConfig, Error> {
    let endpoint = profile.sas_endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(Error::InvalidConfig("sas-endpoint is not set".into()));
    }
    if profile.oauth_client_id.trim().is_empty() {
        return Err(Error::InvalidConfig("oauth-client-id is not set".into()));
    }

    Ok(OAuthConfig {
        client_id: profile.oauth_client_id.trim().to_string(),
        auth_url: format!("{endpoint}{AUTHORIZE_PATH}"),
        token_url: format!("{endpoint}{TOKEN_PATH}"),
        redirect_uri: REDIRECT_URI.into(),
        scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        state: STATE_TOKEN.into(),
    })
}

/// The callback port for a config (parsed from `redirect_uri`).
pub fn callback_port(config: &OAuthConfig) -> u16 {
    url::Url::parse(&config.redirect_uri)
        .ok()
        .and_then(|u| u.port())
        .unwrap_or(CALLBACK_PORT)
}

/// The callback path for a config (parsed from `redirect_uri`).
pub fn callback_path(config: &OAuthConfig) -> String {
    url::Url::parse(&config.redirect_uri)
        .ok()
        .map(|u| u.path().to_string())
        .filter(|p| p != "/")
        .unwrap_or_else(|| CALLBACK_PATH.into())
}

use std::time::Duration;

use {
    anyhow::{Context, Result, anyhow},
    chrono::{DateTime, Utc},
    sas_config::SasConfig,
    sas_oauth::{Error, LoginFlow, TokenRecord, TokenStore, oauth_config_for_profile},
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// `sas auth`: interactive browser login for `profile`.
pub async fn login(profile: &str, timeout: Option<Duration>) -> Result<()> {
    let config = sas_config::discover_and_load()?;
    let profile_config = config
        .profile(profile)
        .map_err(|e| anyhow!("{e} ({})", known_profiles(&config)))?;
    debug!(profile, endpoint = %profile_config.sas_endpoint, "loaded profile");

    let oauth = oauth_config_for_profile(profile_config)?;
    println!("Running auth with profile {profile}");

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let login = LoginFlow::new(profile, oauth)
        .with_timeout(timeout)
        .with_shutdown(shutdown);
    match login.run().await {
        Ok(_) => {
            println!("Authentication Complete!");
            Ok(())
        },
        Err(e) => Err(login_error(e)),
    }
}

fn known_profiles(config: &SasConfig) -> String {
    let names: Vec<_> = config.profile_names().collect();
    if names.is_empty() {
        "no profiles are configured".into()
    } else {
        format!("configured profiles: {}", names.join(", "))
    }
}

fn login_error(e: Error) -> anyhow::Error {
    if e.is_storage() {
        anyhow::Error::new(e).context(
            "authentication succeeded, but the token could not be saved; run `sas auth` again",
        )
    } else {
        anyhow::Error::new(e).context("authentication failed")
    }
}

/// `sas status`: every stored profile with its token validity.
pub fn status() -> Result<()> {
    let store = TokenStore::new();
    let profiles = store.list()?;
    if profiles.is_empty() {
        println!("No authenticated profiles.");
        return Ok(());
    }
    let now = Utc::now();
    for profile in profiles {
        let token = store.get_token(&profile)?;
        println!("{profile} [{}]", describe_expiry(&token, now));
    }
    Ok(())
}

/// `sas token`: print the access token, for use in scripts.
pub fn token(profile: &str) -> Result<()> {
    let token = TokenStore::new()
        .get_token(profile)
        .with_context(|| format!("run `sas --profile {profile} auth` first"))?;
    if token.is_expired_at(Utc::now()) {
        eprintln!("warning: the token for profile {profile} has expired");
    }
    println!("{}", token.access_token.expose_secret());
    Ok(())
}

/// `sas logout`: forget the stored token for `profile`.
pub fn logout(profile: &str) -> Result<()> {
    if TokenStore::new().delete(profile)? {
        println!("Logged out from {profile}");
    } else {
        println!("Profile {profile} was not logged in");
    }
    Ok(())
}

fn describe_expiry(token: &TokenRecord, now: DateTime<Utc>) -> String {
    if !token.has_expiry() {
        return "no expiry".into();
    }
    if token.is_expired_at(now) {
        return "expired".into();
    }
    let remaining = (token.expiry - now).num_seconds();
    let hours = remaining / 3600;
    let mins = (remaining % 3600) / 60;
    format!("valid ({hours}h {mins}m remaining)")
}

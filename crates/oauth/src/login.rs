use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use {
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    browser::{BrowserLauncher, SystemBrowser},
    callback_server::CallbackServer,
    defaults::{callback_path, callback_port},
    error::Error,
    flow::{OAuthFlow, TokenExchanger},
    storage::TokenStore,
    types::{OAuthConfig, TokenRecord},
};

/// Drives one interactive login for a profile: build the authorization URL,
/// show it to the user, wait for the redirect, exchange, persist.
///
/// Every step runs once. Any error ends the login.
pub struct LoginFlow {
    profile: String,
    flow: OAuthFlow,
    store: TokenStore,
    exchanger: Arc<dyn TokenExchanger>,
    browser: Box<dyn BrowserLauncher>,
    bind_addr: SocketAddr,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl LoginFlow {
    /// A login using the default credential file, the system browser and the
    /// profile's token endpoint. The listener binds `127.0.0.1` on the port
    /// of the redirect URI.
    pub fn new(profile: impl Into<String>, config: OAuthConfig) -> Self {
        let flow = OAuthFlow::new(config);
        let port = callback_port(flow.config());
        Self {
            profile: profile.into(),
            exchanger: Arc::new(flow.clone()),
            flow,
            store: TokenStore::new(),
            browser: Box::new(SystemBrowser),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            timeout: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_store(mut self, store: TokenStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.exchanger = exchanger;
        self
    }

    pub fn with_browser(mut self, browser: impl BrowserLauncher + 'static) -> Self {
        self.browser = Box::new(browser);
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Give up waiting for the redirect after `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop waiting for the redirect when `shutdown` is cancelled (Ctrl-C).
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run the whole login and return the token that was saved.
    pub async fn run(self) -> Result<TokenRecord, Error> {
        let timeout = self.timeout;
        self.start().await?.wait(timeout).await
    }

    /// Build the URL, notify the user and bind the listener. The returned
    /// server performs the rest once waited on.
    pub async fn start(self) -> Result<CallbackServer, Error> {
        let url = self.flow.authorization_url()?;
        info!(profile = %self.profile, "authorization url built");

        println!("Opening browser for authentication...");
        if let Err(e) = self.browser.open(&url) {
            warn!(error = %e, "falling back to manual url");
            println!("Please open the following URL manually:\n{url}");
        }

        let path = callback_path(self.flow.config());
        let server = CallbackServer::bind(
            self.bind_addr,
            &path,
            &self.profile,
            self.store,
            self.exchanger,
            self.shutdown,
        )
        .await?;
        info!(addr = %self.bind_addr, path = %path, "waiting for authentication");
        Ok(server)
    }
}

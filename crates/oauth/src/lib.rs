pub mod browser;
pub mod callback_server;
pub mod defaults;
pub mod error;
pub mod flow;
pub mod login;
pub mod storage;
pub mod types;

pub use {
    browser::{BrowserLauncher, SystemBrowser},
    callback_server::CallbackServer,
    defaults::{callback_path, callback_port, oauth_config_for_profile},
    error::{Error, Result},
    flow::{OAuthFlow, TokenExchanger},
    login::LoginFlow,
    storage::{Credentials, TokenStore},
    types::{OAuthConfig, TokenRecord, serialize_secret},
};

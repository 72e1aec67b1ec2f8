use crate::error::Error;

/// Best-effort side channel that shows the authorization URL to the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), Error>;
}

/// Opens URLs in the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), Error> {
        open::that_detached(url).map_err(Error::BrowserLaunchFailed)
    }
}

//! Leaving the app for a provider's consent page.

use crate::{AuthError, AuthResult};
use tracing::info;

/// Something that can send the user to a URL.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str) -> AuthResult<()>;
}

/// Opens URLs in the system browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) -> AuthResult<()> {
        info!("Opening browser for authorization");
        open::that(url)
            .map_err(|e| AuthError::Config(format!("Failed to open browser: {}", e)))
    }
}

/// Leaves navigation to the caller, which is expected to print the URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualNavigator;

impl Navigator for ManualNavigator {
    fn navigate(&self, _url: &str) -> AuthResult<()> {
        Ok(())
    }
}

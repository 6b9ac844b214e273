//! CLI command implementations.

mod account;
mod oauth;
mod profile;
mod site;

pub use account::{
    account_from_url, account_oauth, account_refresh, account_reset_password,
    account_session, account_set_session, account_signin, account_signout, account_signup,
    account_update, account_user,
};
pub use oauth::{oauth_callback, oauth_login, oauth_url};
pub use profile::{profile_create, profile_get, profile_update};
pub use site::{forgot_password, login, logout, register, status};

use anyhow::{Context, Result};
use devspark_auth::{AuthContext, BrowserNavigator, ManualNavigator, Navigator};
use devspark_config::{Config, Paths};
use serde_json::Value;
use std::io::{self, Write};
use std::sync::Arc;

/// Build the auth context for this invocation.
pub async fn build_context(config: Config, paths: &Paths, no_browser: bool) -> Result<AuthContext> {
    let navigator: Arc<dyn Navigator> = if no_browser {
        Arc::new(ManualNavigator)
    } else {
        Arc::new(BrowserNavigator)
    };
    let ctx = AuthContext::new(config, paths, navigator).await?;
    Ok(ctx)
}

/// Prompt for a line of input, or use `value` when already given.
fn prompt_or(value: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }

    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(input)
}

/// Prompt for a password without echo.
fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    if password.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(password)
}

/// Parse a JSON object given on the command line.
fn parse_object(raw: &str, what: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", what))?;
    if !value.is_object() {
        anyhow::bail!("{} must be a JSON object", what);
    }
    Ok(value)
}

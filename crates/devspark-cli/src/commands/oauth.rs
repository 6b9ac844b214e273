//! Site OAuth commands.

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use devspark_auth::{AuthContext, CallbackResult, OAuthCallbackServer};
use serde_json::json;
use tracing::info;

fn print_result(result: &CallbackResult, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("Signed in with {}", result.provider);
            let profile = &result.user_profile;
            if let Some(name) = profile.name.as_deref() {
                output::print_row("Name", name);
            }
            if let Some(email) = profile.email.as_deref() {
                output::print_row("Email", email);
            }
            if let Some(expires_in) = result.expires_in {
                output::print_row("Expires in", &format!("{}s", expires_in));
            }
        }
        OutputFormat::Json => output::print_json(result),
    }
}

/// Print the authorization URL for a provider, or list the providers.
pub fn oauth_url(ctx: &AuthContext, provider: Option<&str>, format: &OutputFormat) -> Result<()> {
    let oauth = ctx.oauth();

    let Some(provider) = provider else {
        match format {
            OutputFormat::Text => {
                output::print_heading("Providers");
                for name in oauth.provider_names() {
                    let redirect = oauth
                        .provider(name)
                        .map(|p| p.redirect_uri.as_str())
                        .unwrap_or_default();
                    output::print_row(name, redirect);
                }
            }
            OutputFormat::Json => {
                let names: Vec<&str> = oauth.provider_names().collect();
                output::print_json(&json!({ "providers": names }));
            }
        }
        return Ok(());
    };

    let url = oauth.get_authorization_url(provider)?;
    output::print_value(&json!({ "provider": provider, "url": url }), &url, format);
    Ok(())
}

/// Run the whole redirect flow, catching the callback on a local port.
pub async fn oauth_login(
    ctx: &AuthContext,
    provider: &str,
    timeout_secs: u64,
    format: &OutputFormat,
) -> Result<()> {
    let oauth = ctx.oauth();
    let config = oauth
        .provider(provider)
        .ok_or_else(|| anyhow::anyhow!("Provider {} not supported", provider))?;

    let server = OAuthCallbackServer::for_redirect_uri(&config.redirect_uri, timeout_secs)
        .context("Cannot listen for the OAuth callback")?;
    let listener = server.listen().await?;

    let url = oauth.initiate_oauth(provider).await?;
    if *format == OutputFormat::Text {
        println!("Complete sign-in in your browser. If it did not open, visit:");
        println!("{}", url);
        println!();
        println!("Waiting for the redirect on port {}...", listener.port());
    }

    let callback_url = listener.wait_for_callback().await?;
    info!(provider = %provider, "OAuth callback received");

    let result = ctx.complete_oauth(provider, &callback_url).await?;
    print_result(&result, format);
    Ok(())
}

/// Finish a flow from a callback URL obtained some other way.
pub async fn oauth_callback(
    ctx: &AuthContext,
    provider: &str,
    url: &str,
    format: &OutputFormat,
) -> Result<()> {
    let result = ctx.complete_oauth(provider, url).await?;
    print_result(&result, format);
    Ok(())
}

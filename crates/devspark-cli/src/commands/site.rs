//! Site account commands: email login, registration, password reset.

use super::{prompt_or, prompt_password};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use devspark_auth::{AuthContext, Registration};
use serde_json::{json, Value};

fn display_user(body: &Value) -> &str {
    let user = body.get("user");
    user.and_then(|u| u.get("email"))
        .or_else(|| user.and_then(|u| u.get("name")))
        .and_then(Value::as_str)
        .unwrap_or("user")
}

/// Login with email and password.
pub async fn login(ctx: &AuthContext, email: Option<String>, format: &OutputFormat) -> Result<()> {
    if let Some(cached) = ctx.cached_login()? {
        let who = cached
            .user
            .as_ref()
            .and_then(|u| u.get("email"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        output::print_success(&format!("Already logged in as {}", who), format);
        return Ok(());
    }

    let email = prompt_or(email, "Email")?;
    let password = prompt_password("Password")?;

    if *format == OutputFormat::Text {
        println!("Logging in...");
    }

    match ctx.login(&email, &password).await {
        Ok(body) => match format {
            OutputFormat::Text => println!("Logged in as {}", display_user(&body)),
            OutputFormat::Json => output::print_json(&body),
        },
        Err(e) => output::print_error(&format!("Login failed: {}", e), format),
    }
    Ok(())
}

/// Create a site account.
pub async fn register(
    ctx: &AuthContext,
    name: Option<String>,
    email: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let registration = Registration {
        name: prompt_or(name, "Name")?,
        email: prompt_or(email, "Email")?,
        password: prompt_password("Password")?,
    };

    let body = ctx.oauth().register(&registration).await?;
    output::print_value(
        &body,
        &format!("Registered {}", registration.email),
        format,
    );
    Ok(())
}

/// Request a password reset email from the site.
pub async fn forgot_password(ctx: &AuthContext, email: &str, format: &OutputFormat) -> Result<()> {
    let body = ctx.oauth().request_password_reset(email).await?;
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Password reset email requested");
    output::print_value(&body, message, format);
    Ok(())
}

/// Forget the cached site login.
pub fn logout(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    ctx.logout()?;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show what is cached locally and what the backend session looks like.
pub async fn status(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let snapshot = ctx.status().await?;

    match format {
        OutputFormat::Text => {
            output::print_heading("Site");
            match &snapshot.cached_login {
                Some(login) => {
                    output::print_row("Auth", "logged in");
                    let email = login
                        .user
                        .as_ref()
                        .and_then(|u| u.get("email"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    output::print_row("Email", email);
                }
                None => output::print_row("Auth", "not logged in"),
            }
            output::print_row("OAuth flow", &snapshot.flow_state.to_string());

            output::print_heading("Backend");
            match &snapshot.backend_user_id {
                Some(user_id) => {
                    output::print_row("Auth", "signed in");
                    output::print_row("User ID", user_id);
                    output::print_row(
                        "Email",
                        snapshot.backend_email.as_deref().unwrap_or("unknown"),
                    );
                    let expires = snapshot
                        .backend_expires_at
                        .and_then(|at| Utc.timestamp_opt(at, 0).single())
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string());
                    output::print_row("Expires", &expires);
                }
                None => output::print_row("Auth", "signed out"),
            }
        }
        OutputFormat::Json => {
            output::print_json(&json!({
                "logged_in": snapshot.cached_login.is_some(),
                "signed_in": snapshot.backend_user_id.is_some(),
                "snapshot": snapshot,
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_user_prefers_email() {
        let body = json!({"token": "t", "user": {"name": "Ada", "email": "ada@example.com"}});
        assert_eq!(display_user(&body), "ada@example.com");

        let body = json!({"token": "t", "user": {"name": "Ada"}});
        assert_eq!(display_user(&body), "Ada");

        assert_eq!(display_user(&json!({})), "user");
    }
}

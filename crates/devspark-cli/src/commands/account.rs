//! Backend account commands.

use super::{parse_object, prompt_password};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use devspark_auth::{
    AuthChangeEvent, AuthContext, AuthResponse, AuthView, OAuthSignInOptions, Session,
    SignUpOptions, User,
};
use serde_json::{json, Map, Value};

fn print_user(user: &User) {
    output::print_row("User ID", &user.id);
    output::print_row("Email", user.email.as_deref().unwrap_or("unknown"));
    if let Some(name) = user.user_metadata.full_name.as_deref() {
        output::print_row("Name", name);
    }
}

fn print_session(session: &Session) {
    print_user(&session.user);
    let expires = session
        .expires_at
        .and_then(|at| chrono::DateTime::from_timestamp(at, 0))
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    output::print_row("Expires", &expires);
}

fn print_auth_response(response: &AuthResponse, headline: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("{}", headline);
            match (&response.session, &response.user) {
                (Some(session), _) => print_session(session),
                (None, Some(user)) => {
                    print_user(user);
                    println!("Check your email to confirm the account.");
                }
                (None, None) => {}
            }
        }
        OutputFormat::Json => output::print_json(response),
    }
}

/// What a page would render for `session`.
fn print_view(view: &AuthView) {
    output::print_row(
        "Shown",
        if view.show_auth_required {
            "signed-in content"
        } else {
            "sign-in prompts"
        },
    );
    if let Some(name) = view.display_name.as_deref() {
        output::print_row("Display name", name);
    }
}

pub async fn account_signup(
    ctx: &AuthContext,
    email: &str,
    full_name: Option<String>,
    redirect_to: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let password = prompt_password("Password")?;
    let options = SignUpOptions {
        data: full_name.map(|name| json!({ "full_name": name })),
        email_redirect_to: redirect_to,
    };

    let response = ctx.supabase().sign_up(email, &password, options).await?;
    print_auth_response(&response, "Account created", format);
    Ok(())
}

pub async fn account_signin(ctx: &AuthContext, email: &str, format: &OutputFormat) -> Result<()> {
    let password = prompt_password("Password")?;
    let response = ctx.supabase().sign_in_with_password(email, &password).await?;
    print_auth_response(&response, "Signed in", format);
    Ok(())
}

pub async fn account_oauth(
    ctx: &AuthContext,
    provider: &str,
    redirect_to: Option<String>,
    scopes: Option<String>,
    no_browser: bool,
    format: &OutputFormat,
) -> Result<()> {
    let redirect = ctx
        .supabase()
        .sign_in_with_oauth(
            provider,
            OAuthSignInOptions {
                redirect_to,
                scopes,
                skip_browser_redirect: no_browser,
            },
        )
        .await?;

    match format {
        OutputFormat::Text => {
            println!("Continue sign-in with {} at:", redirect.provider);
            println!("{}", redirect.url);
            println!();
            println!("Then run 'devspark account from-url <redirect URL>' to finish.");
        }
        OutputFormat::Json => output::print_json(&redirect),
    }
    Ok(())
}

pub async fn account_signout(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    ctx.supabase().sign_out().await?;
    output::print_success("Signed out", format);
    Ok(())
}

pub async fn account_session(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let session = ctx.supabase().get_session().await;
    let event = if session.is_some() {
        AuthChangeEvent::InitialSession
    } else {
        AuthChangeEvent::SignedOut
    };
    let view = ctx.supabase().update_ui_for_auth_state(event, session.as_ref());

    match format {
        OutputFormat::Text => match &session {
            Some(session) => {
                println!("Signed in");
                print_session(session);
                print_view(&view);
            }
            None => println!("No active session"),
        },
        OutputFormat::Json => output::print_json(&json!({ "session": session, "view": view })),
    }
    Ok(())
}

pub async fn account_user(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    match (ctx.supabase().get_user().await, format) {
        (Some(user), OutputFormat::Text) => print_user(&user),
        (Some(user), OutputFormat::Json) => output::print_json(&user),
        (None, _) => output::print_error("Not signed in", format),
    }
    Ok(())
}

pub async fn account_reset_password(
    ctx: &AuthContext,
    email: &str,
    format: &OutputFormat,
) -> Result<()> {
    ctx.supabase().reset_password(email).await?;
    output::print_success(&format!("Recovery email sent to {}", email), format);
    Ok(())
}

pub async fn account_update(
    ctx: &AuthContext,
    email: Option<String>,
    password: bool,
    data: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let mut attributes = Map::new();
    if let Some(email) = email {
        attributes.insert("email".to_string(), Value::String(email));
    }
    if password {
        attributes.insert(
            "password".to_string(),
            Value::String(prompt_password("New password")?),
        );
    }
    if let Some(data) = data {
        attributes.insert("data".to_string(), parse_object(&data, "data")?);
    }
    if attributes.is_empty() {
        anyhow::bail!("Nothing to update: pass --email, --password or --data");
    }

    let user = ctx.supabase().update_user(&Value::Object(attributes)).await?;
    match format {
        OutputFormat::Text => {
            println!("User updated");
            print_user(&user);
        }
        OutputFormat::Json => output::print_json(&user),
    }
    Ok(())
}

pub async fn account_set_session(
    ctx: &AuthContext,
    access_token: &str,
    refresh_token: &str,
    format: &OutputFormat,
) -> Result<()> {
    let response = ctx.supabase().set_session(access_token, refresh_token).await?;
    print_auth_response(&response, "Session set", format);
    Ok(())
}

pub async fn account_refresh(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let session = ctx.supabase().refresh_session().await?;
    match format {
        OutputFormat::Text => {
            println!("Session refreshed");
            print_session(&session);
        }
        OutputFormat::Json => output::print_json(&session),
    }
    Ok(())
}

pub async fn account_from_url(ctx: &AuthContext, url: &str, format: &OutputFormat) -> Result<()> {
    let response = ctx.supabase().session_from_url(url).await?;
    print_auth_response(&response, "Signed in from redirect", format);
    Ok(())
}

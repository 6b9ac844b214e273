//! Profile commands against the backend `profiles` table.

use super::parse_object;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use devspark_auth::{AuthContext, UserProfile};

/// Signed-in user's id, for commands that default to "me".
async fn resolve_user_id(ctx: &AuthContext, id: Option<String>) -> Result<String> {
    if let Some(id) = id {
        return Ok(id);
    }
    match ctx.supabase().get_session().await {
        Some(session) => Ok(session.user.id),
        None => anyhow::bail!("Not signed in; pass a user ID or run 'devspark account signin'"),
    }
}

fn print_profile(profile: &UserProfile) {
    output::print_row("ID", &profile.id);
    output::print_row("Name", profile.full_name.as_deref().unwrap_or("-"));
    output::print_row("Avatar", profile.avatar_url.as_deref().unwrap_or("-"));
    if let Some(updated_at) = profile.updated_at.as_deref() {
        output::print_row("Updated", updated_at);
    }
    for (key, value) in &profile.extra {
        output::print_row(key, &value.to_string());
    }
}

fn print_profiles(profiles: &[UserProfile], headline: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("{}", headline);
            for profile in profiles {
                print_profile(profile);
            }
        }
        OutputFormat::Json => output::print_json(&profiles),
    }
}

pub async fn profile_get(ctx: &AuthContext, id: Option<String>, format: &OutputFormat) -> Result<()> {
    let user_id = resolve_user_id(ctx, id).await?;
    match (ctx.supabase().get_user_profile(&user_id).await, format) {
        (Some(profile), OutputFormat::Text) => print_profile(&profile),
        (Some(profile), OutputFormat::Json) => output::print_json(&profile),
        (None, _) => output::print_error(&format!("No profile found for {}", user_id), format),
    }
    Ok(())
}

pub async fn profile_update(
    ctx: &AuthContext,
    id: Option<String>,
    updates: &str,
    format: &OutputFormat,
) -> Result<()> {
    let updates = parse_object(updates, "updates")?;
    let user_id = resolve_user_id(ctx, id).await?;
    let rows = ctx.supabase().update_user_profile(&user_id, &updates).await?;
    print_profiles(&rows, "Profile updated", format);
    Ok(())
}

pub async fn profile_create(ctx: &AuthContext, profile: &str, format: &OutputFormat) -> Result<()> {
    let profile = parse_object(profile, "profile")?;
    let rows = ctx.supabase().create_user_profile(&profile).await?;
    print_profiles(&rows, "Profile created", format);
    Ok(())
}

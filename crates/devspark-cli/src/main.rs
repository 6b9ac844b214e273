//! DevSpark CLI - sign in to DevSpark from the terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use devspark_auth::DEFAULT_CALLBACK_TIMEOUT_SECS;
use devspark_config::{Config, Paths};
use output::OutputFormat;
use tracing::debug;

/// DevSpark CLI - site login, OAuth providers and backend accounts.
#[derive(Parser)]
#[command(name = "devspark")]
#[command(about = "DevSpark CLI for authentication and profile management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print URLs instead of opening the browser
    #[arg(long, global = true)]
    no_browser: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Login to the site with email and password
    Login {
        /// Email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create a site account
    Register {
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
        /// Email
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Request a site password reset email
    ForgotPassword {
        /// Email
        email: String,
    },

    /// Sign in with an OAuth provider through the site
    Oauth {
        #[command(subcommand)]
        command: OauthCommands,
    },

    /// Manage the backend account
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Manage the backend profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Show authentication status
    Status,

    /// Forget the cached site login
    Logout,
}

#[derive(Subcommand)]
enum OauthCommands {
    /// List providers or print the authorization URL for one
    Url {
        /// Provider name; lists providers when omitted
        provider: Option<String>,
    },
    /// Run the full redirect flow with a local callback listener
    Login {
        /// Provider name (google, github, microsoft, apple, twitter, discord)
        provider: String,
        /// Seconds to wait for the redirect
        #[arg(short, long, default_value_t = DEFAULT_CALLBACK_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Complete a flow from a callback URL pasted by hand
    Callback {
        /// Provider name
        provider: String,
        /// Full callback URL including `code` and `state`
        url: String,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Create a backend account
    Signup {
        /// Email
        email: String,
        /// Full name stored in user metadata
        #[arg(short, long)]
        full_name: Option<String>,
        /// Where the confirmation email should lead
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Sign in with email and password
    Signin {
        /// Email
        email: String,
    },
    /// Start a backend OAuth sign-in
    Oauth {
        /// Provider name
        provider: String,
        /// Where the backend should redirect after sign-in
        #[arg(long)]
        redirect_to: Option<String>,
        /// Extra scopes, space separated
        #[arg(long)]
        scopes: Option<String>,
    },
    /// Sign out of the backend
    Signout,
    /// Show the current session
    Session,
    /// Show the current user as the backend sees it
    User,
    /// Send a password recovery email
    ResetPassword {
        /// Email
        email: String,
    },
    /// Update user attributes
    Update {
        /// New email
        #[arg(long)]
        email: Option<String>,
        /// Prompt for a new password
        #[arg(long)]
        password: bool,
        /// User metadata as a JSON object
        #[arg(long)]
        data: Option<String>,
    },
    /// Adopt an existing token pair
    SetSession {
        /// Access token
        access_token: String,
        /// Refresh token
        refresh_token: String,
    },
    /// Refresh the session now
    Refresh,
    /// Adopt the session carried in a redirect URL
    FromUrl {
        /// Redirect URL with the session in its fragment
        url: String,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show a profile (defaults to the signed-in user)
    Get {
        /// User ID
        id: Option<String>,
    },
    /// Update profile fields
    Update {
        /// Profile fields as a JSON object
        updates: String,
        /// User ID (defaults to the signed-in user)
        #[arg(long)]
        id: Option<String>,
    },
    /// Create a profile row
    Create {
        /// Profile row as a JSON object
        profile: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (paths, config) = match load_config() {
        Ok(loaded) => loaded,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    devspark_config::init_logging(&level);
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let format = cli.format;
    let result = match commands::build_context(config, &paths, cli.no_browser).await {
        Ok(ctx) => match cli.command {
            Commands::Login { email } => commands::login(&ctx, email, &format).await,
            Commands::Register { name, email } => {
                commands::register(&ctx, name, email, &format).await
            }
            Commands::ForgotPassword { email } => {
                commands::forgot_password(&ctx, &email, &format).await
            }
            Commands::Oauth { command } => match command {
                OauthCommands::Url { provider } => {
                    commands::oauth_url(&ctx, provider.as_deref(), &format)
                }
                OauthCommands::Login { provider, timeout } => {
                    commands::oauth_login(&ctx, &provider, timeout, &format).await
                }
                OauthCommands::Callback { provider, url } => {
                    commands::oauth_callback(&ctx, &provider, &url, &format).await
                }
            },
            Commands::Account { command } => match command {
                AccountCommands::Signup {
                    email,
                    full_name,
                    redirect_to,
                } => commands::account_signup(&ctx, &email, full_name, redirect_to, &format).await,
                AccountCommands::Signin { email } => {
                    commands::account_signin(&ctx, &email, &format).await
                }
                AccountCommands::Oauth {
                    provider,
                    redirect_to,
                    scopes,
                } => {
                    commands::account_oauth(
                        &ctx,
                        &provider,
                        redirect_to,
                        scopes,
                        cli.no_browser,
                        &format,
                    )
                    .await
                }
                AccountCommands::Signout => commands::account_signout(&ctx, &format).await,
                AccountCommands::Session => commands::account_session(&ctx, &format).await,
                AccountCommands::User => commands::account_user(&ctx, &format).await,
                AccountCommands::ResetPassword { email } => {
                    commands::account_reset_password(&ctx, &email, &format).await
                }
                AccountCommands::Update {
                    email,
                    password,
                    data,
                } => commands::account_update(&ctx, email, password, data, &format).await,
                AccountCommands::SetSession {
                    access_token,
                    refresh_token,
                } => {
                    commands::account_set_session(&ctx, &access_token, &refresh_token, &format)
                        .await
                }
                AccountCommands::Refresh => commands::account_refresh(&ctx, &format).await,
                AccountCommands::FromUrl { url } => {
                    commands::account_from_url(&ctx, &url, &format).await
                }
            },
            Commands::Profile { command } => match command {
                ProfileCommands::Get { id } => commands::profile_get(&ctx, id, &format).await,
                ProfileCommands::Update { updates, id } => {
                    commands::profile_update(&ctx, id, &updates, &format).await
                }
                ProfileCommands::Create { profile } => {
                    commands::profile_create(&ctx, &profile, &format).await
                }
            },
            Commands::Status => commands::status(&ctx, &format).await,
            Commands::Logout => commands::logout(&ctx, &format),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}

fn load_config() -> anyhow::Result<(Paths, Config)> {
    let paths = Paths::new()?;
    let config = Config::load(&paths)?;
    config.validate()?;
    Ok((paths, config))
}

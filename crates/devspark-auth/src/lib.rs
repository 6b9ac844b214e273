//! Authentication for DevSpark.
//!
//! This crate provides:
//! - `OAuthService`: OAuth provider registry, redirect flow with verified
//!   `state`, and the site's email/password endpoints
//! - `SupabaseService`: sessions, users and the `profiles` table on the
//!   hosted backend, with an auth state change stream
//! - `AuthContext`: both facades built once from `Config`
//! - A local HTTP listener for OAuth callbacks

mod callback_server;
mod context;
mod error;
mod events;
mod flow_fsm;
mod navigator;
mod oauth_service;
mod providers;
mod response;
mod supabase_client;
mod supabase_service;
mod types;

pub use callback_server::{
    CallbackListener, OAuthCallbackServer, DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT_SECS,
};
pub use context::{AuthContext, AuthSnapshot, CachedLogin};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use events::{AuthChangeEvent, AuthStateChange, AuthSubscription, AuthView};
pub use flow_fsm::redirect_flow;
pub use flow_fsm::{FlowInput, FlowMachine, FlowMachineState, FlowState};
pub use navigator::{BrowserNavigator, ManualNavigator, Navigator};
pub use oauth_service::OAuthService;
pub use providers::{backend_wire_name, ProviderConfig, BACKEND_PROVIDERS, SITE_PROVIDERS};
pub use supabase_client::SupabaseClient;
pub use supabase_service::{SupabaseConfig, SupabaseService};
pub use types::{
    AuthResponse, CallbackResult, OAuthRedirect, OAuthSignInOptions, ProviderProfile,
    Registration, Session, SignUpOptions, TokenResponse, User, UserMetadata, UserProfile,
};

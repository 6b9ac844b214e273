//! Storage key constants.

/// Keys used in the local store
pub struct StorageKeys;

impl StorageKeys {
    /// Cached access token from the last successful login
    pub const AUTH_TOKEN: &'static str = "auth_token";

    /// Cached user profile (JSON)
    pub const USER: &'static str = "user";

    /// Prefix for pending OAuth state tokens; the state value follows.
    pub const OAUTH_STATE_PREFIX: &'static str = "oauth_state:";

    /// Key of a pending OAuth state entry.
    pub fn oauth_state(state: &str) -> String {
        format!("{}{}", Self::OAUTH_STATE_PREFIX, state)
    }

    /// Key of the persisted backend session, namespaced by Supabase project
    /// the same way supabase-js does (`sb-<ref>-auth-token`).
    pub fn backend_session(project_ref: &str) -> String {
        format!("sb-{}-auth-token", project_ref)
    }
}

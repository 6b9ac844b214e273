//! Application auth context.
//!
//! Built once at startup and passed to whatever needs auth. It owns both
//! facades and the local cache they share, and keeps the `auth_token`/`user`
//! mirror up to date after site logins and OAuth callbacks.

use crate::flow_fsm::FlowState;
use crate::navigator::Navigator;
use crate::oauth_service::OAuthService;
use crate::supabase_service::{SupabaseConfig, SupabaseService};
use crate::types::CallbackResult;
use crate::AuthResult;
use devspark_config::{Config, Paths};
use devspark_storage::LocalAuthCache;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// What the cache remembers from the last site login.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedLogin {
    pub auth_token: String,
    pub user: Option<Value>,
}

/// Snapshot of authentication state for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub cached_login: Option<CachedLogin>,
    pub backend_user_id: Option<String>,
    pub backend_email: Option<String>,
    /// Unix seconds.
    pub backend_expires_at: Option<i64>,
    pub flow_state: FlowState,
}

/// Shared auth context.
pub struct AuthContext {
    config: Config,
    cache: LocalAuthCache,
    oauth: OAuthService,
    supabase: SupabaseService,
}

impl AuthContext {
    /// Open the local store under `paths` and build both facades.
    pub async fn new(
        config: Config,
        paths: &Paths,
        navigator: Arc<dyn Navigator>,
    ) -> AuthResult<Self> {
        paths.ensure_dirs()?;
        let cache = devspark_storage::open_file_cache(paths.local_store_file())?;
        Self::with_cache(config, cache, navigator).await
    }

    /// Build both facades over an existing cache and initialize them.
    pub async fn with_cache(
        config: Config,
        cache: LocalAuthCache,
        navigator: Arc<dyn Navigator>,
    ) -> AuthResult<Self> {
        let site_origin = config.site_origin()?;
        let api_base_url = config.api_base_url()?;
        let http_client = reqwest::Client::new();

        let mut oauth = OAuthService::new(
            site_origin.as_str(),
            api_base_url.as_str(),
            http_client.clone(),
            cache.clone(),
            navigator.clone(),
        );
        oauth.init(&config.providers);

        let supabase = SupabaseService::new(
            site_origin.as_str(),
            http_client,
            cache.clone(),
            navigator,
        );
        supabase.init(SupabaseConfig::from_config(&config)).await?;

        Ok(Self {
            config,
            cache,
            oauth,
            supabase,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &LocalAuthCache {
        &self.cache
    }

    pub fn oauth(&self) -> &OAuthService {
        &self.oauth
    }

    pub fn supabase(&self) -> &SupabaseService {
        &self.supabase
    }

    /// Site email/password login, mirrored into the cache.
    ///
    /// The response body is returned unchanged.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Value> {
        let result = self.oauth.login_with_email_password(email, password).await?;

        match result.get("token").and_then(Value::as_str) {
            Some(token) => {
                let user = result.get("user").cloned().unwrap_or(Value::Null);
                self.cache.store_login(token, &user)?;
                info!("Login cached");
            }
            None => warn!("Login response carried no token, cache left unchanged"),
        }
        Ok(result)
    }

    /// Finish an OAuth redirect and mirror the result into the cache.
    pub async fn complete_oauth(&self, provider: &str, url: &str) -> AuthResult<CallbackResult> {
        let result = self.oauth.handle_callback(provider, url).await?;
        self.cache
            .store_login(&result.access_token, &result.user_profile)?;
        Ok(result)
    }

    /// What the cache holds from the last login, if anything.
    pub fn cached_login(&self) -> AuthResult<Option<CachedLogin>> {
        let Some(auth_token) = self.cache.auth_token()? else {
            return Ok(None);
        };
        let user = self.cache.user::<Value>()?;
        Ok(Some(CachedLogin { auth_token, user }))
    }

    /// Forget the cached site login. The backend session is untouched.
    pub fn logout(&self) -> AuthResult<()> {
        self.cache.clear_login()?;
        info!("Cleared cached login");
        Ok(())
    }

    pub async fn status(&self) -> AuthResult<AuthSnapshot> {
        let session = self.supabase.get_session().await;
        Ok(AuthSnapshot {
            cached_login: self.cached_login()?,
            backend_user_id: session.as_ref().map(|s| s.user.id.clone()),
            backend_email: session.as_ref().and_then(|s| s.user.email.clone()),
            backend_expires_at: session.as_ref().and_then(|s| s.expires_at),
            flow_state: self.oauth.flow_state(),
        })
    }
}

//! Session facade over the hosted auth backend.
//!
//! Queries (`get_session`, `get_user`, `get_user_profile`) log backend errors
//! and return `None`: no session or no row is a valid answer. Mutations
//! propagate every error after logging it.

use crate::events::{AuthChangeEvent, AuthStateChange, AuthSubscription, AuthView};
use crate::navigator::Navigator;
use crate::providers::{backend_wire_name, BACKEND_PROVIDERS};
use crate::supabase_client::SupabaseClient;
use crate::types::{
    AuthResponse, OAuthRedirect, OAuthSignInOptions, Session, SignUpOptions, User, UserProfile,
};
use crate::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use devspark_config::Config;
use devspark_storage::LocalAuthCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Settings for `SupabaseService::init`.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    /// Keep the session in the local store across runs.
    pub persist_session: bool,
    /// Refresh an expired session when it is read.
    pub auto_refresh_token: bool,
    /// Allow `session_from_url`.
    pub detect_session_in_url: bool,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            persist_session: true,
            auto_refresh_token: true,
            detect_session_in_url: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.supabase_url, &config.supabase_anon_key)
    }
}

struct Initialized {
    client: SupabaseClient,
    config: SupabaseConfig,
    project_ref: String,
}

/// Backend session facade.
pub struct SupabaseService {
    inner: OnceLock<Initialized>,
    http_client: Client,
    cache: LocalAuthCache,
    navigator: Arc<dyn Navigator>,
    site_origin: String,
    /// Session for non-persisting setups, and the latest copy otherwise.
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl SupabaseService {
    pub fn new(
        site_origin: &str,
        http_client: Client,
        cache: LocalAuthCache,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: OnceLock::new(),
            http_client,
            cache,
            navigator,
            site_origin: site_origin.trim_end_matches('/').to_string(),
            current: Mutex::new(None),
            events,
        }
    }

    /// Construct the backend client. Only the first call has any effect.
    ///
    /// When a session is already stored, emits `InitialSession` and starts a
    /// background task that logs every later transition with its `AuthView`.
    pub async fn init(&self, config: SupabaseConfig) -> AuthResult<()> {
        Url::parse(&config.url)?;

        let client = SupabaseClient::new(self.http_client.clone(), &config.url, &config.anon_key);
        let project_ref = client.project_ref();
        if self
            .inner
            .set(Initialized {
                client,
                config,
                project_ref,
            })
            .is_err()
        {
            warn!("Supabase client already initialized, keeping the existing one");
            return Ok(());
        }
        info!("Supabase client initialized");

        if let Some(session) = self.get_session().await {
            info!(user_id = %session.user.id, "Existing session found");
            self.spawn_state_logger();
            self.emit(AuthChangeEvent::InitialSession, Some(session));
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    fn initialized(&self) -> AuthResult<&Initialized> {
        self.inner.get().ok_or(AuthError::NotInitialized)
    }

    /// The backend client; fails until `init` has run.
    pub fn client(&self) -> AuthResult<&SupabaseClient> {
        Ok(&self.initialized()?.client)
    }

    fn spawn_state_logger(&self) {
        let mut subscription = self.on_auth_state_change();
        tokio::spawn(async move {
            while let Some(change) = subscription.recv().await {
                let view = AuthView::for_session(change.event, change.session.as_ref());
                info!(
                    event = %change.event,
                    signed_in = view.signed_in,
                    display_name = ?view.display_name,
                    "Auth state changed"
                );
            }
        });
    }

    /// Subscribe to session transitions.
    pub fn on_auth_state_change(&self) -> AuthSubscription {
        AuthSubscription::new(self.events.subscribe())
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        debug!(event = %event, "Emitting auth state change");
        // No subscribers is fine.
        let _ = self.events.send(AuthStateChange { event, session });
    }

    /// UI reconciliation for a transition. Pure.
    pub fn update_ui_for_auth_state(
        &self,
        event: AuthChangeEvent,
        session: Option<&Session>,
    ) -> AuthView {
        AuthView::for_session(event, session)
    }

    // ========================================
    // Session storage
    // ========================================

    fn load_session(&self, inner: &Initialized) -> AuthResult<Option<Session>> {
        if inner.config.persist_session {
            let stored = self.cache.load_session::<Session>(&inner.project_ref)?;
            *self.current.lock() = stored.clone();
            Ok(stored)
        } else {
            Ok(self.current.lock().clone())
        }
    }

    fn save_session(&self, inner: &Initialized, session: &Session) -> AuthResult<()> {
        if inner.config.persist_session {
            self.cache.save_session(&inner.project_ref, session)?;
        }
        *self.current.lock() = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self, inner: &Initialized) -> AuthResult<()> {
        *self.current.lock() = None;
        if inner.config.persist_session {
            self.cache.clear_session(&inner.project_ref)?;
        }
        Ok(())
    }

    /// Stored session, refreshed first when it has expired.
    async fn current_session(&self) -> AuthResult<Option<Session>> {
        let inner = self.initialized()?;
        let Some(session) = self.load_session(inner)? else {
            return Ok(None);
        };

        if session.is_expired() && inner.config.auto_refresh_token {
            debug!("Stored session expired, refreshing");
            let refreshed = inner.client.refresh_session(&session.refresh_token).await?;
            self.save_session(inner, &refreshed)?;
            self.emit(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));
            return Ok(Some(refreshed));
        }
        Ok(Some(session))
    }

    async fn logged<T, F>(&self, action: &str, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        let result = fut.await;
        if let Err(e) = &result {
            error!(error = %e, "Error {}", action);
        }
        result
    }

    // ========================================
    // Queries
    // ========================================

    /// Current session, or `None` on any error.
    pub async fn get_session(&self) -> Option<Session> {
        match self.current_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Error getting session");
                None
            }
        }
    }

    /// User behind the current session, as the backend sees it now.
    pub async fn get_user(&self) -> Option<User> {
        let result: AuthResult<Option<User>> = async {
            let inner = self.initialized()?;
            match self.current_session().await? {
                Some(session) => inner.client.get_user(&session.access_token).await.map(Some),
                None => Ok(None),
            }
        }
        .await;

        match result {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "Error getting user");
                None
            }
        }
    }

    // ========================================
    // Mutations
    // ========================================

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        options: SignUpOptions,
    ) -> AuthResult<AuthResponse> {
        self.logged("signing up", async {
            let inner = self.initialized()?;
            let response = inner
                .client
                .sign_up(
                    email,
                    password,
                    options.data.as_ref(),
                    options.email_redirect_to.as_deref(),
                )
                .await?;

            if let Some(session) = &response.session {
                self.save_session(inner, session)?;
                self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
            } else {
                info!(email = %email, "Sign-up pending email confirmation");
            }
            Ok(response)
        })
        .await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthResponse> {
        self.logged("signing in", async {
            let inner = self.initialized()?;
            let session = inner.client.sign_in_with_password(email, password).await?;
            self.save_session(inner, &session)?;
            info!(user_id = %session.user.id, "Signed in");
            self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
            Ok(session.into())
        })
        .await
    }

    /// Start a backend-brokered OAuth sign-in.
    ///
    /// The provider must be one the backend federates with; that is checked
    /// before anything else.
    pub async fn sign_in_with_oauth(
        &self,
        provider: &str,
        options: OAuthSignInOptions,
    ) -> AuthResult<OAuthRedirect> {
        if !BACKEND_PROVIDERS.contains(&provider) {
            return Err(AuthError::UnsupportedProvider(provider.to_string()));
        }

        self.logged(&format!("signing in with {}", provider), async {
            let inner = self.initialized()?;
            let url = inner.client.authorize_url(
                backend_wire_name(provider),
                options.redirect_to.as_deref(),
                options.scopes.as_deref(),
            )?;

            if !options.skip_browser_redirect {
                self.navigator.navigate(&url)?;
            }
            Ok(OAuthRedirect {
                provider: provider.to_string(),
                url,
            })
        })
        .await
    }

    /// Adopt the session carried in a redirect URL's fragment.
    pub async fn session_from_url(&self, url: &str) -> AuthResult<AuthResponse> {
        self.logged("reading session from URL", async {
            let inner = self.initialized()?;
            if !inner.config.detect_session_in_url {
                return Err(AuthError::Config(
                    "Session detection in URL is disabled".to_string(),
                ));
            }

            let parsed = Url::parse(url)?;
            let params: Vec<(String, String)> = match parsed.fragment() {
                Some(fragment) if !fragment.is_empty() => {
                    url::form_urlencoded::parse(fragment.as_bytes())
                        .into_owned()
                        .collect()
                }
                _ => parsed.query_pairs().into_owned().collect(),
            };
            let param = |name: &str| {
                params
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
            };

            if let Some(description) = param("error_description").or_else(|| param("error")) {
                return Err(AuthError::Backend {
                    status: 400,
                    message: description,
                });
            }

            let access_token = param("access_token").ok_or_else(|| {
                AuthError::Config("No access_token found in callback URL".to_string())
            })?;
            let refresh_token = param("refresh_token").ok_or_else(|| {
                AuthError::Config("No refresh_token found in callback URL".to_string())
            })?;

            let event = match param("type").as_deref() {
                Some("recovery") => AuthChangeEvent::PasswordRecovery,
                _ => AuthChangeEvent::SignedIn,
            };
            self.adopt_tokens(inner, &access_token, &refresh_token, event)
                .await
        })
        .await
    }

    /// Sign out remotely and locally.
    ///
    /// The local session is cleared and `SignedOut` emitted even when the
    /// backend call fails; the failure is still returned.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.logged("signing out", async {
            let inner = self.initialized()?;
            let session = match self.load_session(inner) {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "Could not read stored session before sign-out");
                    None
                }
            };

            let remote = match &session {
                Some(session) => inner.client.sign_out(&session.access_token).await,
                None => Ok(()),
            };

            self.clear_session(inner)?;
            self.emit(AuthChangeEvent::SignedOut, None);
            info!("Signed out");
            remote
        })
        .await
    }

    /// Send a recovery email that links back to `<origin>/reset-password`.
    pub async fn reset_password(&self, email: &str) -> AuthResult<()> {
        self.logged("resetting password", async {
            let inner = self.initialized()?;
            let redirect_to = format!("{}/reset-password", self.site_origin);
            inner.client.recover(email, &redirect_to).await
        })
        .await
    }

    /// Update the signed-in user's attributes (email, password, `data`).
    pub async fn update_user(&self, attributes: &Value) -> AuthResult<User> {
        self.logged("updating user", async {
            let inner = self.initialized()?;
            let mut session = self.current_session().await?.ok_or(AuthError::NotLoggedIn)?;

            let user = inner
                .client
                .update_user(&session.access_token, attributes)
                .await?;
            session.user = user.clone();
            self.save_session(inner, &session)?;
            self.emit(AuthChangeEvent::UserUpdated, Some(session));
            Ok(user)
        })
        .await
    }

    /// Adopt an externally obtained token pair.
    pub async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> AuthResult<AuthResponse> {
        self.logged("setting session", async {
            let inner = self.initialized()?;
            self.adopt_tokens(inner, access_token, refresh_token, AuthChangeEvent::SignedIn)
                .await
        })
        .await
    }

    async fn adopt_tokens(
        &self,
        inner: &Initialized,
        access_token: &str,
        refresh_token: &str,
        event: AuthChangeEvent,
    ) -> AuthResult<AuthResponse> {
        let now = Utc::now().timestamp();
        let session = match jwt_expiry(access_token) {
            Some(exp) if exp.saturating_sub(crate::types::EXPIRY_MARGIN_SECS) > now => {
                let user = inner.client.get_user(access_token).await?;
                Session {
                    access_token: access_token.to_string(),
                    refresh_token: refresh_token.to_string(),
                    expires_in: exp.saturating_sub(now),
                    expires_at: Some(exp),
                    token_type: "bearer".to_string(),
                    user,
                }
            }
            _ => {
                debug!("Access token expired or unreadable, refreshing");
                inner.client.refresh_session(refresh_token).await?
            }
        };

        self.save_session(inner, &session)?;
        self.emit(event, Some(session.clone()));
        Ok(session.into())
    }

    /// Refresh the stored session now.
    pub async fn refresh_session(&self) -> AuthResult<Session> {
        self.logged("refreshing session", async {
            let inner = self.initialized()?;
            let session = self.load_session(inner)?.ok_or(AuthError::NotLoggedIn)?;

            let refreshed = inner.client.refresh_session(&session.refresh_token).await?;
            self.save_session(inner, &refreshed)?;
            self.emit(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));
            Ok(refreshed)
        })
        .await
    }

    // ========================================
    // Profiles
    // ========================================

    async fn rest_token(&self) -> Option<String> {
        self.get_session().await.map(|s| s.access_token)
    }

    /// Row of `profiles` for `user_id`, or `None` on any error.
    pub async fn get_user_profile(&self, user_id: &str) -> Option<UserProfile> {
        let result: AuthResult<UserProfile> = async {
            let inner = self.initialized()?;
            let token = self.rest_token().await;
            inner.client.select_profile(token.as_deref(), user_id).await
        }
        .await;

        match result {
            Ok(profile) => Some(profile),
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Error getting user profile");
                None
            }
        }
    }

    pub async fn update_user_profile(
        &self,
        user_id: &str,
        updates: &Value,
    ) -> AuthResult<Vec<UserProfile>> {
        self.logged("updating user profile", async {
            let inner = self.initialized()?;
            let token = self.rest_token().await;
            inner
                .client
                .update_profile(token.as_deref(), user_id, updates)
                .await
        })
        .await
    }

    pub async fn create_user_profile(&self, profile: &Value) -> AuthResult<Vec<UserProfile>> {
        self.logged("creating user profile", async {
            let inner = self.initialized()?;
            let token = self.rest_token().await;
            inner.client.insert_profile(token.as_deref(), profile).await
        })
        .await
    }
}

/// `exp` claim of a JWT, without verifying anything.
fn jwt_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}

//! Provider registry and redirect flow against the site's own auth API.
//!
//! `OAuthService` owns the OAuth provider table, builds authorization URLs
//! with a CSRF `state` token that is remembered in the local cache, and
//! completes the authorization-code round trip through
//! `/api/auth/token` and `/api/auth/profile`. It also fronts the site's
//! email/password endpoints.

use crate::flow_fsm::{FlowInput, FlowState, RedirectFlow};
use crate::navigator::Navigator;
use crate::providers::{default_providers, merge_overrides, ProviderConfig};
use crate::response::{site_error_message, summarize_response_body};
use crate::types::{CallbackResult, ProviderProfile, Registration, TokenResponse};
use crate::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use devspark_config::ProviderOverride;
use devspark_storage::LocalAuthCache;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Number of random bytes in a state token.
const STATE_BYTES: usize = 32;

/// Site API auth facade.
pub struct OAuthService {
    providers: BTreeMap<String, ProviderConfig>,
    api_base_url: String,
    http_client: Client,
    cache: LocalAuthCache,
    navigator: Arc<dyn Navigator>,
    /// State of the most recently advanced flow.
    last_flow: Mutex<FlowState>,
}

impl OAuthService {
    /// Create the facade with the built-in provider table.
    ///
    /// Redirect URIs are derived from `site_origin`; API calls go to
    /// `api_base_url`.
    pub fn new(
        site_origin: &str,
        api_base_url: &str,
        http_client: Client,
        cache: LocalAuthCache,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            providers: default_providers(site_origin),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            http_client,
            cache,
            navigator,
            last_flow: Mutex::new(FlowState::Idle),
        }
    }

    /// Merge per-provider overrides into the table.
    ///
    /// Safe to call repeatedly; a later call wins for the keys it sets.
    pub fn init(&mut self, overrides: &BTreeMap<String, ProviderOverride>) {
        merge_overrides(&mut self.providers, overrides);
        info!(providers = self.providers.len(), "OAuth providers initialized");
    }

    /// Configuration for `provider`, if it is registered.
    pub fn provider(&self, provider: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider)
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    fn require_provider(&self, provider: &str) -> AuthResult<&ProviderConfig> {
        self.providers
            .get(provider)
            .ok_or_else(|| AuthError::UnsupportedProvider(provider.to_string()))
    }

    /// State of the most recently advanced redirect flow.
    pub fn flow_state(&self) -> FlowState {
        *self.last_flow.lock()
    }

    fn step(&self, flow: &mut RedirectFlow, input: FlowInput) {
        let state = flow.step(input);
        *self.last_flow.lock() = state;
        debug!(state = %state, "OAuth flow transition");
    }

    /// Random, URL-safe CSRF token.
    pub fn generate_state() -> String {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Build the provider's authorization URL.
    ///
    /// The fresh `state` is recorded as pending for `provider` so that the
    /// callback can be verified.
    pub fn get_authorization_url(&self, provider: &str) -> AuthResult<String> {
        let config = self.require_provider(provider)?;
        let state = Self::generate_state();

        let url = Url::parse_with_params(
            &config.auth_url,
            &[
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("scope", config.scope.as_str()),
                ("response_type", config.response_type.as_str()),
                ("state", state.as_str()),
            ],
        )?;

        if let Err(e) = self.cache.purge_expired_states() {
            warn!(error = %e, "Failed to purge expired OAuth states");
        }
        self.cache.save_pending_state(&state, provider)?;

        debug!(provider = %provider, "Built authorization URL");
        Ok(url.into())
    }

    /// Start a redirect flow: build the URL and hand it to the navigator.
    ///
    /// Returns the URL that was opened.
    pub async fn initiate_oauth(&self, provider: &str) -> AuthResult<String> {
        let mut flow = RedirectFlow::new();
        *self.last_flow.lock() = flow.state();

        let url = match self.get_authorization_url(provider) {
            Ok(url) => url,
            Err(e) => {
                self.step(&mut flow, FlowInput::Fail);
                return Err(e);
            }
        };
        self.step(&mut flow, FlowInput::Initiate);

        if let Err(e) = self.navigator.navigate(&url) {
            error!(provider = %provider, error = %e, "Failed to navigate to provider");
            self.step(&mut flow, FlowInput::Fail);
            return Err(e);
        }

        info!(provider = %provider, "OAuth flow started");
        Ok(url)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// Trade an authorization code for tokens via the site API.
    pub async fn exchange_code_for_token(
        &self,
        provider: &str,
        code: &str,
    ) -> AuthResult<TokenResponse> {
        let config = self.require_provider(provider)?;

        let response = self
            .http_client
            .post(self.api_url("/api/auth/token"))
            .json(&json!({
                "provider": provider,
                "code": code,
                "redirectUri": config.redirect_uri,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(
                provider = %provider,
                status = %status,
                body_summary = %summarize_response_body(&body),
                "Token exchange failed"
            );
            return Err(AuthError::Transport {
                status: status.as_u16(),
                message: "Failed to exchange code for token".to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// Fetch the signed-in user's profile from the site API.
    pub async fn get_user_profile(
        &self,
        provider: &str,
        access_token: &str,
    ) -> AuthResult<ProviderProfile> {
        let response = self
            .http_client
            .get(self.api_url("/api/auth/profile"))
            .query(&[("provider", provider)])
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(
                provider = %provider,
                status = %status,
                body_summary = %summarize_response_body(&body),
                "Profile fetch failed"
            );
            return Err(AuthError::Transport {
                status: status.as_u16(),
                message: "Failed to get user profile".to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// Complete a redirect flow from the URL the provider sent the user back to.
    ///
    /// The URL is checked in full (provider error, `code`, `state`) before
    /// anything goes over the network. Nothing is stored on failure.
    ///
    /// Each call runs its own flow, so callbacks may overlap.
    pub async fn handle_callback(&self, provider: &str, url: &str) -> AuthResult<CallbackResult> {
        let mut flow = RedirectFlow::new();

        match self.run_callback(&mut flow, provider, url).await {
            Ok(result) => {
                self.step(&mut flow, FlowInput::Finish);
                info!(provider = %provider, "OAuth callback completed");
                Ok(result)
            }
            Err(e) => {
                error!(provider = %provider, error = %e, "OAuth callback failed");
                self.step(&mut flow, FlowInput::Fail);
                Err(e)
            }
        }
    }

    async fn run_callback(
        &self,
        flow: &mut RedirectFlow,
        provider: &str,
        url: &str,
    ) -> AuthResult<CallbackResult> {
        self.step(flow, FlowInput::CallbackArrived);

        let code = self.verify_callback_url(provider, url)?;

        let token = self.exchange_code_for_token(provider, &code).await?;
        self.step(flow, FlowInput::TokenReceived);

        let user_profile = self.get_user_profile(provider, &token.access_token).await?;
        self.step(flow, FlowInput::ProfileReceived);

        Ok(CallbackResult {
            provider: provider.to_string(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            user_profile,
        })
    }

    /// Returns the authorization code once the URL has passed every local check.
    fn verify_callback_url(&self, provider: &str, url: &str) -> AuthResult<String> {
        let parsed = Url::parse(url)?;
        let mut code = None;
        let mut state = None;
        let mut denied = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "code" if !value.is_empty() => code = Some(value.into_owned()),
                "state" if !value.is_empty() => state = Some(value.into_owned()),
                "error" => denied = Some(value.into_owned()),
                _ => {}
            }
        }

        // A state is spent by any callback that carries it, even a failed one.
        let pending = match &state {
            Some(state) => self.cache.take_pending_state(state)?,
            None => None,
        };

        if let Some(reason) = denied {
            return Err(AuthError::ProviderDenied(reason));
        }
        let code = code.ok_or(AuthError::MissingAuthorizationCode)?;
        if state.is_none() {
            return Err(AuthError::MissingState);
        }

        match pending {
            Some(pending) if pending.provider == provider => Ok(code),
            Some(pending) => {
                warn!(
                    expected = %pending.provider,
                    got = %provider,
                    "OAuth state was issued for another provider"
                );
                Err(AuthError::StateMismatch)
            }
            None => Err(AuthError::StateMismatch),
        }
    }

    /// `POST /api/auth/login`.
    pub async fn login_with_email_password(&self, email: &str, password: &str) -> AuthResult<Value> {
        self.post_site(
            "/api/auth/login",
            &json!({ "email": email, "password": password }),
            "Login failed",
        )
        .await
    }

    /// `POST /api/auth/register`.
    pub async fn register(&self, registration: &Registration) -> AuthResult<Value> {
        self.post_site("/api/auth/register", registration, "Registration failed")
            .await
    }

    /// `POST /api/auth/forgot-password`.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<Value> {
        self.post_site(
            "/api/auth/forgot-password",
            &json!({ "email": email }),
            "Password reset request failed",
        )
        .await
    }

    /// POST a JSON body and return the JSON reply as-is.
    async fn post_site<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        default_message: &str,
    ) -> AuthResult<Value> {
        let result = self.try_post_site(path, body, default_message).await;
        if let Err(e) = &result {
            error!(path = %path, error = %e, "{}", default_message);
        }
        result
    }

    async fn try_post_site<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        default_message: &str,
    ) -> AuthResult<Value> {
        let response = self
            .http_client
            .post(self.api_url(path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(
                status = %status,
                body_summary = %summarize_response_body(&body),
                "Site API returned an error"
            );
            return Err(AuthError::Transport {
                status: status.as_u16(),
                message: site_error_message(&body)
                    .unwrap_or_else(|| default_message.to_string()),
            });
        }

        Ok(response.json().await?)
    }
}

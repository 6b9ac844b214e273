//! Supabase REST client: GoTrue auth endpoints and the `profiles` table.
//!
//! Every request carries the project's `apikey` header. Authenticated calls
//! send the user's access token as `Authorization: Bearer`, anonymous calls
//! send the anon key there instead, which is what supabase-js does.

use crate::response::{backend_error_message, summarize_response_body};
use crate::types::{AuthResponse, Session, User, UserProfile};
use crate::{AuthError, AuthResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

const PROFILES_TABLE: &str = "profiles";

/// Low-level client for one Supabase project.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: Client,
    api_url: String,
    anon_key: String,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    ///
    /// # Arguments
    /// * `http_client` - Shared HTTP client
    /// * `api_url` - The Supabase project API URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The Supabase anonymous API key
    pub fn new(http_client: Client, api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    /// Project URL this client talks to.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Project ref, e.g. `abc123` for `https://abc123.supabase.co`.
    pub fn project_ref(&self) -> String {
        Url::parse(&self.api_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn with_keys(&self, request: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    /// Map a non-success response to `AuthError::Backend`; otherwise hand it back.
    async fn check(response: Response, action: &str) -> AuthResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            status = %status,
            body_summary = %summarize_response_body(&body),
            "Supabase {} failed",
            action
        );
        let message = backend_error_message(&body).unwrap_or_else(|| {
            format!(
                "{} failed: {}",
                action,
                status.canonical_reason().unwrap_or("unknown error")
            )
        });
        Err(AuthError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> AuthResult<T> {
        let response = Self::check(response, action).await?;
        Ok(response.json().await?)
    }

    // ========================================
    // Auth (GoTrue)
    // ========================================

    /// `POST /auth/v1/signup`.
    ///
    /// With email confirmation on, GoTrue answers with a bare user and no
    /// session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: Option<&Value>,
        redirect_to: Option<&str>,
    ) -> AuthResult<AuthResponse> {
        let mut request = self.http_client.post(self.auth_url("signup"));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }

        let response = self
            .with_keys(request, None)
            .json(&json!({
                "email": email,
                "password": password,
                "data": data.cloned().unwrap_or_else(|| json!({})),
            }))
            .send()
            .await?;

        let body: Value = Self::parse(response, "sign up").await?;
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body)?;
            Ok(session.with_expiry().into())
        } else {
            let user: User = match body.get("user") {
                Some(user) => serde_json::from_value(user.clone())?,
                None => serde_json::from_value(body)?,
            };
            Ok(AuthResponse {
                user: Some(user),
                session: None,
            })
        }
    }

    /// `POST /auth/v1/token?grant_type=password`.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        debug!(email = %email, "Attempting password sign-in");
        let response = self
            .with_keys(
                self.http_client
                    .post(self.auth_url("token"))
                    .query(&[("grant_type", "password")]),
                None,
            )
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let session: Session = Self::parse(response, "sign in").await?;
        Ok(session.with_expiry())
    }

    /// `POST /auth/v1/token?grant_type=refresh_token`.
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<Session> {
        debug!("Refreshing backend session");
        let response = self
            .with_keys(
                self.http_client
                    .post(self.auth_url("token"))
                    .query(&[("grant_type", "refresh_token")]),
                None,
            )
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let session: Session = Self::parse(response, "token refresh").await?;
        Ok(session.with_expiry())
    }

    /// `GET /auth/v1/user`.
    pub async fn get_user(&self, access_token: &str) -> AuthResult<User> {
        let response = self
            .with_keys(self.http_client.get(self.auth_url("user")), Some(access_token))
            .send()
            .await?;
        Self::parse(response, "get user").await
    }

    /// `PUT /auth/v1/user`.
    pub async fn update_user(&self, access_token: &str, attributes: &Value) -> AuthResult<User> {
        let response = self
            .with_keys(self.http_client.put(self.auth_url("user")), Some(access_token))
            .json(attributes)
            .send()
            .await?;
        Self::parse(response, "update user").await
    }

    /// `POST /auth/v1/logout`.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let response = self
            .with_keys(self.http_client.post(self.auth_url("logout")), Some(access_token))
            .send()
            .await?;
        Self::check(response, "sign out").await?;
        Ok(())
    }

    /// `POST /auth/v1/recover`.
    pub async fn recover(&self, email: &str, redirect_to: &str) -> AuthResult<()> {
        let response = self
            .with_keys(
                self.http_client
                    .post(self.auth_url("recover"))
                    .query(&[("redirect_to", redirect_to)]),
                None,
            )
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::check(response, "password recovery").await?;
        Ok(())
    }

    /// URL of `/auth/v1/authorize` for a backend provider name.
    pub fn authorize_url(
        &self,
        wire_provider: &str,
        redirect_to: Option<&str>,
        scopes: Option<&str>,
    ) -> AuthResult<String> {
        let mut url = Url::parse(&self.auth_url("authorize"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", wire_provider);
            if let Some(redirect_to) = redirect_to {
                query.append_pair("redirect_to", redirect_to);
            }
            if let Some(scopes) = scopes {
                query.append_pair("scopes", scopes);
            }
        }
        Ok(url.into())
    }

    // ========================================
    // Profiles table (PostgREST)
    // ========================================

    /// Single row by id. No row is an error (PostgREST 406).
    pub async fn select_profile(
        &self,
        access_token: Option<&str>,
        user_id: &str,
    ) -> AuthResult<UserProfile> {
        let id_filter = format!("eq.{}", user_id);
        let response = self
            .with_keys(
                self.http_client
                    .get(self.rest_url(PROFILES_TABLE))
                    .query(&[("id", id_filter.as_str()), ("select", "*")]),
                access_token,
            )
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;
        Self::parse(response, "profile fetch").await
    }

    /// PATCH the row with `id = user_id`, returning the updated rows.
    pub async fn update_profile(
        &self,
        access_token: Option<&str>,
        user_id: &str,
        updates: &Value,
    ) -> AuthResult<Vec<UserProfile>> {
        let id_filter = format!("eq.{}", user_id);
        let response = self
            .with_keys(
                self.http_client
                    .patch(self.rest_url(PROFILES_TABLE))
                    .query(&[("id", id_filter.as_str())]),
                access_token,
            )
            .header("Prefer", "return=representation")
            .json(updates)
            .send()
            .await?;
        Self::parse(response, "profile update").await
    }

    /// Insert one row, returning what was stored.
    pub async fn insert_profile(
        &self,
        access_token: Option<&str>,
        profile: &Value,
    ) -> AuthResult<Vec<UserProfile>> {
        let response = self
            .with_keys(self.http_client.post(self.rest_url(PROFILES_TABLE)), access_token)
            .header("Prefer", "return=representation")
            .json(&json!([profile]))
            .send()
            .await?;
        Self::parse(response, "profile insert").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(Client::new(), "https://abc123.supabase.co/", "anon")
    }

    #[test]
    fn test_project_ref() {
        assert_eq!(client().project_ref(), "abc123");
        let local = SupabaseClient::new(Client::new(), "http://127.0.0.1:54321", "anon");
        assert_eq!(local.project_ref(), "127");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(client().api_url(), "https://abc123.supabase.co");
    }

    #[test]
    fn test_authorize_url() {
        let url = client()
            .authorize_url("azure", Some("http://localhost:9876/account"), Some("email"))
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("provider".to_string(), "azure".to_string()),
                (
                    "redirect_to".to_string(),
                    "http://localhost:9876/account".to_string()
                ),
                ("scopes".to_string(), "email".to_string()),
            ]
        );
    }

    #[test]
    fn test_authorize_url_without_options() {
        let url = client().authorize_url("github", None, None).unwrap();
        assert_eq!(
            url,
            "https://abc123.supabase.co/auth/v1/authorize?provider=github"
        );
    }
}

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use devspark_auth::{
    AuthChangeEvent, AuthError, AuthResult, ErrorKind, ManualNavigator, Navigator,
    OAuthSignInOptions, Session, SignUpOptions, SupabaseClient, SupabaseConfig, SupabaseService,
};
use devspark_storage::{LocalAuthCache, MemoryStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON_KEY: &str = "anon-key";

fn user_json() -> Value {
    json!({
        "id": "user-1",
        "email": "ada@example.com",
        "user_metadata": {"full_name": "Ada Lovelace"}
    })
}

fn session_json(access_token: &str, expires_at: i64) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": "rt-1",
        "expires_in": 3600,
        "expires_at": expires_at,
        "token_type": "bearer",
        "user": user_json()
    })
}

fn jwt(exp: i64) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(json!({"sub": "user-1", "exp": exp}).to_string())
    )
}

fn new_service(cache: &LocalAuthCache) -> SupabaseService {
    SupabaseService::new(
        "http://localhost:9876",
        reqwest::Client::new(),
        cache.clone(),
        Arc::new(ManualNavigator),
    )
}

async fn service(server: &MockServer) -> (SupabaseService, LocalAuthCache) {
    let cache = LocalAuthCache::new(Arc::new(MemoryStore::new()));
    let service = new_service(&cache);
    service
        .init(SupabaseConfig::new(server.uri(), ANON_KEY))
        .await
        .unwrap();
    (service, cache)
}

fn project_ref(server: &MockServer) -> String {
    SupabaseClient::new(reqwest::Client::new(), server.uri(), ANON_KEY).project_ref()
}

fn store_session(server: &MockServer, cache: &LocalAuthCache, session: Value) {
    let session: Session = serde_json::from_value(session).unwrap();
    cache.save_session(&project_ref(server), &session).unwrap();
}

#[tokio::test]
async fn test_sign_in_with_password_persists_and_emits() {
    let server = MockServer::start().await;
    let expires_at = Utc::now().timestamp() + 3600;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_json(json!({"email": "ada@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at-1", expires_at)))
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;
    let mut sub = service.on_auth_state_change();

    let response = service
        .sign_in_with_password("ada@example.com", "pw")
        .await
        .unwrap();
    assert_eq!(response.user.unwrap().id, "user-1");

    let change = sub.try_recv().unwrap();
    assert_eq!(change.event, AuthChangeEvent::SignedIn);

    // Persisted and fresh: served without another request
    let session = service.get_session().await.unwrap();
    assert_eq!(session.access_token, "at-1");
    assert_eq!(session.expires_at, Some(expires_at));
}

#[tokio::test]
async fn test_sign_in_error_propagates_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let err = service
        .sign_in_with_password("ada@example.com", "bad")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(service.get_session().await.is_none());
}

#[tokio::test]
async fn test_sign_up_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"msg": "User already registered"})),
        )
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let err = service
        .sign_up("ada@example.com", "pw", SignUpOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "User already registered");
    assert_eq!(err.status(), Some(422));
}

#[tokio::test]
async fn test_sign_up_pending_confirmation_returns_user_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(query_param("redirect_to", "http://localhost:9876/welcome"))
        .and(body_json(json!({
            "email": "ada@example.com",
            "password": "pw",
            "data": {"full_name": "Ada Lovelace"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let response = service
        .sign_up(
            "ada@example.com",
            "pw",
            SignUpOptions {
                data: Some(json!({"full_name": "Ada Lovelace"})),
                email_redirect_to: Some("http://localhost:9876/welcome".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(response.session.is_none());
    assert_eq!(
        response.user.unwrap().user_metadata.full_name.as_deref(),
        Some("Ada Lovelace")
    );
}

#[tokio::test]
async fn test_get_user_downgrades_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "invalid JWT"})))
        .expect(1)
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );

    assert!(service.get_user().await.is_none());
}

#[tokio::test]
async fn test_get_session_refresh_failure_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"msg": "Invalid Refresh Token"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-old", Utc::now().timestamp() - 60),
    );

    assert!(service.get_session().await.is_none());
}

#[tokio::test]
async fn test_get_session_refreshes_expired_session() {
    let server = MockServer::start().await;
    let fresh_until = Utc::now().timestamp() + 3600;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "rt-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at-new", fresh_until)))
        .expect(1)
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-old", Utc::now().timestamp() - 60),
    );
    let mut sub = service.on_auth_state_change();

    let session = service.get_session().await.unwrap();
    assert_eq!(session.access_token, "at-new");
    assert_eq!(sub.try_recv().unwrap().event, AuthChangeEvent::TokenRefreshed);

    let stored: Session = cache.load_session(&project_ref(&server)).unwrap().unwrap();
    assert_eq!(stored.access_token, "at-new");
}

#[tokio::test]
async fn test_update_user_requires_session() {
    let server = MockServer::start().await;
    let (service, _cache) = service(&server).await;

    let err = service
        .update_user(&json!({"data": {"full_name": "Ada"}}))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotLoggedIn));
}

#[tokio::test]
async fn test_update_user_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"msg": "Password should be at least 6 characters"})),
        )
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );

    let err = service
        .update_user(&json!({"password": "123"}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Password should be at least 6 characters");
}

#[tokio::test]
async fn test_update_user_stores_user_and_emits() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "ada@example.com",
            "user_metadata": {"full_name": "Countess Lovelace"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );
    let mut sub = service.on_auth_state_change();

    let user = service
        .update_user(&json!({"data": {"full_name": "Countess Lovelace"}}))
        .await
        .unwrap();
    assert_eq!(user.user_metadata.full_name.as_deref(), Some("Countess Lovelace"));

    let change = sub.try_recv().unwrap();
    assert_eq!(change.event, AuthChangeEvent::UserUpdated);
    assert_eq!(
        change.session.unwrap().user.user_metadata.full_name.as_deref(),
        Some("Countess Lovelace")
    );
}

#[tokio::test]
async fn test_sign_out_clears_local_session_even_on_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );
    let mut sub = service.on_auth_state_change();

    assert!(service.sign_out().await.is_err());
    assert_eq!(sub.try_recv().unwrap().event, AuthChangeEvent::SignedOut);
    assert!(cache
        .load_session::<Session>(&project_ref(&server))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reset_password_redirects_to_site() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/recover"))
        .and(query_param("redirect_to", "http://localhost:9876/reset-password"))
        .and(body_json(json!({"email": "ada@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    service.reset_password("ada@example.com").await.unwrap();
}

#[tokio::test]
async fn test_set_session_with_live_token_fetches_user() {
    let server = MockServer::start().await;
    let exp = Utc::now().timestamp() + 3600;
    let token = jwt(exp);
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let response = service.set_session(&token, "rt-9").await.unwrap();
    let session = response.session.unwrap();
    assert_eq!(session.expires_at, Some(exp));
    assert_eq!(session.refresh_token, "rt-9");

    assert_eq!(service.get_session().await.unwrap().access_token, token);
}

#[tokio::test]
async fn test_set_session_with_expired_token_refreshes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "rt-9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json(
            "at-refreshed",
            Utc::now().timestamp() + 3600,
        )))
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let expired = jwt(Utc::now().timestamp() - 10);
    let response = service.set_session(&expired, "rt-9").await.unwrap();
    assert_eq!(response.session.unwrap().access_token, "at-refreshed");
}

#[tokio::test]
async fn test_session_from_url_recovery_link() {
    let server = MockServer::start().await;
    let exp = Utc::now().timestamp() + 3600;
    let token = jwt(exp);
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;
    let mut sub = service.on_auth_state_change();

    let url = format!(
        "http://localhost:9876/reset-password#access_token={}&refresh_token=rt-1&expires_in=3600&token_type=bearer&type=recovery",
        token
    );
    service.session_from_url(&url).await.unwrap();
    assert_eq!(
        sub.try_recv().unwrap().event,
        AuthChangeEvent::PasswordRecovery
    );
}

#[tokio::test]
async fn test_init_with_stored_session_emits_initial_session() {
    let server = MockServer::start().await;
    let cache = LocalAuthCache::new(Arc::new(MemoryStore::new()));
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );
    let service = new_service(&cache);
    let mut sub = service.on_auth_state_change();

    service
        .init(SupabaseConfig::new(server.uri(), ANON_KEY))
        .await
        .unwrap();

    let change = sub.recv().await.unwrap();
    assert_eq!(change.event, AuthChangeEvent::InitialSession);
    let view = service.update_ui_for_auth_state(change.event, change.session.as_ref());
    assert!(view.signed_in);
    assert_eq!(view.display_name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn test_unsubscribed_handle_stops_receiving() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );

    let sub = service.on_auth_state_change();
    sub.unsubscribe();
    let mut other = service.on_auth_state_change();

    service.sign_out().await.unwrap();
    assert_eq!(other.try_recv().unwrap().event, AuthChangeEvent::SignedOut);
}

#[tokio::test]
async fn test_profile_read_downgrades_and_writes_propagate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", "eq.missing"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "message": "JSON object requested, multiple (or no) rows returned"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "new row violates row-level security policy"})),
        )
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    assert!(service.get_user_profile("missing").await.is_none());

    let err = service
        .update_user_profile("user-1", &json!({"full_name": "Ada"}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "new row violates row-level security policy");
}

#[tokio::test]
async fn test_profile_read_and_create() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", "eq.user-1"))
        .and(query_param("select", "*"))
        .and(header("accept", "application/vnd.pgrst.object+json"))
        .and(header("authorization", format!("Bearer {}", ANON_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "full_name": "Ada Lovelace",
            "website": "https://ada.dev"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/profiles"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!([{"id": "user-2", "full_name": "Grace"}])))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([{"id": "user-2", "full_name": "Grace"}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let profile = service.get_user_profile("user-1").await.unwrap();
    assert_eq!(profile.full_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(profile.extra["website"], "https://ada.dev");

    let created = service
        .create_user_profile(&json!({"id": "user-2", "full_name": "Grace"}))
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].id, "user-2");
}

/// Remembers every URL it was asked to open.
#[derive(Default)]
struct RecordingNavigator {
    urls: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) -> AuthResult<()> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_sign_in_with_oauth_navigates_to_authorize() {
    let server = MockServer::start().await;
    let navigator = Arc::new(RecordingNavigator::default());
    let service = SupabaseService::new(
        "http://localhost:9876",
        reqwest::Client::new(),
        LocalAuthCache::new(Arc::new(MemoryStore::new())),
        navigator.clone(),
    );
    service
        .init(SupabaseConfig::new(server.uri(), ANON_KEY))
        .await
        .unwrap();

    let redirect = service
        .sign_in_with_oauth(
            "microsoft",
            OAuthSignInOptions {
                redirect_to: Some("http://localhost:9876/dashboard".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let urls = navigator.urls.lock().unwrap().clone();
    assert_eq!(urls, vec![redirect.url.clone()]);
    assert!(urls[0].starts_with(&format!("{}/auth/v1/authorize?", server.uri())));
    assert!(urls[0].contains("provider=azure"));

    service
        .sign_in_with_oauth(
            "github",
            OAuthSignInOptions {
                skip_browser_redirect: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(navigator.urls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_refresh_session_persists_and_emits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "rt-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json(
            "at-refreshed",
            Utc::now().timestamp() + 3600,
        )))
        .expect(1)
        .mount(&server)
        .await;
    let (service, cache) = service(&server).await;
    store_session(
        &server,
        &cache,
        session_json("at-1", Utc::now().timestamp() + 3600),
    );
    let mut sub = service.on_auth_state_change();

    let session = service.refresh_session().await.unwrap();
    assert_eq!(session.access_token, "at-refreshed");
    assert_eq!(sub.try_recv().unwrap().event, AuthChangeEvent::TokenRefreshed);

    let stored: Session = cache.load_session(&project_ref(&server)).unwrap().unwrap();
    assert_eq!(stored.access_token, "at-refreshed");
}

#[tokio::test]
async fn test_refresh_session_without_session() {
    let server = MockServer::start().await;
    let (service, _cache) = service(&server).await;

    let err = service.refresh_session().await.unwrap_err();
    assert!(matches!(err, AuthError::NotLoggedIn));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_set_session_with_out_of_range_exp_refreshes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json(
            "at-refreshed",
            Utc::now().timestamp() + 3600,
        )))
        .expect(1)
        .mount(&server)
        .await;
    let (service, _cache) = service(&server).await;

    let response = service.set_session(&jwt(i64::MIN), "rt-1").await.unwrap();
    assert_eq!(response.session.unwrap().access_token, "at-refreshed");
}

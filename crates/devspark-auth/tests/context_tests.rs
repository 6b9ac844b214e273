use devspark_auth::{AuthContext, FlowState, ManualNavigator};
use devspark_config::{Config, Paths};
use devspark_storage::{LocalAuthCache, MemoryStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGIN: &str = "http://localhost:9876";

fn config(server: &MockServer) -> Config {
    Config {
        site_origin: ORIGIN.to_string(),
        api_base_url: Some(server.uri()),
        supabase_url: server.uri(),
        supabase_anon_key: "anon-key".to_string(),
        ..Config::default()
    }
}

async fn context(server: &MockServer) -> (AuthContext, LocalAuthCache) {
    let cache = LocalAuthCache::new(Arc::new(MemoryStore::new()));
    let context = AuthContext::with_cache(config(server), cache.clone(), Arc::new(ManualNavigator))
        .await
        .unwrap();
    (context, cache)
}

#[tokio::test]
async fn test_login_mirrors_token_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "site-token",
            "user": {"id": 7, "email": "ada@example.com"}
        })))
        .mount(&server)
        .await;
    let (context, cache) = context(&server).await;

    context.login("ada@example.com", "pw").await.unwrap();

    assert_eq!(cache.auth_token().unwrap().as_deref(), Some("site-token"));
    let cached = context.cached_login().unwrap().unwrap();
    assert_eq!(cached.user, Some(json!({"id": 7, "email": "ada@example.com"})));
}

#[tokio::test]
async fn test_login_without_token_leaves_cache_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pending": true})))
        .mount(&server)
        .await;
    let (context, _cache) = context(&server).await;

    let body = context.login("ada@example.com", "pw").await.unwrap();
    assert_eq!(body, json!({"pending": true}));
    assert!(context.cached_login().unwrap().is_none());
}

#[tokio::test]
async fn test_failed_login_does_not_touch_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "nope"})))
        .mount(&server)
        .await;
    let (context, cache) = context(&server).await;
    cache.store_login("older-token", &json!({"id": 1})).unwrap();

    assert!(context.login("ada@example.com", "bad").await.is_err());
    assert_eq!(cache.auth_token().unwrap().as_deref(), Some("older-token"));
}

#[tokio::test]
async fn test_complete_oauth_mirrors_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "gh-token"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "name": "Octo",
            "provider": "github"
        })))
        .mount(&server)
        .await;
    let (context, cache) = context(&server).await;

    let auth_url = context.oauth().get_authorization_url("github").unwrap();
    let state = Url::parse(&auth_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let callback = format!("{}/auth/github/callback?code=c1&state={}", ORIGIN, state);

    let result = context.complete_oauth("github", &callback).await.unwrap();
    assert_eq!(result.access_token, "gh-token");
    assert_eq!(cache.auth_token().unwrap().as_deref(), Some("gh-token"));
    assert_eq!(
        cache.user::<serde_json::Value>().unwrap(),
        Some(json!({"id": 42, "name": "Octo", "provider": "github"}))
    );
}

#[tokio::test]
async fn test_logout_and_status() {
    let server = MockServer::start().await;
    let (context, cache) = context(&server).await;
    cache.store_login("t", &json!({"email": "ada@example.com"})).unwrap();

    let status = context.status().await.unwrap();
    assert_eq!(status.cached_login.unwrap().auth_token, "t");
    assert!(status.backend_user_id.is_none());
    assert_eq!(status.flow_state, FlowState::Idle);

    context.logout().unwrap();
    assert!(context.cached_login().unwrap().is_none());
    assert!(context.status().await.unwrap().cached_login.is_none());
}

#[tokio::test]
async fn test_new_opens_file_store_under_base_dir() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_base_dir(dir.path().join("devspark"));

    {
        let context = AuthContext::new(config(&server), &paths, Arc::new(ManualNavigator))
            .await
            .unwrap();
        context.cache().store_login("persisted", &json!(null)).unwrap();
    }

    assert!(paths.local_store_file().exists());
    let reopened = AuthContext::new(config(&server), &paths, Arc::new(ManualNavigator))
        .await
        .unwrap();
    assert_eq!(
        reopened.cached_login().unwrap().unwrap().auth_token,
        "persisted"
    );
}

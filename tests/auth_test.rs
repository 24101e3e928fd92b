//! Integration tests for the OAuth authorization flow and credential cache.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use linkedin_post_archiver::auth::{load_credential, save_credential, AuthState, Credential, TokenManager};
use linkedin_post_archiver::config::Config;
use linkedin_post_archiver::ArchiveError;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config pointing the token endpoint at `server` and the callback at an
/// ephemeral local port.
fn create_test_config(server: &MockServer, work_dir: &Path) -> Config {
    let mut config = Config::for_testing();
    config.auth.token_url = format!("{}/oauth/v2/accessToken", server.uri());
    config.auth.redirect_uri = "http://127.0.0.1:0/callback".to_string();
    config.auth.token_cache_path = work_dir.join("cache/token.json");
    config
}

async fn mount_token_endpoint(server: &MockServer, expected_hits: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/v2/accessToken"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-123"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 5_184_000,
            "scope": "openid,profile,w_member_social"
        })))
        .expect(expected_hits)
        .mount(server)
        .await;
}

/// Play the browser: follow the redirect to the local listener.
async fn send_callback(addr: std::net::SocketAddr, query: &str) -> reqwest::StatusCode {
    reqwest::get(format!("http://{addr}/callback?{query}"))
        .await
        .expect("Callback request failed")
        .status()
}

#[tokio::test]
async fn test_full_authorization_flow() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());

    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");
    let pending = tokens
        .begin_authorization()
        .await
        .expect("Failed to begin authorization");
    assert_eq!(tokens.state(), &AuthState::Authorizing);

    let query: HashMap<String, String> = pending
        .authorization_url()
        .query_pairs()
        .into_owned()
        .collect();
    assert_eq!(query.get("response_type").map(String::as_str), Some("code"));
    assert_eq!(query.get("client_id").map(String::as_str), Some("test-client"));
    assert_eq!(query.get("code_challenge_method").map(String::as_str), Some("S256"));
    assert_eq!(query.get("state").map(String::as_str), Some(pending.state()));
    assert_eq!(query.get("code_challenge").map(String::len), Some(43));

    let status = send_callback(
        pending.callback_addr(),
        &format!("code=auth-code-123&state={}", pending.state()),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let credential = tokens
        .complete_authorization(pending)
        .await
        .expect("Authorization should succeed");

    assert_eq!(credential.access_token, "fresh-token");
    assert!(!credential.is_expired());
    assert!(matches!(tokens.state(), AuthState::Authenticated(_)));
    assert_eq!(tokens.credential(), Some(&credential));

    let cached = load_credential(&config.auth.token_cache_path)
        .await
        .expect("Credential should be cached");
    assert_eq!(cached, credential);
}

#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 0).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());

    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");
    let pending = tokens.begin_authorization().await.expect("Failed to begin");

    send_callback(pending.callback_addr(), "code=auth-code-123&state=forged").await;
    let err = tokens.complete_authorization(pending).await.unwrap_err();

    assert!(matches!(err, ArchiveError::Auth(_)), "unexpected error: {err:?}");
    assert_eq!(tokens.state(), &AuthState::Unauthenticated);
    assert!(!config.auth.token_cache_path.exists());
}

#[tokio::test]
async fn test_denied_authorization() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 0).await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());

    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");
    let pending = tokens.begin_authorization().await.expect("Failed to begin");

    let status = send_callback(
        pending.callback_addr(),
        "error=user_cancelled_authorize&error_description=The+user+cancelled",
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    let err = tokens.complete_authorization(pending).await.unwrap_err();
    match err {
        ArchiveError::Auth(message) => assert!(message.contains("user_cancelled_authorize")),
        other => panic!("expected Auth error, got {other:?}"),
    }
    assert!(!config.auth.token_cache_path.exists());
}

#[tokio::test]
async fn test_token_endpoint_rejection() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/accessToken"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "authorization code expired"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());

    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");
    let pending = tokens.begin_authorization().await.expect("Failed to begin");
    let state = pending.state().to_string();

    send_callback(pending.callback_addr(), &format!("code=stale&state={state}")).await;
    let err = tokens.complete_authorization(pending).await.unwrap_err();

    match err {
        ArchiveError::Auth(message) => assert!(message.contains("invalid_grant")),
        other => panic!("expected Auth error, got {other:?}"),
    }
    assert_eq!(tokens.state(), &AuthState::Unauthenticated);
    assert!(!config.auth.token_cache_path.exists());
}

#[tokio::test]
async fn test_missing_client_id() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&mock_server, temp_dir.path());
    config.auth.client_id = String::new();

    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");
    let err = tokens.begin_authorization().await.err().expect("Should fail");

    assert!(matches!(err, ArchiveError::Config(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_load_cached_states() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());
    let cache = &config.auth.token_cache_path;
    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");

    // Nothing cached yet
    assert_eq!(tokens.load_cached().await, &AuthState::Unauthenticated);

    let valid = Credential {
        access_token: "cached".to_string(),
        expires_at: Utc::now() + chrono::Duration::days(30),
        scope: String::new(),
    };
    save_credential(cache, &valid).await.expect("Failed to save");
    assert_eq!(tokens.load_cached().await, &AuthState::Authenticated(valid));

    let expired = Credential {
        access_token: "stale".to_string(),
        expires_at: Utc::now() - chrono::Duration::seconds(1),
        scope: String::new(),
    };
    save_credential(cache, &expired).await.expect("Failed to save");
    assert_eq!(tokens.load_cached().await, &AuthState::Expired(expired));
    assert!(tokens.credential().is_none());

    std::fs::write(cache, "{ not json").expect("Failed to corrupt cache");
    assert_eq!(tokens.load_cached().await, &AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_clear_cache() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());
    let credential = Credential {
        access_token: "cached".to_string(),
        expires_at: Utc::now() + chrono::Duration::days(1),
        scope: String::new(),
    };
    save_credential(&config.auth.token_cache_path, &credential)
        .await
        .expect("Failed to save");

    let mut tokens = TokenManager::new(&config).expect("Failed to create token manager");
    tokens.clear_cache().await.expect("Failed to clear cache");
    assert!(!config.auth.token_cache_path.exists());

    // Clearing twice is fine
    tokens.clear_cache().await.expect("Second clear should succeed");
}

#[tokio::test]
async fn test_unrepresentable_token_lifetime_is_auth_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/accessToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "t",
            "expires_in": i64::MAX
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server, temp_dir.path());

    let tokens = TokenManager::new(&config).expect("Failed to create token manager");
    let err = tokens.exchange_code("c", "v").await.unwrap_err();

    match err {
        ArchiveError::Auth(message) => assert!(message.contains("expires_in")),
        other => panic!("expected Auth error, got {other:?}"),
    }
    assert_eq!(tokens.state(), &AuthState::Unauthenticated);
}

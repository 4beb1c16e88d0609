mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tether::auth::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, RefreshOutcome,
    TokenManager,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{oauth_client, token_body, TOKEN_PATH};

fn stored(access: &str, refresh: &str) -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credentials(
        Credentials::new(access, refresh).expect("pair"),
    ))
}

#[tokio::test]
async fn refresh_without_refresh_token_needs_login_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut manager = TokenManager::load(Arc::new(MemoryCredentialStore::new()), oauth_client(&server));

    assert_eq!(manager.refresh().await, RefreshOutcome::NeedsLogin);
    assert_eq!(manager.ensure_session().await, RefreshOutcome::NeedsLogin);
    assert!(!manager.credentials().is_authenticated());
}

#[tokio::test]
async fn successful_refresh_installs_and_persists_the_new_pair() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-0"))
        .and(body_string_contains("client_secret=test-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("id-1", "refresh-1")))
        .expect(1)
        .mount(&server)
        .await;

    let store = stored("id-0", "refresh-0");
    let mut manager = TokenManager::load(store.clone(), oauth_client(&server));

    assert_eq!(manager.refresh().await, RefreshOutcome::Refreshed);
    assert_eq!(manager.credentials().access_token(), "id-1");
    assert_eq!(manager.credentials().refresh_token(), "refresh-1");
    assert_eq!(store.load().expect("load"), manager.credentials().clone());
}

#[tokio::test]
async fn refresh_response_without_refresh_token_keeps_the_old_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id_token": "id-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut manager = TokenManager::load(stored("id-0", "refresh-0"), oauth_client(&server));

    assert_eq!(manager.refresh().await, RefreshOutcome::Refreshed);
    assert_eq!(manager.credentials().access_token(), "id-2");
    assert_eq!(manager.credentials().refresh_token(), "refresh-0");
}

#[tokio::test]
async fn rejected_refresh_leaves_the_pair_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = stored("id-0", "refresh-0");
    let mut manager = TokenManager::load(store.clone(), oauth_client(&server));

    assert_eq!(manager.refresh().await, RefreshOutcome::NeedsLogin);
    assert_eq!(manager.credentials().access_token(), "id-0");
    assert_eq!(manager.credentials().refresh_token(), "refresh-0");
    assert_eq!(store.load().expect("load").access_token(), "id-0");
}

#[tokio::test]
async fn malformed_grant_body_needs_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let mut manager = TokenManager::load(stored("id-0", "refresh-0"), oauth_client(&server));

    assert_eq!(manager.refresh().await, RefreshOutcome::NeedsLogin);
    assert_eq!(manager.credentials().access_token(), "id-0");
}

#[tokio::test]
async fn file_store_carries_the_pair_across_restarts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("id-1", "refresh-1")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(dir.path().to_path_buf()));
    store
        .save(&Credentials::new("id-0", "refresh-0").expect("pair"))
        .expect("seed");

    let mut manager = TokenManager::load(store.clone(), oauth_client(&server));
    assert_eq!(manager.ensure_session().await, RefreshOutcome::Refreshed);
    drop(manager);

    let reloaded = TokenManager::load(
        Arc::new(FileCredentialStore::new(dir.path().to_path_buf())),
        oauth_client(&server),
    );
    assert_eq!(reloaded.credentials().access_token(), "id-1");
    assert_eq!(reloaded.credentials().refresh_token(), "refresh-1");
}

#[tokio::test]
async fn unreadable_store_starts_unauthenticated() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileCredentialStore::new(dir.path().to_path_buf());
    std::fs::write(store.path(), "access_token = [not toml").expect("write");

    let manager = TokenManager::load(Arc::new(store), oauth_client(&server));
    assert!(!manager.credentials().is_authenticated());
}

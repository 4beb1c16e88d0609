mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tether::auth::{AuthError, AuthorizationFlow, DeviceCodePoll, LoginState, PollPolicy};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{
    device_code_body, oauth_client, token_body, RecordingBroadcaster, DEVICE_CODE_PATH, TOKEN_PATH,
};

const VERIFICATION_URI: &str = "https://example.auth0.com/activate?user_code=ABCDEFGHIJK";

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        max_attempts,
        interval: Duration::from_millis(1),
    }
}

async fn mount_device_code(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(VERIFICATION_URI)))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn device_code_request_sends_client_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .and(header("accept", "application/json"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("scope=openid+offline_access"))
        .and(body_string_contains("audience=https%3A%2F%2Fapi.example%2F"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(VERIFICATION_URI)))
        .expect(1)
        .mount(&server)
        .await;

    let session = oauth_client(&server)
        .request_device_code()
        .await
        .expect("device code");

    assert_eq!(session.device_code, "device-123");
    assert_eq!(session.verification_uri_complete, VERIFICATION_URI);
    assert_eq!(session.interval_secs, 0);
}

#[tokio::test]
async fn rejected_device_code_request_fails_the_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let flow = AuthorizationFlow::new(oauth_client(&server), broadcaster.clone())
        .with_policy(fast_policy(3));
    let err = flow.run().await.expect_err("flow should fail");

    assert!(matches!(err, AuthError::Rejected { status: 500 }));
    assert!(broadcaster.started().is_empty());
    assert_eq!(flow.state(), LoginState::Idle);
}

#[tokio::test]
async fn polls_through_pending_answers_until_granted() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code",
        ))
        .and(body_string_contains("device_code=device-123"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "authorization_pending"})),
        )
        .up_to_n_times(3)
        .with_priority(1)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("id-1", "refresh-1")))
        .expect(1)
        .mount(&server)
        .await;

    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let flow = AuthorizationFlow::new(oauth_client(&server), broadcaster.clone())
        .with_policy(fast_policy(10));
    let outcome = flow.run().await.expect("flow");

    match outcome {
        DeviceCodePoll::Authorized { credentials } => {
            assert_eq!(credentials.access_token(), "id-1");
            assert_eq!(credentials.refresh_token(), "refresh-1");
        }
        other => panic!("expected Authorized, got {other:?}"),
    }
    let started = broadcaster.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].as_bytes(), b"ABCDEFGHIJK");
    assert_eq!(broadcaster.stops(), 1);
    assert_eq!(flow.state(), LoginState::Authorized);
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "slow_down"})))
        .expect(3)
        .mount(&server)
        .await;

    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let flow = AuthorizationFlow::new(oauth_client(&server), broadcaster.clone())
        .with_policy(fast_policy(3));
    let outcome = flow.run().await.expect("flow");

    assert_eq!(outcome, DeviceCodePoll::Expired);
    assert_eq!(broadcaster.stops(), 1);
    assert_eq!(flow.state(), LoginState::Expired);
}

#[tokio::test]
async fn state_watchers_see_polling_progress() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("id-1", "refresh-1")))
        .mount(&server)
        .await;

    let flow = AuthorizationFlow::new(
        oauth_client(&server),
        Arc::new(RecordingBroadcaster::new()),
    )
    .with_policy(fast_policy(5));
    let mut states = flow.watch_state();
    assert_eq!(*states.borrow(), LoginState::Idle);

    flow.run().await.expect("flow");

    assert!(states.has_changed().expect("sender alive"));
    assert!(states.borrow_and_update().is_terminal());
}

#[tokio::test]
async fn short_verification_uri_does_not_abort_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_CODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body("short")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("id-1", "refresh-1")))
        .expect(1)
        .mount(&server)
        .await;

    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let flow = AuthorizationFlow::new(oauth_client(&server), broadcaster.clone())
        .with_policy(fast_policy(2));
    let outcome = flow.run().await.expect("flow");

    assert!(matches!(outcome, DeviceCodePoll::Authorized { .. }));
    assert!(broadcaster.started().is_empty());
}

#[tokio::test]
async fn announce_broadcasts_the_last_eleven_bytes_of_the_uri() {
    let server = MockServer::start().await;
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let flow = AuthorizationFlow::new(oauth_client(&server), broadcaster.clone());
    let session = tether::auth::DeviceCodeSession {
        device_code: "abc".to_string(),
        verification_uri_complete: "https://x.example/ABCDEFGHIJK".to_string(),
        interval_secs: 5,
    };

    let payload = flow.announce(&session).await.expect("announce");

    assert_eq!(payload.as_bytes(), b"ABCDEFGHIJK");
    assert_eq!(broadcaster.started(), vec![payload]);
    assert_eq!(flow.state(), LoginState::Announcing);
    assert_eq!(flow.policy().delay_for(&session), Duration::from_secs(10));
}

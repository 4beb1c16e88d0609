#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tether::auth::{AuthError, OAuthClient, OAuthSettings};
use tether::beacon::{BeaconPayload, Broadcaster};
use tether::error::TetherError;
use tether::relay::{RelayConnector, RelayLink, TransportNotice, TransportSink};
use wiremock::MockServer;

pub const DEVICE_CODE_PATH: &str = "/oauth/device/code";
pub const TOKEN_PATH: &str = "/oauth/token";

pub fn oauth_settings(server: &MockServer) -> OAuthSettings {
    OAuthSettings {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        audience: "https://api.example/".to_string(),
        scope: "openid offline_access".to_string(),
        device_code_url: format!("{}{}", server.uri(), DEVICE_CODE_PATH),
        token_url: format!("{}{}", server.uri(), TOKEN_PATH),
    }
}

pub fn oauth_client(server: &MockServer) -> Arc<OAuthClient> {
    Arc::new(OAuthClient::new(oauth_settings(server)))
}

pub fn device_code_body(verification_uri_complete: &str) -> Value {
    json!({
        "device_code": "device-123",
        "user_code": "ABCD-EFGH",
        "verification_uri": "https://example.auth0.com/activate",
        "verification_uri_complete": verification_uri_complete,
        "expires_in": 900,
        "interval": 0
    })
}

pub fn token_body(id_token: &str, refresh_token: &str) -> Value {
    json!({
        "access_token": "opaque-access",
        "id_token": id_token,
        "refresh_token": refresh_token,
        "token_type": "Bearer",
        "expires_in": 86400
    })
}

/// Records every start/stop call.
#[derive(Default)]
pub struct RecordingBroadcaster {
    started: Mutex<Vec<BeaconPayload>>,
    stops: AtomicUsize,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<BeaconPayload> {
        self.started.lock().expect("broadcaster lock poisoned").clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn start(&self, payload: &BeaconPayload) -> Result<(), AuthError> {
        self.started
            .lock()
            .expect("broadcaster lock poisoned")
            .push(*payload);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AuthError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Ordered log of relay operations: `connect <url>`, `send <text>`, `close`.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock poisoned").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock poisoned").clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

/// Relay connector that never touches the network.
#[derive(Default)]
pub struct ScriptedConnector {
    journal: Journal,
    reject_status: Mutex<Option<u16>>,
    links: Mutex<Vec<Arc<AtomicBool>>>,
    sinks: Mutex<Vec<TransportSink>>,
}

impl ScriptedConnector {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Fail every following handshake with `status`.
    pub fn reject_with(&self, status: u16) {
        *self.reject_status.lock().expect("connector lock poisoned") = Some(status);
    }

    /// Mark the most recent link as dropped by the peer.
    pub fn drop_connection(&self) {
        if let Some(flag) = self.links.lock().expect("connector lock poisoned").last() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn last_sink(&self) -> Option<TransportSink> {
        self.sinks.lock().expect("connector lock poisoned").last().cloned()
    }
}

#[async_trait]
impl RelayConnector for ScriptedConnector {
    async fn connect(
        &self,
        url: &str,
        sink: TransportSink,
    ) -> Result<Box<dyn RelayLink>, TetherError> {
        self.journal.push(format!("connect {url}"));
        let rejected = *self.reject_status.lock().expect("connector lock poisoned");
        if let Some(status) = rejected {
            return Err(TetherError::http(status, "handshake refused"));
        }
        let _ = sink.notify(TransportNotice::Connected).await;
        let connected = Arc::new(AtomicBool::new(true));
        self.links
            .lock()
            .expect("connector lock poisoned")
            .push(connected.clone());
        self.sinks.lock().expect("connector lock poisoned").push(sink);
        Ok(Box::new(ScriptedLink {
            journal: self.journal.clone(),
            connected,
        }))
    }
}

struct ScriptedLink {
    journal: Journal,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl RelayLink for ScriptedLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_text(&mut self, text: &str) -> Result<(), TetherError> {
        self.journal.push(format!("send {text}"));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TetherError> {
        self.connected.store(false, Ordering::SeqCst);
        self.journal.push("close");
        Ok(())
    }
}

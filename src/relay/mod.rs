//! Persistent relay connection: lifecycle, outbound sends, and translation
//! of transport notifications into bus events.

#[cfg(feature = "ws")]
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{Event, EventSender, PublishOutcome};
use crate::error::TetherError;

#[cfg(feature = "ws")]
pub use ws::WsConnector;

/// Placeholder replaced by the access token in the relay URL template.
pub const TOKEN_PLACEHOLDER: &str = "{token}";

/// Close codes the relay uses to refuse an access token.
pub const UNAUTHORIZED_CLOSE_CODES: [u16; 3] = [1008, 4001, 4003];

/// Default bound on a single outbound send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Raw notification from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportNotice {
    Connected,
    Text(String),
    /// Close frame or stream end. `code` is absent when no frame carried one.
    Closed { code: Option<u16> },
    /// Handshake refused with an HTTP status. Recovery is left to the
    /// refresh timer, whatever the status.
    Rejected { status: u16 },
    Error(String),
}

impl TransportNotice {
    /// 1:1 translation into a bus event. Generic errors map to nothing.
    pub fn into_event(self) -> Option<Event> {
        match self {
            Self::Connected => Some(Event::TransportConnected),
            Self::Text(text) => Some(Event::TransportDataReceived(text)),
            Self::Closed { code: Some(code) } if UNAUTHORIZED_CLOSE_CODES.contains(&code) => {
                Some(Event::TransportClosedUnauthorized)
            }
            Self::Closed { .. } => Some(Event::TransportClosed),
            Self::Rejected { .. } => Some(Event::TransportClosed),
            Self::Error(_) => None,
        }
    }
}

/// Where transport callbacks deliver notices. Only ever enqueues.
#[derive(Clone)]
pub struct TransportSink {
    events: EventSender,
}

impl TransportSink {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub async fn notify(&self, notice: TransportNotice) -> PublishOutcome {
        if let TransportNotice::Error(message) = &notice {
            tracing::info!(error = %message, "relay transport error");
        }
        match notice.into_event() {
            Some(event) => self.events.publish(event).await,
            None => PublishOutcome::Dropped,
        }
    }
}

/// Establishes relay links.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Connect to `url`; the link reports its notices to `sink`.
    async fn connect(&self, url: &str, sink: TransportSink)
        -> Result<Box<dyn RelayLink>, TetherError>;
}

/// One live relay connection.
#[async_trait]
pub trait RelayLink: Send {
    fn is_connected(&self) -> bool;
    async fn send_text(&mut self, text: &str) -> Result<(), TetherError>;
    async fn close(&mut self) -> Result<(), TetherError>;
}

/// Owns the (at most one) relay link.
pub struct ConnectivityManager {
    connector: Arc<dyn RelayConnector>,
    sink: TransportSink,
    url_template: String,
    send_timeout: Duration,
    link: Option<Box<dyn RelayLink>>,
}

impl ConnectivityManager {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        sink: TransportSink,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            sink,
            url_template: url_template.into(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            link: None,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Whether a link exists and reports itself connected.
    pub fn is_open(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_connected())
    }

    /// Whether a link handle is held, connected or not.
    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    /// Connect with `access_token` embedded in the URL.
    ///
    /// Opening while a link is held is a caller error. A refused handshake is
    /// reported through the sink as a plain close.
    pub async fn open(&mut self, access_token: &str) -> Result<(), TetherError> {
        if self.link.is_some() {
            return Err(TetherError::InvalidState(
                "relay link already open".to_string(),
            ));
        }
        let url = build_relay_url(&self.url_template, access_token)?;
        tracing::info!(url = %redact_token(&url, access_token), "connecting to relay");
        match self.connector.connect(&url, self.sink.clone()).await {
            Ok(link) => {
                self.link = Some(link);
                Ok(())
            }
            Err(TetherError::Http { status, message }) => {
                let _ = self.sink.notify(TransportNotice::Rejected { status }).await;
                Err(TetherError::Http { status, message })
            }
            Err(err) => Err(err),
        }
    }

    /// Close and release the link. No-op when nothing is open.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(err) = link.close().await {
                tracing::debug!(error = %err, "relay close reported an error");
            }
            tracing::info!("relay link closed");
        }
    }

    /// Best-effort send bounded by the send timeout. No retry, no queuing.
    pub async fn send(&mut self, text: &str) -> Result<(), TetherError> {
        let timeout = self.send_timeout;
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| TetherError::Transport("relay link not open".to_string()))?;
        match tokio::time::timeout(timeout, link.send_text(text)).await {
            Ok(result) => result,
            Err(_) => Err(TetherError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

/// Substitute the access token into the relay URL template.
pub fn build_relay_url(template: &str, access_token: &str) -> Result<String, TetherError> {
    let trimmed = template.trim();
    if !trimmed.contains(TOKEN_PLACEHOLDER) {
        return Err(TetherError::Configuration(format!(
            "relay url template must contain {TOKEN_PLACEHOLDER}"
        )));
    }
    Ok(trimmed.replace(TOKEN_PLACEHOLDER, access_token))
}

fn redact_token(url: &str, access_token: &str) -> String {
    if access_token.is_empty() {
        url.to_string()
    } else {
        url.replace(access_token, "***")
    }
}

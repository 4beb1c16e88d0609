//! The single consumer of the event bus.
//!
//! Every device-level reaction (login, refresh, relay open/close, message
//! forwarding) happens here, one event at a time. Producers only enqueue.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthorizationFlow, DeviceCodePoll, RefreshOutcome, TokenManager};
use crate::bus::{Event, EventReceiver, EventSender};
use crate::device::DeviceHandler;
use crate::relay::ConnectivityManager;

/// Default wait for the next event before the loop runs housekeeping.
pub const DEFAULT_CONSUME_TIMEOUT: Duration = Duration::from_millis(100);

pub struct Orchestrator {
    tokens: TokenManager,
    relay: ConnectivityManager,
    flow: Arc<AuthorizationFlow>,
    handler: Arc<dyn DeviceHandler>,
    events: EventSender,
    receiver: EventReceiver,
    consume_timeout: Duration,
    login_task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(
        tokens: TokenManager,
        relay: ConnectivityManager,
        flow: Arc<AuthorizationFlow>,
        handler: Arc<dyn DeviceHandler>,
        bus: (EventSender, EventReceiver),
    ) -> Self {
        let (events, receiver) = bus;
        Self {
            tokens,
            relay,
            flow,
            handler,
            events,
            receiver,
            consume_timeout: DEFAULT_CONSUME_TIMEOUT,
            login_task: None,
        }
    }

    pub fn with_consume_timeout(mut self, timeout: Duration) -> Self {
        self.consume_timeout = timeout;
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn relay(&self) -> &ConnectivityManager {
        &self.relay
    }

    /// Producer handle onto this orchestrator's bus.
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Whether a device-code login task is still running.
    pub fn login_in_flight(&self) -> bool {
        self.login_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Process events until `shutdown` is cancelled, then release the relay
    /// link and any running login.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("orchestrator started");
        while !shutdown.is_cancelled() {
            self.step().await;
        }
        if let Some(task) = self.login_task.take() {
            task.abort();
        }
        self.relay.close().await;
        tracing::info!("orchestrator stopped");
    }

    /// Handle at most one event. Returns whether one arrived in time.
    pub async fn step(&mut self) -> bool {
        match self.receiver.consume(self.consume_timeout).await {
            Some(event) => {
                self.dispatch(event).await;
                true
            }
            None => {
                if self.login_task.as_ref().is_some_and(|task| task.is_finished()) {
                    self.login_task = None;
                }
                false
            }
        }
    }

    pub async fn dispatch(&mut self, event: Event) {
        tracing::debug!(event = event.kind().name(), "dispatching");
        match event {
            Event::Started => self.start_session().await,
            Event::TokenRefreshed => self.connect().await,
            Event::TransportConnected => tracing::info!("relay connected"),
            Event::TransportDataReceived(payload) => self.forward(&payload).await,
            Event::TransportClosedUnauthorized => {
                tracing::warn!("relay refused the access token");
                self.relay.close().await;
                self.refresh().await;
            }
            Event::TransportClosed => {
                tracing::info!("relay disconnected");
                self.relay.close().await;
            }
            Event::OutboundValueChanged(payload) => self.send(&payload).await,
            Event::RefreshDue => self.refresh().await,
            Event::LoginCompleted(credentials) => {
                self.login_task = None;
                self.tokens.install(credentials);
                tracing::info!("login completed");
                self.announce_refreshed().await;
            }
            Event::LoginFailed => {
                self.login_task = None;
                tracing::warn!("login did not complete, waiting for the next trigger");
            }
        }
    }

    async fn start_session(&mut self) {
        if self.login_in_flight() {
            tracing::debug!("login in progress, start ignored");
            return;
        }
        match self.tokens.ensure_session().await {
            RefreshOutcome::Refreshed => self.announce_refreshed().await,
            RefreshOutcome::NeedsLogin => self.start_login(),
        }
    }

    async fn refresh(&mut self) {
        if self.login_in_flight() {
            tracing::debug!("login in progress, refresh skipped");
            return;
        }
        match self.tokens.refresh().await {
            RefreshOutcome::Refreshed => self.announce_refreshed().await,
            RefreshOutcome::NeedsLogin => self.start_login(),
        }
    }

    /// Queue `TokenRefreshed`. Connects inline if the bus has no room, since
    /// this loop is the only one that could drain it.
    async fn announce_refreshed(&mut self) {
        if !self.events.try_publish(Event::TokenRefreshed).is_delivered() {
            self.connect().await;
        }
    }

    async fn connect(&mut self) {
        if self.relay.is_open() {
            tracing::debug!("relay already open");
            return;
        }
        if self.relay.has_link() {
            self.relay.close().await;
        }
        let access_token = self.tokens.credentials().access_token().to_string();
        if access_token.is_empty() {
            tracing::warn!("no access token, relay not opened");
            return;
        }
        if let Err(err) = self.relay.open(&access_token).await {
            tracing::warn!(error = %err, "could not open relay");
        }
    }

    async fn forward(&mut self, payload: &str) {
        let Some(response) = self.handler.handle(payload) else {
            return;
        };
        match response.to_json() {
            Ok(text) => self.send(&text).await,
            Err(err) => tracing::warn!(error = %err, "could not encode response"),
        }
    }

    async fn send(&mut self, text: &str) {
        if let Err(err) = self.relay.send(text).await {
            tracing::warn!(error = %err, bytes = text.len(), "relay send failed, message dropped");
        }
    }

    fn start_login(&mut self) {
        if self.login_in_flight() {
            tracing::debug!("login already in progress");
            return;
        }
        let flow = self.flow.clone();
        let events = self.events.clone();
        self.login_task = Some(tokio::spawn(async move {
            let outcome = match flow.run().await {
                Ok(DeviceCodePoll::Authorized { credentials }) => {
                    Event::LoginCompleted(credentials)
                }
                Ok(_) => Event::LoginFailed,
                Err(err) => {
                    tracing::warn!(error = %err, "login failed");
                    Event::LoginFailed
                }
            };
            deliver(&events, outcome).await;
        }));
    }
}

/// Publish a login outcome, retrying while the bus is full.
async fn deliver(events: &EventSender, event: Event) {
    while !events.publish(event.clone()).await.is_delivered() {
        if events.is_closed() {
            return;
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("authenticated", &self.tokens.credentials().is_authenticated())
            .field("relay_open", &self.relay.is_open())
            .field("login_in_flight", &self.login_in_flight())
            .finish_non_exhaustive()
    }
}

//! Bounded, ordered event queue between asynchronous producers and the
//! single orchestrator loop.
//!
//! Capacity is a byte budget, not a slot count: each queued event costs one
//! tag byte plus the relay text it carries. Publishers wait at most
//! `publish_timeout` for room and then drop the event.

use std::sync::Arc;
use std::time::Duration;

use strum::{EnumDiscriminants, IntoStaticStr};
use tokio::sync::{mpsc, Semaphore};

use crate::auth::Credentials;

/// Default byte budget of the queue.
pub const DEFAULT_CAPACITY_BYTES: usize = 1000;
/// Default time a publisher waits for room.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);

/// Device-level event, dispatched by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(IntoStaticStr, Hash))]
pub enum Event {
    Started,
    TransportConnected,
    /// Text frame received from the relay, handed to the device handler as is.
    TransportDataReceived(String),
    TransportClosed,
    /// Relay closed the link because the access token was refused.
    TransportClosedUnauthorized,
    /// Serialized notification to send verbatim over the relay.
    OutboundValueChanged(String),
    TokenRefreshed,
    /// Refresh timer fired.
    RefreshDue,
    /// Login task obtained a new pair.
    LoginCompleted(Credentials),
    /// Login task ended without a pair.
    LoginFailed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    /// Bytes this event occupies in the queue budget: one tag byte plus
    /// the relay text it carries.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::TransportDataReceived(text) | Self::OutboundValueChanged(text) => 1 + text.len(),
            _ => 1,
        }
    }
}

impl EventKind {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Result of [`EventSender::publish`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Queue stayed full past the timeout, or the consumer is gone.
    Dropped,
}

impl PublishOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

struct Envelope {
    event: Event,
    cost: u32,
}

/// Producer handle. Cheap to clone; one per producing context.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Envelope>,
    budget: Arc<Semaphore>,
    capacity: usize,
    publish_timeout: Duration,
}

/// The single consumer end.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
    budget: Arc<Semaphore>,
}

/// Create a bus with the given byte budget and publish timeout.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::time::Duration;
/// use tether::bus::{event_bus, Event};
///
/// let (tx, mut rx) = event_bus(1000, Duration::from_millis(100));
/// assert!(tx.publish(Event::Started).await.is_delivered());
/// assert_eq!(rx.consume(Duration::from_millis(100)).await, Some(Event::Started));
/// # }
/// ```
pub fn event_bus(capacity_bytes: usize, publish_timeout: Duration) -> (EventSender, EventReceiver) {
    let capacity = capacity_bytes.min(Semaphore::MAX_PERMITS);
    let budget = Arc::new(Semaphore::new(capacity));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSender {
            tx,
            budget: budget.clone(),
            capacity,
            publish_timeout,
        },
        EventReceiver { rx, budget },
    )
}

impl EventSender {
    /// Enqueue `event`, waiting up to the publish timeout for room.
    pub async fn publish(&self, event: Event) -> PublishOutcome {
        let kind = event.kind();
        let Some(cost) = self.cost_of(&event) else {
            return PublishOutcome::Dropped;
        };
        let permit = tokio::time::timeout(self.publish_timeout, self.budget.acquire_many(cost)).await;
        match permit {
            Ok(Ok(permit)) => {
                permit.forget();
                self.enqueue(event, cost)
            }
            Ok(Err(_)) => PublishOutcome::Dropped,
            Err(_) => {
                tracing::warn!(event = kind.name(), "event bus full, event dropped");
                PublishOutcome::Dropped
            }
        }
    }

    /// Enqueue without waiting. For producers that must not suspend.
    pub fn try_publish(&self, event: Event) -> PublishOutcome {
        let kind = event.kind();
        let Some(cost) = self.cost_of(&event) else {
            return PublishOutcome::Dropped;
        };
        match self.budget.try_acquire_many(cost) {
            Ok(permit) => {
                permit.forget();
                self.enqueue(event, cost)
            }
            Err(_) => {
                tracing::warn!(event = kind.name(), "event bus full, event dropped");
                PublishOutcome::Dropped
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn cost_of(&self, event: &Event) -> Option<u32> {
        let cost = event.encoded_len();
        if cost > self.capacity {
            tracing::warn!(
                event = event.kind().name(),
                bytes = cost,
                capacity = self.capacity,
                "event larger than bus capacity, dropped"
            );
            return None;
        }
        u32::try_from(cost).ok()
    }

    fn enqueue(&self, event: Event, cost: u32) -> PublishOutcome {
        match self.tx.send(Envelope { event, cost }) {
            Ok(()) => PublishOutcome::Delivered,
            Err(_) => {
                self.budget.add_permits(cost as usize);
                PublishOutcome::Dropped
            }
        }
    }
}

impl EventReceiver {
    /// Wait up to `timeout` for the next event; `None` when nothing arrived.
    pub async fn consume(&mut self, timeout: Duration) -> Option<Event> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(envelope)) => Some(self.release(envelope)),
            Ok(None) | Err(_) => None,
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_consume(&mut self) -> Option<Event> {
        self.rx.try_recv().ok().map(|envelope| self.release(envelope))
    }

    /// Bytes currently free in the budget.
    pub fn available_bytes(&self) -> usize {
        self.budget.available_permits()
    }

    fn release(&self, envelope: Envelope) -> Event {
        self.budget.add_permits(envelope.cost as usize);
        envelope.event
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.budget.close();
    }
}

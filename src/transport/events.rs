//! Typed event bus for transport observers.

use tokio::sync::broadcast;
use tracing::warn;

use super::state::ConnectionState;
use crate::notifications::NotificationRecord;

const DEFAULT_CAPACITY: usize = 256;

/// Something observers of the realtime channel may care about.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection moved to a new lifecycle state.
    ConnectionStateChanged(ConnectionState),
    /// A notification arrived over the live channel.
    NotificationPushed(NotificationRecord),
    /// Server-reported or socket-level error, for diagnostics only.
    TransportError(String),
}

/// Multi-consumer event fan-out.
///
/// Cloning the bus yields another publisher onto the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TransportEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver an event to every live subscription. Returns how many received it.
    pub fn publish(&self, event: TransportEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Register a new observer. Only events published afterwards are seen.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Handle to a registered observer. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<TransportEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Transport observer lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Transport observer lagged, skipped {} events", n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}
}

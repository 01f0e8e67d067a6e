//! Ties the realtime transport and the store to the authentication lifecycle.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fallback::FallbackArbiter;
use crate::notifications::NotificationStore;
use crate::transport::{ConnectionState, TransportManager};

/// What a token change means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Started,
    Ended,
    Rotated,
}

impl SessionChange {
    /// Classify a transition between two token values.
    pub fn between(previous: Option<&str>, next: Option<&str>) -> Option<Self> {
        match (previous, next) {
            (None, Some(_)) => Some(SessionChange::Started),
            (Some(_), None) => Some(SessionChange::Ended),
            (Some(a), Some(b)) if a != b => Some(SessionChange::Rotated),
            _ => None,
        }
    }
}

pub struct SessionBridge {
    transport: TransportManager,
    arbiter: Arc<FallbackArbiter>,
    store: Arc<NotificationStore>,
}

impl SessionBridge {
    pub fn new(
        transport: TransportManager,
        arbiter: Arc<FallbackArbiter>,
        store: Arc<NotificationStore>,
    ) -> Self {
        Self {
            transport,
            arbiter,
            store,
        }
    }

    /// Follow token changes until shutdown or until the token source goes away.
    pub async fn run(
        self,
        mut tokens: watch::Receiver<Option<String>>,
        shutdown: CancellationToken,
    ) {
        let mut current = tokens.borrow_and_update().clone();
        if current.is_some() {
            self.apply(SessionChange::Started).await;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = tokens.changed() => {
                    if changed.is_err() {
                        debug!("Token source dropped");
                        break;
                    }
                    let next = tokens.borrow_and_update().clone();
                    let change = SessionChange::between(current.as_deref(), next.as_deref());
                    if let Some(change) = change {
                        self.apply(change).await;
                    }
                    current = next;
                }
            }
        }
    }

    pub async fn apply(&self, change: SessionChange) {
        match change {
            SessionChange::Started => {
                info!("Session started, opening realtime channel");
                self.transport.connect().await;
                let store = self.store.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.refresh().await {
                        warn!("Initial notification load failed: {}", e);
                    }
                });
            }
            SessionChange::Ended => {
                info!("Session ended, dropping notifications");
                self.transport.disconnect().await;
                self.arbiter.reset().await;
                self.store.clear().await;
            }
            SessionChange::Rotated => {
                let status = self.transport.status();
                match status.state {
                    ConnectionState::Connected | ConnectionState::Connecting => {
                        info!("Token rotated while {}, reopening realtime channel", status.state);
                        self.transport.disconnect().await;
                        self.transport.connect().await;
                    }
                    _ if status.retry_pending => {
                        debug!("Token rotated, the pending retry uses the new token");
                    }
                    // Exhausted retries or a policy-violation close: only a
                    // new token gets the channel back.
                    state => {
                        info!("Token rotated while {}, retrying realtime channel", state);
                        self.transport.connect().await;
                    }
                }
            }
        }
    }
}

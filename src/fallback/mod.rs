//! Realtime/polling arbitration.
//!
//! Watches connection state changes and switches to REST polling of the
//! unread counter after enough consecutive transport errors. Polling stops as
//! soon as the realtime channel is connected again.

mod poller;

pub use poller::UnreadPoller;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::FallbackSettings;
use crate::metrics;
use crate::notifications::NotificationStore;
use crate::transport::{ConnectionState, Subscription, TransportEvent};

/// How the client currently learns about new notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Realtime,
    Polling,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Realtime => "realtime",
            TransportMode::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive-error bookkeeping. Pure, no timers.
#[derive(Debug)]
pub struct ModeTracker {
    threshold: u32,
    error_streak: u32,
    mode: TransportMode,
}

impl ModeTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            error_streak: 0,
            mode: TransportMode::Realtime,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn error_streak(&self) -> u32 {
        self.error_streak
    }

    /// Feed a connection state change. Returns the new mode if it changed.
    pub fn observe(&mut self, state: ConnectionState) -> Option<TransportMode> {
        match state {
            ConnectionState::Connected => {
                self.error_streak = 0;
                self.switch(TransportMode::Realtime)
            }
            ConnectionState::Error => {
                self.error_streak += 1;
                if self.error_streak >= self.threshold {
                    self.switch(TransportMode::Polling)
                } else {
                    None
                }
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => None,
        }
    }

    /// Forget the streak and return to realtime mode.
    pub fn reset(&mut self) -> Option<TransportMode> {
        self.error_streak = 0;
        self.switch(TransportMode::Realtime)
    }

    fn switch(&mut self, mode: TransportMode) -> Option<TransportMode> {
        if self.mode == mode {
            return None;
        }
        self.mode = mode;
        Some(mode)
    }
}

struct ArbiterState {
    tracker: ModeTracker,
    poller: UnreadPoller,
}

pub struct FallbackArbiter {
    state: Mutex<ArbiterState>,
    mode_tx: watch::Sender<TransportMode>,
    poll_interval: Duration,
}

impl FallbackArbiter {
    pub fn new(store: Arc<NotificationStore>, settings: &FallbackSettings) -> Self {
        let poll_interval = Duration::from_secs(settings.poll_interval_secs);
        let (mode_tx, _) = watch::channel(TransportMode::Realtime);
        Self {
            state: Mutex::new(ArbiterState {
                tracker: ModeTracker::new(settings.failure_threshold),
                poller: UnreadPoller::new(store, poll_interval),
            }),
            mode_tx,
            poll_interval,
        }
    }

    pub fn mode(&self) -> TransportMode {
        *self.mode_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportMode> {
        self.mode_tx.subscribe()
    }

    pub async fn is_polling(&self) -> bool {
        self.state.lock().await.poller.is_running()
    }

    /// React to a connection state change.
    pub async fn observe(&self, state: ConnectionState) {
        let mut inner = self.state.lock().await;
        if let Some(mode) = inner.tracker.observe(state) {
            self.enter(&mut inner, mode);
        } else {
            debug!(
                "Connection {} (error streak {})",
                state,
                inner.tracker.error_streak()
            );
        }
    }

    /// Stop polling and forget the error streak. Used when the session ends.
    pub async fn reset(&self) {
        let mut inner = self.state.lock().await;
        inner.poller.stop();
        if let Some(mode) = inner.tracker.reset() {
            metrics::set_transport_mode(mode);
            self.mode_tx.send_replace(mode);
        }
    }

    /// Consume transport events until shutdown.
    pub async fn run(self: Arc<Self>, mut events: Subscription, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(TransportEvent::ConnectionStateChanged(state)) => {
                        self.observe(state).await
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
        self.state.lock().await.poller.stop();
        debug!("Fallback arbiter stopped");
    }

    fn enter(&self, inner: &mut ArbiterState, mode: TransportMode) {
        match mode {
            TransportMode::Polling => {
                info!(
                    "Realtime unavailable after {} errors, polling every {:?}",
                    inner.tracker.error_streak(),
                    self.poll_interval
                );
                inner.poller.start();
            }
            TransportMode::Realtime => {
                info!("Realtime channel restored, polling stopped");
                inner.poller.stop();
            }
        }
        metrics::set_transport_mode(mode);
        self.mode_tx.send_replace(mode);
    }
}

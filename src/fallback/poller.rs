//! Periodic unread-count refresh used while the realtime channel is down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics;
use crate::notifications::NotificationStore;

struct RunningPoll {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start/stop control over a single polling loop.
pub struct UnreadPoller {
    store: Arc<NotificationStore>,
    interval: Duration,
    running: Option<RunningPoll>,
}

impl UnreadPoller {
    pub fn new(store: Arc<NotificationStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            running: None,
        }
    }

    /// Start polling. The first fetch happens immediately.
    ///
    /// Returns false if a loop is already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.store.clone(),
            self.interval,
            cancel.clone(),
        ));
        self.running = Some(RunningPoll { cancel, handle });
        true
    }

    /// Stop polling. Returns false if nothing was running.
    pub fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for UnreadPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(store: Arc<NotificationStore>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = store.load_unread_count() => match result {
                Ok(count) => {
                    debug!("Polled unread count: {}", count);
                    metrics::record_poll(true);
                }
                Err(e) => {
                    warn!("Unread count poll failed: {}", e);
                    metrics::record_poll(false);
                }
            }
        }
    }
    debug!("Unread count polling stopped");
}

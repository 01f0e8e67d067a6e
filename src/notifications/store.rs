//! In-memory notification store.
//!
//! Single source of truth for the notification list and the unread counter.
//! Every REST-backed mutation calls the server first and only then applies a
//! delta to the *current* local state, so operations that interleave across
//! the await compose instead of overwriting each other.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::api::{ApiError, NotificationApi};
use super::models::{NotificationId, NotificationRecord};
use crate::clock::Clock;
use crate::metrics;

/// Read-only view of the store published to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSnapshot {
    /// Newest first.
    pub records: Vec<NotificationRecord>,
    pub unread_count: u64,
}

struct StoreState {
    records: Vec<NotificationRecord>,
    unread_count: u64,
    /// Bumped on every clear so completions from a previous session are dropped.
    generation: u64,
}

impl StoreState {
    fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            records: self.records.clone(),
            unread_count: self.unread_count,
        }
    }

    fn position(&self, id: NotificationId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    fn count_unread(&self) -> u64 {
        self.records.iter().filter(|r| r.is_unread()).count() as u64
    }
}

pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    clock: Arc<dyn Clock>,
    page_size: u32,
    state: Mutex<StoreState>,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>, clock: Arc<dyn Clock>, page_size: u32) -> Self {
        let (snapshot_tx, _) = watch::channel(NotificationSnapshot::default());
        Self {
            api,
            clock,
            page_size,
            state: Mutex::new(StoreState {
                records: Vec::new(),
                unread_count: 0,
                generation: 0,
            }),
            snapshot_tx,
        }
    }

    /// Subscribe to store changes.
    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn snapshot(&self) -> NotificationSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn unread_count(&self) -> u64 {
        self.state.lock().await.unread_count
    }

    fn publish(&self, state: &StoreState) {
        metrics::set_unread_count(state.unread_count);
        self.snapshot_tx.send_replace(state.snapshot());
    }

    async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Add a record pushed by the realtime transport.
    ///
    /// A record whose id is already present replaces the older entry; its
    /// unread contribution is swapped, never added twice.
    pub async fn ingest_push(&self, record: NotificationRecord) {
        let mut state = self.state.lock().await;

        if let Some(pos) = state.position(record.id) {
            let previous = state.records.remove(pos);
            debug!("Replacing duplicate notification {}", previous.id);
            if previous.is_unread() {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
        }

        if record.is_unread() {
            state.unread_count += 1;
        }
        state.records.insert(0, record);

        metrics::record_ingested_notification();
        self.publish(&state);
    }

    /// Replace the local list with the first page from the server.
    ///
    /// The unread counter is left untouched; see [`Self::refresh`] for the
    /// combined fetch.
    pub async fn load_all(&self) -> Result<(), ApiError> {
        let generation = self.generation().await;
        let page = self.api.list(1, self.page_size).await?;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("Discarding notification list fetched for a previous session");
            return Ok(());
        }
        state.records = page.notifications;
        self.publish(&state);
        Ok(())
    }

    /// Fetch the unread counter from the server.
    pub async fn load_unread_count(&self) -> Result<u64, ApiError> {
        let generation = self.generation().await;
        let count = self.api.unread_count().await?;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("Discarding unread count fetched for a previous session");
            return Ok(state.unread_count);
        }
        state.unread_count = count;
        self.publish(&state);
        Ok(count)
    }

    /// Fetch list and unread count together.
    ///
    /// When the listing is known to cover the whole set the counter is
    /// inferred from the loaded records, otherwise the server counter is
    /// authoritative.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let generation = self.generation().await;
        let (page, count) = tokio::join!(self.api.list(1, self.page_size), self.api.unread_count());
        let page = page?;
        let count = count?;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("Discarding refresh fetched for a previous session");
            return Ok(());
        }

        let loaded = page.notifications.len() as u64;
        let complete = matches!(page.total, Some(total) if total <= loaded);
        state.records = page.notifications;
        state.unread_count = if complete {
            state.count_unread()
        } else {
            count
        };

        info!(
            "Loaded {} notifications ({} unread)",
            state.records.len(),
            state.unread_count
        );
        self.publish(&state);
        Ok(())
    }

    /// Mark one notification as read.
    ///
    /// The server is called first; on failure local state is unchanged and the
    /// error is returned. A record that is already read, or no longer present,
    /// does not move the counter.
    pub async fn mark_read(&self, id: NotificationId) -> Result<(), ApiError> {
        let generation = self.generation().await;
        self.api.mark_read(id).await?;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Ok(());
        }

        let now = self.clock.now();
        let mut was_unread = false;
        if let Some(record) = state.records.iter_mut().find(|r| r.id == id) {
            if record.is_unread() {
                was_unread = true;
                record.read = true;
                record.read_at = Some(now);
            }
        }
        if was_unread {
            state.unread_count = state.unread_count.saturating_sub(1);
        }

        self.publish(&state);
        Ok(())
    }

    /// Mark every notification as read with one shared timestamp.
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        let generation = self.generation().await;
        self.api.mark_all_read().await?;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Ok(());
        }

        let now = self.clock.now();
        for record in state.records.iter_mut() {
            record.read = true;
            record.read_at = Some(now);
        }
        state.unread_count = 0;

        self.publish(&state);
        Ok(())
    }

    /// Delete one notification.
    ///
    /// A 404 from the server means the record is already gone and is treated
    /// as success.
    pub async fn delete(&self, id: NotificationId) -> Result<(), ApiError> {
        let generation = self.generation().await;
        match self.api.delete(id).await {
            Ok(()) => {}
            Err(ApiError::Status { status: 404, .. }) => {
                debug!("Notification {} already deleted on the server", id);
            }
            Err(e) => return Err(e),
        }

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Ok(());
        }

        if let Some(pos) = state.position(id) {
            let removed = state.records.remove(pos);
            if removed.is_unread() {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
            self.publish(&state);
        }
        Ok(())
    }

    /// Drop all records, used when the session ends.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.records.clear();
        state.unread_count = 0;
        self.publish(&state);
    }
}

//! Composition root.
//!
//! Wires the event bus, transport, fallback arbiter, store and session bridge
//! together and owns their background tasks.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::fallback::{FallbackArbiter, TransportMode};
use crate::notifications::{HttpNotificationApi, NotificationApi, NotificationStore};
use crate::session::{CredentialsProvider, SessionBridge};
use crate::transport::{
    ConnectionState, ConnectionTarget, Connector, EventBus, Subscription, TransportEvent,
    TransportManager, TransportSettings, TransportStatus, WsConnector,
};

/// Combined view for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    pub connection: ConnectionState,
    pub mode: TransportMode,
}

/// External capabilities the client is built from.
pub struct Collaborators {
    pub api: Arc<dyn NotificationApi>,
    pub connector: Arc<dyn Connector>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Production wiring: reqwest for REST, tokio-tungstenite for the socket.
    pub fn http(config: &AppConfig, credentials: Arc<dyn CredentialsProvider>) -> Self {
        let api = HttpNotificationApi::new(
            config.api_base_url.clone(),
            config.request_timeout_sec,
            credentials.clone(),
        );
        Self {
            api: Arc::new(api),
            connector: Arc::new(WsConnector::new()),
            credentials,
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct NotificationClient {
    transport: TransportManager,
    store: Arc<NotificationStore>,
    arbiter: Arc<FallbackArbiter>,
    status: watch::Receiver<ClientStatus>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NotificationClient {
    /// Build every component and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime. If the credentials already
    /// hold a token the realtime channel is opened right away.
    pub fn start(config: &AppConfig, parts: Collaborators) -> Result<Self> {
        let target = ConnectionTarget::from_base_url(&config.api_base_url, &config.ws_path)?;
        let shutdown = CancellationToken::new();
        let bus = EventBus::default();

        let store = Arc::new(NotificationStore::new(
            parts.api,
            parts.clock,
            config.page_size,
        ));
        let arbiter = Arc::new(FallbackArbiter::new(store.clone(), &config.fallback));

        // Subscribe before the transport exists so no early event is missed.
        let ingest_events = bus.subscribe();
        let arbiter_events = bus.subscribe();

        let (transport, transport_task) = TransportManager::spawn(
            parts.connector,
            parts.credentials.clone(),
            target,
            TransportSettings::new(&config.realtime),
            bus,
            shutdown.clone(),
        );

        let (status_tx, status) = watch::channel(ClientStatus {
            connection: transport.state(),
            mode: arbiter.mode(),
        });

        let bridge = SessionBridge::new(transport.clone(), arbiter.clone(), store.clone());
        let tasks = vec![
            transport_task,
            tokio::spawn(ingest_pushes(
                store.clone(),
                ingest_events,
                shutdown.clone(),
            )),
            tokio::spawn(arbiter.clone().run(arbiter_events, shutdown.clone())),
            tokio::spawn(track_status(
                transport.watch_status(),
                arbiter.subscribe(),
                status_tx,
                shutdown.clone(),
            )),
            tokio::spawn(bridge.run(parts.credentials.subscribe(), shutdown.clone())),
        ];

        info!("Notification client started for {}", config.api_base_url);
        Ok(Self {
            transport,
            store,
            arbiter,
            status,
            shutdown,
            tasks,
        })
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn transport(&self) -> &TransportManager {
        &self.transport
    }

    pub fn mode(&self) -> TransportMode {
        self.arbiter.mode()
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }

    /// Raw transport events, including pushed notifications and server errors.
    pub fn subscribe(&self) -> Subscription {
        self.transport.subscribe()
    }

    /// Stop every background task and close the channel.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                debug!("Background task ended abnormally: {}", e);
            }
        }
        info!("Notification client stopped");
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn ingest_pushes(
    store: Arc<NotificationStore>,
    mut events: Subscription,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(TransportEvent::NotificationPushed(record)) => store.ingest_push(record).await,
                Some(_) => {}
                None => break,
            }
        }
    }
}

async fn track_status(
    mut transport: watch::Receiver<TransportStatus>,
    mut mode: watch::Receiver<TransportMode>,
    status_tx: watch::Sender<ClientStatus>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = transport.changed() => if changed.is_err() { break },
            changed = mode.changed() => if changed.is_err() { break },
        }
        let next = ClientStatus {
            connection: transport.borrow_and_update().state,
            mode: *mode.borrow_and_update(),
        };
        status_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

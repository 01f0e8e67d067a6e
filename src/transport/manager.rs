//! Realtime channel owner.
//!
//! A single driver task owns the socket, the retry timer and the heartbeat
//! timer, and feeds everything through [`TransportMachine`]. The cloneable
//! [`TransportManager`] handle talks to it over a command channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::connector::{
    ConnectError, ConnectionTarget, Connector, OutboundFrame, SocketChannel, SocketEvent,
};
use super::events::{EventBus, Subscription, TransportEvent};
use super::frames::{InboundFrame, NORMAL_CLOSURE, PING_FRAME, PONG_FRAME, POLICY_VIOLATION};
use super::state::{Action, ConnectionState, MachineEvent, ReconnectState, TransportMachine};
use crate::config::RealtimeSettings;
use crate::metrics;
use crate::session::CredentialsProvider;

/// Tuning for the transport driver.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub backoff: BackoffPolicy,
    pub heartbeat_interval: Duration,
}

impl TransportSettings {
    pub fn new(settings: &RealtimeSettings) -> Self {
        Self {
            backoff: BackoffPolicy::new(settings),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportStatus {
    pub state: ConnectionState,
    pub reconnect: ReconnectState,
    pub retry_pending: bool,
}

enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Send {
        text: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the realtime channel.
#[derive(Clone)]
pub struct TransportManager {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
    status: watch::Receiver<TransportStatus>,
}

impl TransportManager {
    /// Start the driver task. It runs until `shutdown` fires or every handle is dropped.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialsProvider>,
        target: ConnectionTarget,
        settings: TransportSettings,
        bus: EventBus,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let machine = TransportMachine::new(settings.backoff.clone());
        let (status_tx, status_rx) = watch::channel(TransportStatus {
            state: machine.state(),
            reconnect: machine.reconnect_state(),
            retry_pending: false,
        });
        let (command_tx, command_rx) = mpsc::channel(32);

        let driver = Driver {
            machine,
            connector,
            credentials,
            target,
            heartbeat_interval: settings.heartbeat_interval,
            bus: bus.clone(),
            status_tx,
            commands: command_rx,
            socket: None,
            pending_open: None,
            retry_at: None,
            heartbeat: None,
            shutdown,
        };
        let handle = tokio::spawn(driver.run());

        (
            Self {
                commands: command_tx,
                bus,
                status: status_rx,
            },
            handle,
        )
    }

    /// Ask for a connection. No-op while connecting or connected.
    ///
    /// Also the only way out of the error state once retries are used up.
    pub async fn connect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Connect(tx)).await.is_err() {
            debug!("Transport stopped, ignoring connect");
            return;
        }
        let _ = rx.await;
    }

    /// Close the channel and stop any reconnection.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect(tx)).await.is_err() {
            debug!("Transport stopped, ignoring disconnect");
            return;
        }
        let _ = rx.await;
    }

    /// Queue a text frame. Returns false unless the channel is connected.
    pub async fn send(&self, text: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        let command = Command::Send {
            text: text.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.status.borrow().reconnect
    }

    pub fn status(&self) -> TransportStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<TransportStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }
}

struct Driver {
    machine: TransportMachine,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialsProvider>,
    target: ConnectionTarget,
    heartbeat_interval: Duration,
    bus: EventBus,
    status_tx: watch::Sender<TransportStatus>,
    commands: mpsc::Receiver<Command>,
    socket: Option<SocketChannel>,
    pending_open: Option<JoinHandle<Result<SocketChannel, ConnectError>>>,
    retry_at: Option<Instant>,
    heartbeat: Option<Interval>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Transport shutting down");
                    self.apply(MachineEvent::DisconnectRequested);
                    break;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("All transport handles dropped");
                            self.apply(MachineEvent::DisconnectRequested);
                            break;
                        }
                    }
                }
                result = wait_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_open_result(result);
                }
                event = recv_socket(&mut self.socket) => {
                    self.on_socket_event(event);
                }
                _ = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.apply(MachineEvent::RetryElapsed);
                }
                _ = tick(&mut self.heartbeat) => {
                    if !self.send_text(PING_FRAME) {
                        debug!("Heartbeat skipped, channel not writable");
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(ack) => {
                self.apply(MachineEvent::ConnectRequested);
                let _ = ack.send(());
            }
            Command::Disconnect(ack) => {
                self.apply(MachineEvent::DisconnectRequested);
                let _ = ack.send(());
            }
            Command::Send { text, reply } => {
                let _ = reply.send(self.send_text(&text));
            }
        }
    }

    fn apply(&mut self, event: MachineEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(action) {
                    queue.push_back(follow_up);
                }
            }
        }
        self.publish_status();
    }

    fn execute(&mut self, action: Action) -> Option<MachineEvent> {
        match action {
            Action::Open => return self.open(),
            Action::StartHeartbeat => {
                let mut heartbeat = interval_at(
                    Instant::now() + self.heartbeat_interval,
                    self.heartbeat_interval,
                );
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(heartbeat);
            }
            Action::StopHeartbeat => self.heartbeat = None,
            Action::ScheduleRetry(delay) => {
                info!("Reconnecting in {:?}", delay);
                metrics::record_reconnect_scheduled(delay);
                self.retry_at = Some(Instant::now() + delay);
            }
            Action::CancelRetry => self.retry_at = None,
            Action::Close(code) => {
                if let Some(pending) = self.pending_open.take() {
                    pending.abort();
                }
                if let Some(socket) = self.socket.take() {
                    if socket.outgoing.try_send(OutboundFrame::Close(code)).is_err() {
                        debug!("Socket already gone while closing");
                    }
                }
            }
            Action::Publish(state) => {
                info!("Realtime connection {}", state);
                metrics::set_connection_state(state);
                self.publish_status();
                self.bus
                    .publish(TransportEvent::ConnectionStateChanged(state));
            }
        }
        None
    }

    fn open(&mut self) -> Option<MachineEvent> {
        metrics::record_connection_attempt();
        if let Some(previous) = self.pending_open.take() {
            previous.abort();
        }
        self.socket = None;

        // Read at every attempt so rotated tokens are picked up.
        let Some(token) = self.credentials.current_token() else {
            warn!("Cannot open realtime channel: {}", ConnectError::MissingToken);
            self.bus.publish(TransportEvent::TransportError(
                ConnectError::MissingToken.to_string(),
            ));
            return Some(MachineEvent::Failed { terminal: true });
        };

        let url = self.target.with_token(&token);
        let connector = self.connector.clone();
        self.pending_open = Some(tokio::spawn(async move { connector.open(&url).await }));
        None
    }

    fn on_open_result(&mut self, result: Result<SocketChannel, ConnectError>) {
        match result {
            Ok(channel) => {
                self.socket = Some(channel);
                self.apply(MachineEvent::Opened);
            }
            Err(e) => {
                warn!("Realtime connection attempt failed: {}", e);
                self.bus.publish(TransportEvent::TransportError(e.to_string()));
                self.apply(MachineEvent::Failed {
                    terminal: e.is_terminal(),
                });
            }
        }
    }

    fn on_socket_event(&mut self, event: Option<SocketEvent>) {
        match event {
            Some(SocketEvent::Text(text)) => self.on_frame(&text),
            Some(SocketEvent::Closed { code, reason }) => {
                self.socket = None;
                info!("Realtime channel closed (code {:?}, reason {:?})", code, reason);
                if code == Some(POLICY_VIOLATION) {
                    self.bus.publish(TransportEvent::TransportError(
                        "Server rejected credentials".to_string(),
                    ));
                }
                self.apply(MachineEvent::Closed { code });
            }
            Some(SocketEvent::Failed(message)) => {
                self.socket = None;
                self.bus.publish(TransportEvent::TransportError(message));
                self.apply(MachineEvent::Failed { terminal: false });
            }
            None => {
                self.socket = None;
                self.apply(MachineEvent::Closed { code: None });
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_dropped_frame();
                warn!("Dropping unparseable frame: {} - {}", e, text);
                return;
            }
        };
        metrics::record_frame(frame.frame_type());

        match frame {
            InboundFrame::Connected { .. } => debug!("Server acknowledged realtime channel"),
            InboundFrame::Notification { data } => {
                debug!("Received notification {}", data.id);
                self.bus.publish(TransportEvent::NotificationPushed(data));
            }
            InboundFrame::Ping => {
                self.send_text(PONG_FRAME);
            }
            InboundFrame::Pong => debug!("Heartbeat acknowledged"),
            InboundFrame::Error { message } => {
                warn!("Server reported error: {}", message);
                self.bus.publish(TransportEvent::TransportError(message));
            }
        }
    }

    fn send_text(&mut self, text: &str) -> bool {
        if self.machine.state() != ConnectionState::Connected {
            return false;
        }
        let Some(socket) = &self.socket else {
            return false;
        };
        match socket.outgoing.try_send(OutboundFrame::Text(text.to_string())) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping outbound frame: {}", e);
                false
            }
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(TransportStatus {
            state: self.machine.state(),
            reconnect: self.machine.reconnect_state(),
            retry_pending: self.machine.retry_pending(),
        });
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_open.take() {
            pending.abort();
        }
        if let Some(socket) = self.socket.take() {
            let _ = socket.outgoing.try_send(OutboundFrame::Close(NORMAL_CLOSURE));
        }
    }
}

async fn wait_open(
    pending: &mut Option<JoinHandle<Result<SocketChannel, ConnectError>>>,
) -> Result<SocketChannel, ConnectError> {
    match pending {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(ConnectError::Failed(e.to_string())),
        },
        None => std::future::pending().await,
    }
}

async fn recv_socket(socket: &mut Option<SocketChannel>) -> Option<SocketEvent> {
    match socket {
        Some(socket) => socket.incoming.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.tick().await;
        }
        None => std::future::pending().await,
    }
}

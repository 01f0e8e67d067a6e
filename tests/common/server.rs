//! Test server lifecycle management
//!
//! Spawns an in-process dashboard stand-in: the notification REST endpoints
//! plus the realtime WebSocket route. Each test gets an isolated server with
//! its own fixture notifications.

use super::constants::*;
use super::fixtures::fixture_notifications;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use chrono::Utc;
use dashboard_notifications::NotificationRecord;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Instruction for every open socket
#[derive(Debug, Clone)]
enum SocketCommand {
    Text(String),
    Close(u16),
    Drop,
}

struct ServerState {
    notifications: Mutex<Vec<NotificationRecord>>,
    valid_tokens: Mutex<HashSet<String>>,
    accept_upgrades: AtomicBool,
    sockets: Mutex<Vec<mpsc::UnboundedSender<SocketCommand>>>,
    upgrade_tokens: Mutex<Vec<String>>,
    received_frames: Mutex<Vec<String>>,
    unread_requests: AtomicUsize,
}

type SharedState = Arc<ServerState>;

/// Test server instance with isolated notification data
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    state: SharedState,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if port binding fails or the server doesn't become ready within timeout
    pub async fn spawn() -> Self {
        let state = Arc::new(ServerState {
            notifications: Mutex::new(fixture_notifications()),
            valid_tokens: Mutex::new(HashSet::from([TEST_TOKEN.to_string()])),
            accept_upgrades: AtomicBool::new(true),
            sockets: Mutex::new(Vec::new()),
            upgrade_tokens: Mutex::new(Vec::new()),
            received_frames: Mutex::new(Vec::new()),
            unread_requests: AtomicUsize::new(0),
        });

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = make_app(state.clone());

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            state,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Store a notification and push it to every open socket.
    pub fn push_notification(&self, record: NotificationRecord) {
        let frame = json!({ "type": "notification", "data": record }).to_string();
        self.state.notifications.lock().unwrap().insert(0, record);
        self.broadcast(SocketCommand::Text(frame));
    }

    /// Store a notification without pushing it.
    pub fn insert_silently(&self, record: NotificationRecord) {
        self.state.notifications.lock().unwrap().insert(0, record);
    }

    /// Send an arbitrary text frame to every open socket.
    pub fn send_raw(&self, text: &str) {
        self.broadcast(SocketCommand::Text(text.to_string()));
    }

    /// Close every open socket with the given close code.
    pub fn close_all(&self, code: u16) {
        self.broadcast(SocketCommand::Close(code));
    }

    /// Drop every open socket without a closing handshake.
    pub fn drop_all(&self) {
        self.broadcast(SocketCommand::Drop);
    }

    /// Make WebSocket upgrades fail with 503 (non-terminal for the client).
    pub fn set_accept_upgrades(&self, accept: bool) {
        self.state.accept_upgrades.store(accept, Ordering::SeqCst);
    }

    pub fn add_token(&self, token: &str) {
        self.state.valid_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Tokens of every successful WebSocket upgrade, in order.
    pub fn upgrade_tokens(&self) -> Vec<String> {
        self.state.upgrade_tokens.lock().unwrap().clone()
    }

    /// Text frames the server received from clients.
    pub fn received_frames(&self) -> Vec<String> {
        self.state.received_frames.lock().unwrap().clone()
    }

    /// How many times the unread-count endpoint was hit.
    pub fn unread_requests(&self) -> usize {
        self.state.unread_requests.load(Ordering::SeqCst)
    }

    pub fn live_sockets(&self) -> usize {
        let mut sockets = self.state.sockets.lock().unwrap();
        sockets.retain(|tx| !tx.is_closed());
        sockets.len()
    }

    /// Wait until exactly `count` sockets are registered.
    ///
    /// A client reports `Connected` as soon as its handshake completes, which
    /// can be slightly before the server side starts listening for commands.
    pub async fn wait_for_sockets(&self, count: usize) {
        let start = std::time::Instant::now();
        while self.live_sockets() != count {
            if start.elapsed() > Duration::from_millis(WAIT_TIMEOUT_MS) {
                panic!(
                    "Expected {} live sockets, found {}",
                    count,
                    self.live_sockets()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn notification(&self, id: i64) -> Option<NotificationRecord> {
        self.state
            .notifications
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn server_unread(&self) -> u64 {
        self.state
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| !n.read)
            .count() as u64
    }

    fn broadcast(&self, command: SocketCommand) {
        self.state
            .sockets
            .lock()
            .unwrap()
            .retain(|tx| tx.send(command.clone()).is_ok());
    }

    /// Waits for the server to become ready by polling the /health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.drop_all();
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn make_app(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/{id}/read", put(mark_read))
        .route("/api/notifications/{id}", delete(delete_notification))
        .route("/ws/notifications", get(ws_handler))
        .with_state(state)
}

fn authorize(state: &ServerState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if state.valid_tokens.lock().unwrap().contains(token) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_notifications(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).max(1);

    let all = state.notifications.lock().unwrap();
    let items: Vec<&NotificationRecord> = all
        .iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    Ok(Json(json!({
        "notifications": items,
        "total": all.len(),
        "page": page,
        "limit": limit,
    })))
}

async fn unread_count(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    state.unread_requests.fetch_add(1, Ordering::SeqCst);
    let count = state
        .notifications
        .lock()
        .unwrap()
        .iter()
        .filter(|n| !n.read)
        .count();
    Ok(Json(json!({ "count": count })))
}

async fn mark_read(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> StatusCode {
    if let Err(status) = authorize(&state, &headers) {
        return status;
    }
    let mut all = state.notifications.lock().unwrap();
    match all.iter_mut().find(|n| n.id == id) {
        Some(record) => {
            if !record.read {
                record.read = true;
                record.read_at = Some(Utc::now());
            }
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn mark_all_read(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if let Err(status) = authorize(&state, &headers) {
        return status;
    }
    let now = Utc::now();
    for record in state.notifications.lock().unwrap().iter_mut() {
        if !record.read {
            record.read = true;
            record.read_at = Some(now);
        }
    }
    StatusCode::NO_CONTENT
}

async fn delete_notification(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> StatusCode {
    if let Err(status) = authorize(&state, &headers) {
        return status;
    }
    let mut all = state.notifications.lock().unwrap();
    let before = all.len();
    all.retain(|n| n.id != id);
    if all.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
) -> Response {
    if !state.accept_upgrades.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let token = params.token.unwrap_or_default();
    if !state.valid_tokens.lock().unwrap().contains(&token) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.upgrade_tokens.lock().unwrap().push(token);

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.sockets.lock().unwrap().push(tx);
    let (mut sink, mut stream) = socket.split();

    let connected = json!({ "type": "connected", "message": "ready" }).to_string();
    if sink.send(Message::Text(connected.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(SocketCommand::Text(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(SocketCommand::Close(code)) => {
                    let frame = CloseFrame { code, reason: "closing".into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                Some(SocketCommand::Drop) | None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_string();
                    state.received_frames.lock().unwrap().push(text.clone());
                    if text == "ping" {
                        let pong = json!({ "type": "pong" }).to_string();
                        if sink.send(Message::Text(pong.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

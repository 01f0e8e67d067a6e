//! Socket opening and the per-connection pump task.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::frames::NORMAL_CLOSURE;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectError {
    #[error("No bearer token available")]
    MissingToken,

    #[error("Handshake rejected with status {0}")]
    Rejected(u16),

    #[error("WebSocket connection failed: {0}")]
    Failed(String),
}

impl ConnectError {
    /// Terminal errors must not be retried automatically.
    pub fn is_terminal(&self) -> bool {
        match self {
            ConnectError::MissingToken => true,
            ConnectError::Rejected(status) => *status == 401 || *status == 403,
            ConnectError::Failed(_) => false,
        }
    }
}

/// Event reported by an open socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Failed(String),
}

/// Frame queued for the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Close(u16),
}

/// Both directions of an open socket.
pub struct SocketChannel {
    pub outgoing: mpsc::Sender<OutboundFrame>,
    pub incoming: mpsc::Receiver<SocketEvent>,
}

impl SocketChannel {
    /// Create a channel pair. The second half is what the socket side holds.
    pub fn pair() -> (
        SocketChannel,
        (mpsc::Receiver<OutboundFrame>, mpsc::Sender<SocketEvent>),
    ) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            SocketChannel {
                outgoing: out_tx,
                incoming: in_rx,
            },
            (out_rx, in_tx),
        )
    }
}

/// Opens realtime sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, target: &str) -> Result<SocketChannel, ConnectError>;
}

/// Where the realtime endpoint lives, minus the credential.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTarget {
    ws_base: String,
    path: String,
}

impl ConnectionTarget {
    /// Derive the socket endpoint from the REST base URL.
    ///
    /// `http` becomes `ws` and `https` becomes `wss`.
    pub fn from_base_url(base_url: &str, path: &str) -> anyhow::Result<Self> {
        let base = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            anyhow::bail!("Unsupported URL scheme in {}", base_url);
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Ok(Self { ws_base, path })
    }

    /// Full URL carrying the token in the query string.
    pub fn with_token(&self, token: &str) -> String {
        format!(
            "{}{}?token={}",
            self.ws_base,
            self.path,
            urlencoding::encode(token)
        )
    }
}

/// Opens sockets with tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, target: &str) -> Result<SocketChannel, ConnectError> {
        let (ws_stream, _) = connect_async(target).await.map_err(|e| match e {
            tungstenite::Error::Http(response) => {
                ConnectError::Rejected(response.status().as_u16())
            }
            other => ConnectError::Failed(other.to_string()),
        })?;
        debug!("WebSocket handshake complete");

        let (channel, (outgoing, incoming)) = SocketChannel::pair();
        tokio::spawn(pump(ws_stream, outgoing, incoming));
        Ok(channel)
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Shuttles frames between the socket and the channel until either side ends.
async fn pump(
    ws_stream: WsStream,
    mut outgoing: mpsc::Receiver<OutboundFrame>,
    incoming: mpsc::Sender<SocketEvent>,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                match frame {
                    Some(OutboundFrame::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            error!("Failed to send frame: {}", e);
                            let _ = incoming.send(SocketEvent::Failed(e.to_string())).await;
                            break;
                        }
                    }
                    Some(OutboundFrame::Close(code)) => {
                        close(&mut write, code).await;
                        break;
                    }
                    None => {
                        close(&mut write, NORMAL_CLOSURE).await;
                        break;
                    }
                }
            }
            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => SocketEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => {
                                (Some(u16::from(frame.code)), frame.reason.as_str().to_owned())
                            }
                            None => (None, String::new()),
                        };
                        info!("WebSocket closed by server (code {:?})", code);
                        let _ = incoming.send(SocketEvent::Closed { code, reason }).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        let _ = incoming.send(SocketEvent::Failed(e.to_string())).await;
                        break;
                    }
                    None => {
                        let closed = SocketEvent::Closed {
                            code: None,
                            reason: String::new(),
                        };
                        let _ = incoming.send(closed).await;
                        break;
                    }
                };
                if incoming.send(event).await.is_err() {
                    debug!("Socket owner went away, closing");
                    close(&mut write, NORMAL_CLOSURE).await;
                    break;
                }
            }
        }
    }
}

async fn close<S>(write: &mut S, code: u16)
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: String::new().into(),
    };
    if let Err(e) = write.send(Message::Close(Some(frame))).await {
        debug!("Close frame not delivered: {}", e);
    }
}

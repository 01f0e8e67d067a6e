//! In-memory connector for driving the transport in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::connector::{ConnectError, Connector, OutboundFrame, SocketChannel, SocketEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accept,
    Refuse,
    Reject(u16),
    /// The open never completes.
    Stall,
}

/// Server side of an accepted fake socket.
pub struct FakePeer {
    pub outgoing: mpsc::Receiver<OutboundFrame>,
    pub incoming: mpsc::Sender<SocketEvent>,
}

impl FakePeer {
    pub async fn push_text(&self, text: impl Into<String>) {
        let _ = self.incoming.send(SocketEvent::Text(text.into())).await;
    }

    pub async fn close(&self, code: u16) {
        let _ = self
            .incoming
            .send(SocketEvent::Closed {
                code: Some(code),
                reason: String::new(),
            })
            .await;
    }

    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.outgoing.recv().await
    }
}

pub struct FakeConnector {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    attempts: Mutex<Vec<(String, Instant)>>,
    peers: mpsc::UnboundedSender<FakePeer>,
}

impl FakeConnector {
    /// Every open follows `fallback` once the scripted outcomes run out.
    pub fn new(fallback: Outcome) -> (Self, mpsc::UnboundedReceiver<FakePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback,
                attempts: Mutex::new(Vec::new()),
                peers,
            },
            rx,
        )
    }

    pub fn script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, target: &str) -> Result<SocketChannel, ConnectError> {
        self.attempts
            .lock()
            .unwrap()
            .push((target.to_string(), Instant::now()));
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match outcome {
            Outcome::Accept => {
                let (channel, (outgoing, incoming)) = SocketChannel::pair();
                let _ = self.peers.send(FakePeer { outgoing, incoming });
                Ok(channel)
            }
            Outcome::Refuse => Err(ConnectError::Failed("connection refused".to_string())),
            Outcome::Reject(status) => Err(ConnectError::Rejected(status)),
            Outcome::Stall => std::future::pending().await,
        }
    }
}

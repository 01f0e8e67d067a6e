//! Realtime frame types.
//!
//! Inbound frames are JSON objects discriminated by a `type` field. The client
//! only ever sends the bare strings `"ping"` and `"pong"`.

use serde::{Deserialize, Serialize};

use crate::notifications::NotificationRecord;

/// Reserved frame type constants.
pub mod frame_types {
    /// Sent by server once the channel is ready.
    pub const CONNECTED: &str = "connected";
    /// A new notification for the user.
    pub const NOTIFICATION: &str = "notification";
    /// Server keepalive, must be answered with `pong`.
    pub const PING: &str = "ping";
    /// Answer to our own heartbeat ping.
    pub const PONG: &str = "pong";
    /// Server-side error report.
    pub const ERROR: &str = "error";
}

/// Heartbeat ping sent by the client.
pub const PING_FRAME: &str = "ping";
/// Reply to a server keepalive.
pub const PONG_FRAME: &str = "pong";

/// Close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code the server uses to reject our credentials.
pub const POLICY_VIOLATION: u16 = 1008;

/// Server -> client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Notification {
        data: NotificationRecord,
    },
    Ping,
    Pong,
    Error {
        #[serde(default)]
        message: String,
    },
}

impl InboundFrame {
    /// Parse a text frame.
    ///
    /// Bare `ping`/`pong` strings are accepted as well as their JSON form.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match text.trim() {
            frame_types::PING => Ok(InboundFrame::Ping),
            frame_types::PONG => Ok(InboundFrame::Pong),
            other => serde_json::from_str(other),
        }
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            InboundFrame::Connected { .. } => frame_types::CONNECTED,
            InboundFrame::Notification { .. } => frame_types::NOTIFICATION,
            InboundFrame::Ping => frame_types::PING,
            InboundFrame::Pong => frame_types::PONG,
            InboundFrame::Error { .. } => frame_types::ERROR,
        }
    }
}

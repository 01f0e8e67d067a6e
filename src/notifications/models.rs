//! Notification data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned notification identifier
pub type NotificationId = i64;

/// Notification category.
///
/// Categories are defined by the server; unknown ones are kept as `Other`
/// so a new category never causes a push to be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PeerDown,
    PeerUp,
    BackupSuccess,
    BackupFailed,
    System,
    #[serde(other)]
    Other,
}

/// A user notification as seen by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "data")]
    pub payload: serde_json::Value,
}

impl NotificationRecord {
    pub fn is_unread(&self) -> bool {
        !self.read
    }
}

/// One page of the notifications listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationRecord>,
    /// Size of the whole listing, when the server reports it.
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

/// Response body of the unread count endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

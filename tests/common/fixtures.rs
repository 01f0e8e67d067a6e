//! Fixture notifications served by the test server

use super::constants::*;
use chrono::{TimeZone, Utc};
use dashboard_notifications::{NotificationKind, NotificationRecord};
use serde_json::json;

/// Build a notification record with the given id.
pub fn make_notification(
    id: i64,
    kind: NotificationKind,
    title: &str,
    read: bool,
) -> NotificationRecord {
    NotificationRecord {
        id,
        kind,
        title: title.to_string(),
        message: format!("{} (fixture {})", title, id),
        read,
        read_at: if read {
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap())
        } else {
            None
        },
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, id as u32).unwrap(),
        payload: json!({ "fixture": id }),
    }
}

/// The notifications every test server starts with, newest first.
pub fn fixture_notifications() -> Vec<NotificationRecord> {
    vec![
        make_notification(
            SYSTEM_NOTICE_ID,
            NotificationKind::System,
            "Maintenance window",
            false,
        ),
        make_notification(
            BACKUP_SUCCESS_ID,
            NotificationKind::BackupSuccess,
            "Backup finished",
            true,
        ),
        make_notification(PEER_DOWN_ID, NotificationKind::PeerDown, "Peer down", false),
    ]
}

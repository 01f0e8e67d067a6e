//! User notifications module

mod api;
mod models;
mod store;

#[cfg(any(test, feature = "mock"))]
pub use api::MockNotificationApi;
pub use api::{ApiError, HttpNotificationApi, NotificationApi};
pub use models::{
    NotificationId, NotificationKind, NotificationPage, NotificationRecord, UnreadCount,
};
pub use store::{NotificationSnapshot, NotificationStore};

//! Dashboard notifications client library
//!
//! Keeps a dashboard session informed of server-generated notifications over a
//! WebSocket, falling back to REST polling while the realtime transport is down.

pub mod client;
pub mod clock;
pub mod config;
pub mod fallback;
pub mod metrics;
pub mod notifications;
pub mod session;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::{ClientStatus, NotificationClient};
pub use fallback::TransportMode;
pub use notifications::{
    HttpNotificationApi, NotificationApi, NotificationKind, NotificationRecord, NotificationStore,
};
pub use session::{CredentialsProvider, TokenSource};
pub use transport::{ConnectionState, TransportEvent, TransportManager, WsConnector};

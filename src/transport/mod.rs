//! Realtime transport: one authenticated WebSocket per session, with
//! reconnection, heartbeat and typed event fan-out.

mod backoff;
mod connector;
mod events;
mod frames;
mod manager;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::BackoffPolicy;
pub use connector::{
    ConnectError, ConnectionTarget, Connector, OutboundFrame, SocketChannel, SocketEvent,
    WsConnector,
};
pub use events::{EventBus, Subscription, TransportEvent};
pub use frames::{frame_types, InboundFrame, NORMAL_CLOSURE, POLICY_VIOLATION};
pub use manager::{TransportManager, TransportSettings, TransportStatus};
pub use state::{Action, ConnectionState, MachineEvent, ReconnectState, TransportMachine};

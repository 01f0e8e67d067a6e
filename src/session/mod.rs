//! Authentication lifecycle integration.

mod bridge;
mod credentials;

pub use bridge::{SessionBridge, SessionChange};
pub use credentials::{CredentialsProvider, TokenSource};

//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer, TEST_TOKEN};
//! use dashboard_notifications::ConnectionState;
//!
//! #[tokio::test]
//! async fn test_connects() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::connect(&server.base_url, Some(TEST_TOKEN));
//!
//!     client.wait_for_connection(ConnectionState::Connected).await;
//! }
//! ```

#![allow(dead_code)]

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{eventually, TestClient};
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::make_notification;
pub use server::TestServer;

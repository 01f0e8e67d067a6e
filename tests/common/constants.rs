//! Shared constants for end-to-end tests
//!
//! When fixture data or timing knobs change, update only this file.

// ============================================================================
// Credentials
// ============================================================================

/// Token the test server accepts out of the box
pub const TEST_TOKEN: &str = "test-token-123";

/// A second valid token, used for rotation tests
pub const ROTATED_TOKEN: &str = "rotated-token-456";

/// Token the test server never accepts
pub const INVALID_TOKEN: &str = "invalid-token-000";

// ============================================================================
// Fixture notifications
// ============================================================================

/// Unread "peer down" notification
pub const PEER_DOWN_ID: i64 = 1;

/// Read "backup success" notification
pub const BACKUP_SUCCESS_ID: i64 = 2;

/// Unread "system" notification
pub const SYSTEM_NOTICE_ID: i64 = 3;

/// Number of fixture notifications
pub const FIXTURE_COUNT: usize = 3;

/// Unread fixture notifications
pub const FIXTURE_UNREAD: u64 = 2;

// ============================================================================
// Timing
// ============================================================================

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Poll interval while waiting for the server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// How long helpers wait for an expected condition
pub const WAIT_TIMEOUT_MS: u64 = 5000;

/// Reconnect base delay used by test clients
pub const TEST_BASE_DELAY_MS: u64 = 50;

/// Reconnect delay cap used by test clients
pub const TEST_MAX_DELAY_MS: u64 = 200;

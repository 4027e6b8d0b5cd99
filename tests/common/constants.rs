//! Shared constants for end-to-end tests
//!
//! When test users or timings change, update only this file.

// ============================================================================
// Test Users
// ============================================================================

/// Bearer token of the first test user
pub const USER_1_TOKEN: &str = "token-alice";

/// Id of the first test user
pub const USER_1_ID: u64 = 1;

/// Bearer token of the second test user
pub const USER_2_TOKEN: &str = "token-bob";

/// Id of the second test user
pub const USER_2_ID: u64 = 2;

/// Token the server does not know
pub const UNKNOWN_TOKEN: &str = "token-mallory";

// ============================================================================
// Timeouts
// ============================================================================

/// Upper bound for anything that should happen "soon" in a test
pub const EVENT_TIMEOUT_MS: u64 = 5_000;

/// Interval between polls while waiting for a condition
pub const POLL_INTERVAL_MS: u64 = 10;

// ============================================================================
// Reconnect policy used by the tests (fast, same attempt budget as default)
// ============================================================================

pub const TEST_RECONNECT_BASE_DELAY_MS: u64 = 10;
pub const TEST_RECONNECT_MAX_DELAY_MS: u64 = 50;
pub const TEST_MAX_RECONNECT_ATTEMPTS: u32 = 5;

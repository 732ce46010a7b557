//! Reconnect backoff policy.
//!
//! Exponential backoff with optional jitter for re-establishing the
//! server connection, plus the attempt bookkeeping the connection loop
//! consults between tries. Delay computation is a pure function of the
//! attempt number so it can be pinned by tests.

use crate::error::{Error, Result};

/// Base delay before the first retry (1s)
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Ceiling on any single retry delay (30s)
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Retries before giving up and surfacing a terminal disconnect
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Backoff curve configuration
///
/// `delay_ms(attempt)` is `min(max, base * 2^attempt)` stretched by up
/// to `jitter_ratio` of itself. Jitter only ever lengthens the delay;
/// with a ratio of zero the curve is fully deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: RECONNECT_BASE_DELAY_MS,
            max_delay_ms: RECONNECT_MAX_DELAY_MS,
            jitter_ratio: 0.0,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Policy with explicit bounds and no jitter
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_ratio: 0.0,
            max_attempts,
        }
    }

    /// Stretch each delay by up to `ratio` of itself
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    /// Policy that never reconnects
    ///
    /// Zero allowed attempts, and an effectively infinite delay should
    /// one be requested anyway.
    pub fn no_reconnect() -> Self {
        Self {
            base_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
            jitter_ratio: 0.0,
            max_attempts: 0,
        }
    }

    /// Near-zero delays for tests
    pub fn fast() -> Self {
        Self {
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_ratio: 0.0,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }

    /// Delay before retry number `attempt` (zero-based)
    ///
    /// Negative attempts return 0.
    pub fn delay_ms(&self, attempt: i32) -> u64 {
        if attempt < 0 {
            return 0;
        }

        let exponential = 2u64
            .checked_pow(attempt as u32)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        let capped = exponential.min(self.max_delay_ms);

        if self.jitter_ratio <= 0.0 {
            return capped;
        }
        let stretched = capped as f64 * (1.0 + self.jitter_ratio * rand::random::<f64>());
        stretched as u64
    }
}

/// Attempt bookkeeping between connection drops
///
/// Tracks how many retries have been spent, whether the network is
/// reachable, and whether the session was invalidated (an expired or
/// kicked session must re-authenticate, not just re-dial).
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempt: i32,
    auth_expired: bool,
    network_available: bool,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            auth_expired: false,
            network_available: true,
        }
    }

    /// Whether another reconnect attempt is permitted
    pub fn should_retry(&self) -> bool {
        if self.auth_expired {
            return false;
        }
        if !self.network_available {
            return false;
        }
        (self.attempt as u32) < self.policy.max_attempts
    }

    /// Delay to sleep before the next attempt
    pub fn next_delay_ms(&self) -> u64 {
        self.policy.delay_ms(self.attempt)
    }

    /// Consume one attempt
    pub fn record_attempt(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }

    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    /// Successful connection: start the curve over
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.auth_expired = false;
    }

    /// Session invalidated; retrying without re-auth is pointless
    pub fn mark_auth_expired(&mut self) {
        self.auth_expired = true;
    }

    pub fn is_auth_expired(&self) -> bool {
        self.auth_expired
    }

    /// Track reachability; regaining the network restarts the curve
    pub fn set_network_available(&mut self, available: bool) {
        self.network_available = available;
        if available && !self.auth_expired {
            self.attempt = 0;
        }
    }

    /// Error describing why retrying stopped
    pub fn exhausted_error(&self) -> Result<()> {
        if self.auth_expired {
            return Err(Error::SessionExpired);
        }
        if !self.network_available {
            return Err(Error::TransportError("Network unavailable".to_string()));
        }
        if !self.should_retry() {
            return Err(Error::TransportError(format!(
                "Gave up after {} reconnect attempts",
                self.attempt
            )));
        }
        Ok(())
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

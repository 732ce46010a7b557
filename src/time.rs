//! Time utilities and the injectable clock.
//!
//! Components that make timing decisions (challenge expiry, session TTL,
//! rate limiting, heartbeats) read time through the [`Clock`] trait so
//! tests can drive them deterministically. Production code uses
//! [`SystemClock`], backed by `chrono::Utc::now()`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Maximum tolerated difference between a peer timestamp and local time
pub const TIMESTAMP_SKEW_MS: i64 = 10 * 60 * 1000;

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether a millisecond timestamp is within [`TIMESTAMP_SKEW_MS`] of `now_millis`.
pub fn is_timestamp_fresh(timestamp_millis: i64, now_millis: i64) -> bool {
    (now_millis - timestamp_millis).abs() <= TIMESTAMP_SKEW_MS
}

/// Millisecond clock abstraction.
///
/// All protocol timestamps are Unix milliseconds, matching the wire
/// format's `timestamp`/`expiresAt`/`serverTime` fields.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall-clock [`Clock`] used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_timestamp_millis()
    }
}

/// Manually advanced [`Clock`] for deterministic tests.
///
/// Starts at an arbitrary epoch and only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_millis`.
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Advance the clock by `delta_millis`.
    pub fn advance(&self, delta_millis: i64) {
        self.now.fetch_add(delta_millis, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute timestamp.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Shared clock handle used throughout the core.
pub type SharedClock = Arc<dyn Clock>;

/// Default shared clock (system time).
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_is_reasonable() {
        let ts = now_timestamp();
        // Should be after 2024-01-01 (1704067200)
        assert!(ts > 1704067200, "Timestamp {} is too old", ts);
        // Should be before 2100-01-01 (4102444800)
        assert!(ts < 4102444800, "Timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_system_clock_matches_free_function() {
        let clock = SystemClock;
        let a = now_timestamp_millis();
        let b = clock.now_millis();
        assert!((b - a).abs() < 5_000);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(10_000);
        assert_eq!(clock.now_millis(), 10_000);
    }

    #[test]
    fn test_timestamp_freshness_window() {
        let now = 1_700_000_000_000;
        assert!(is_timestamp_fresh(now, now));
        assert!(is_timestamp_fresh(now - TIMESTAMP_SKEW_MS, now));
        assert!(is_timestamp_fresh(now + TIMESTAMP_SKEW_MS, now));
        assert!(!is_timestamp_fresh(now - TIMESTAMP_SKEW_MS - 1, now));
        assert!(!is_timestamp_fresh(now + TIMESTAMP_SKEW_MS + 1, now));
    }
}

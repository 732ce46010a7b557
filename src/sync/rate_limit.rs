//! Rate-limited execution gate.
//!
//! Guards operations that must not fire more often than a fixed
//! interval, such as the connection heartbeat. Unlike a queueing
//! limiter, calls inside the window are dropped, not delayed.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::time::SharedClock;

/// Drops operations that arrive within `min_interval_ms` of the last run
///
/// The interval is measured from the *completion* of the previous
/// execution, on the injected clock. Skipped calls are counted for
/// diagnostics.
pub struct RateLimitedExecutor {
    min_interval_ms: i64,
    clock: SharedClock,
    last_run_ms: Mutex<Option<i64>>,
    skipped: AtomicU64,
}

impl RateLimitedExecutor {
    /// Create an executor gated to one run per `min_interval_ms`
    pub fn new(min_interval_ms: i64, clock: SharedClock) -> Self {
        Self {
            min_interval_ms,
            clock,
            last_run_ms: Mutex::new(None),
            skipped: AtomicU64::new(0),
        }
    }

    /// Run `op` unless a run completed within the interval
    ///
    /// Returns `Some(output)` when the operation ran, `None` when it was
    /// skipped. The first call always runs.
    pub async fn execute_if_allowed<F, T>(&self, op: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let now = self.clock.now_millis();
        {
            let last_run = self.last_run_ms.lock();
            if let Some(last) = *last_run {
                if now - last < self.min_interval_ms {
                    drop(last_run);
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let output = op.await;
        *self.last_run_ms.lock() = Some(self.clock.now_millis());
        Some(output)
    }

    /// Run `op` regardless of the interval, resetting the window
    pub async fn force_execute<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let output = op.await;
        *self.last_run_ms.lock() = Some(self.clock.now_millis());
        output
    }

    /// Number of calls dropped by the interval gate
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Completion time of the most recent run, if any
    pub fn last_run_ms(&self) -> Option<i64> {
        *self.last_run_ms.lock()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use std::sync::Arc;

    fn executor(interval_ms: i64, start_ms: i64) -> (RateLimitedExecutor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let executor = RateLimitedExecutor::new(interval_ms, clock.clone());
        (executor, clock)
    }

    #[tokio::test]
    async fn test_first_call_always_runs() {
        let (executor, _clock) = executor(30_000, 1_000);
        assert_eq!(executor.execute_if_allowed(async { 1 }).await, Some(1));
        assert_eq!(executor.skipped_count(), 0);
    }

    #[tokio::test]
    async fn test_calls_within_interval_are_skipped() {
        let (executor, clock) = executor(30_000, 0);

        assert_eq!(executor.execute_if_allowed(async { 1 }).await, Some(1));

        clock.advance(29_999);
        assert_eq!(executor.execute_if_allowed(async { 2 }).await, None);
        assert_eq!(executor.skipped_count(), 1);

        clock.advance(1);
        assert_eq!(executor.execute_if_allowed(async { 3 }).await, Some(3));
        assert_eq!(executor.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_force_execute_always_runs() {
        let (executor, clock) = executor(30_000, 0);

        assert_eq!(executor.execute_if_allowed(async { 1 }).await, Some(1));
        assert_eq!(executor.force_execute(async { 2 }).await, 2);

        // Forced run resets the window
        clock.advance(29_000);
        assert_eq!(executor.execute_if_allowed(async { 3 }).await, None);
        clock.advance(1_000);
        assert_eq!(executor.execute_if_allowed(async { 4 }).await, Some(4));
    }

    #[tokio::test]
    async fn test_skipped_calls_do_not_reset_window() {
        let (executor, clock) = executor(10_000, 0);

        assert_eq!(executor.execute_if_allowed(async { 1 }).await, Some(1));
        clock.advance(5_000);
        assert_eq!(executor.execute_if_allowed(async { 2 }).await, None);
        clock.advance(5_000);
        // 10s after the run, not 5s after the skip
        assert_eq!(executor.execute_if_allowed(async { 3 }).await, Some(3));
        assert_eq!(executor.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_last_run_tracks_completion_time() {
        let (executor, clock) = executor(1_000, 500);
        assert_eq!(executor.last_run_ms(), None);

        executor.execute_if_allowed(async {}).await;
        assert_eq!(executor.last_run_ms(), Some(500));

        clock.set(9_000);
        executor.force_execute(async {}).await;
        assert_eq!(executor.last_run_ms(), Some(9_000));
    }
}

//! Cancellation-safe scoped state.
//!
//! Holds a value for the duration of an async operation and guarantees
//! the paired cleanup runs exactly once, whether the operation returns,
//! errors, or is cancelled by having its future dropped. Used for
//! transient resources like in-progress upload markers, where a skipped
//! cleanup would leak state across reconnects.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

/// Scoped state container with guaranteed cleanup
///
/// `with_value` installs a value, runs the body, then runs the cleanup
/// and clears the state. The cleanup fires on *every* exit path,
/// including the body's future being dropped mid-poll. The state is
/// cleared only after the cleanup has run, so observers never see an
/// empty state while cleanup is still pending.
pub struct CancellationSafeState<T> {
    value: Arc<RwLock<Option<T>>>,
}

impl<T> CancellationSafeState<T> {
    /// Create an empty state holder
    pub fn new() -> Self {
        Self {
            value: Arc::new(RwLock::new(None)),
        }
    }

    /// Install `value`, run `body`, then run `cleanup` and clear
    pub async fn with_value<C, F, R>(&self, value: T, cleanup: C, body: F) -> R
    where
        C: FnOnce() + Send + 'static,
        F: Future<Output = R>,
    {
        *self.value.write() = Some(value);
        let _guard = StateGuard {
            value: Arc::clone(&self.value),
            cleanup: Some(Box::new(cleanup)),
        };
        body.await
    }

    /// Snapshot of the current value, if one is installed
    pub fn current(&self) -> Option<T>
    where
        T: Clone,
    {
        self.value.read().clone()
    }

    /// Whether a value is currently installed
    pub fn is_set(&self) -> bool {
        self.value.read().is_some()
    }
}

impl<T> Default for CancellationSafeState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CancellationSafeState<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

/// Runs the cleanup and clears the state when dropped
struct StateGuard<T> {
    value: Arc<RwLock<Option<T>>>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Drop for StateGuard<T> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        *self.value.write() = None;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_cleanup_runs_on_normal_return() {
        let state: CancellationSafeState<String> = CancellationSafeState::new();
        let cleanups = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&cleanups);
        let snapshot = state.clone();
        let result = state
            .with_value(
                "upload-1".to_string(),
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                async move {
                    assert_eq!(snapshot.current().as_deref(), Some("upload-1"));
                    42
                },
            )
            .await;

        assert_eq!(result, 42);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!state.is_set());
    }

    #[tokio::test]
    async fn test_cleanup_runs_on_error() {
        let state: CancellationSafeState<u32> = CancellationSafeState::new();
        let cleanups = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&cleanups);
        let result: Result<u32> = state
            .with_value(
                7,
                move || {
                    c.fetch_add(1, Ordering::SeqCst);
                },
                async { Err(Error::UploadFailed(503)) },
            )
            .await;

        assert_eq!(result, Err(Error::UploadFailed(503)));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!state.is_set());
    }

    #[tokio::test]
    async fn test_cleanup_runs_on_cancellation() {
        let state: CancellationSafeState<u32> = CancellationSafeState::new();
        let cleanups = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&cleanups);
        let scoped = state.clone();
        let handle = tokio::spawn(async move {
            scoped
                .with_value(
                    7,
                    move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    },
                    async {
                        std::future::pending::<()>().await;
                    },
                )
                .await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(state.is_set());

        // Aborting the task drops the in-flight future
        handle.abort();
        let _ = handle.await;

        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!state.is_set());
    }

    #[tokio::test]
    async fn test_state_visible_only_inside_scope() {
        let state: CancellationSafeState<&'static str> = CancellationSafeState::new();
        assert!(!state.is_set());
        assert_eq!(state.current(), None);

        let snapshot = state.clone();
        state
            .with_value(
                "active",
                || {},
                async move {
                    assert_eq!(snapshot.current(), Some("active"));
                },
            )
            .await;

        assert!(!state.is_set());
    }
}

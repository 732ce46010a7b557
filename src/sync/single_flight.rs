//! # Single Flight
//!
//! Coalesces concurrent executions of the same logical operation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SINGLE FLIGHT                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  caller A ──execute("blob-1", op)──►  op runs (leader)      │
//! │  caller B ──execute("blob-1", _)───►  awaits A's result     │
//! │  caller C ──execute("blob-1", _)───►  awaits A's result     │
//! │  caller D ──execute("blob-2", op)──►  op runs (distinct)    │
//! │                                                             │
//! │  op completes → entry removed → A, B, C all get the value   │
//! │  (or all get the same error)                                │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The leader is the caller that found no in-flight entry for the key;
//! its `op` is the only one that runs. If the leader is cancelled (its
//! future dropped) or [`SingleFlight::cancel_all`] fires, the entry is
//! removed and every waiter observes [`Error::Cancelled`] rather than a
//! stale or partial result.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use crate::error::{Error, Result};

/// Call coalescer keyed by `K`
///
/// Values are broadcast to every waiter, so `V` must be `Clone` (in
/// practice: `Bytes`, small structs).
pub struct SingleFlight<K, V> {
    flights: Arc<Mutex<HashMap<K, Flight<V>>>>,
}

struct Flight<V> {
    waiters: Vec<oneshot::Sender<Result<V>>>,
    cancel: Arc<Notify>,
}

/// What `execute` decided while holding the lock
enum Entry<V> {
    /// Someone else is running the op; await their result
    Join(oneshot::Receiver<Result<V>>),
    /// We are the leader; run the op with this cancel handle
    Lead(Arc<Notify>),
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create an empty coalescer
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `op` for `key`, or await the execution already in flight
    ///
    /// The operation runs exactly once per key per flight; every caller
    /// receives the same result, including errors.
    pub async fn execute<F>(&self, key: K, op: F) -> Result<V>
    where
        F: Future<Output = Result<V>>,
    {
        let entry = {
            let mut flights = self.flights.lock();
            match flights.get_mut(&key) {
                Some(flight) => {
                    let (tx, rx) = oneshot::channel();
                    flight.waiters.push(tx);
                    Entry::Join(rx)
                }
                None => {
                    let cancel = Arc::new(Notify::new());
                    flights.insert(
                        key.clone(),
                        Flight {
                            waiters: Vec::new(),
                            cancel: Arc::clone(&cancel),
                        },
                    );
                    Entry::Lead(cancel)
                }
            }
        };

        match entry {
            Entry::Join(rx) => match rx.await {
                Ok(result) => result,
                // Leader vanished without broadcasting
                Err(_) => Err(Error::Cancelled),
            },
            Entry::Lead(cancel) => {
                // Guard: if this future is dropped mid-op, the entry is
                // removed and waiters are failed instead of hanging.
                let guard = FlightGuard {
                    flights: Arc::clone(&self.flights),
                    key: Some(key),
                };

                let result = tokio::select! {
                    result = op => result,
                    _ = cancel.notified() => Err(Error::Cancelled),
                };

                guard.complete(result.clone());
                result
            }
        }
    }

    /// Whether an operation for `key` is currently running
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Number of distinct keys currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.flights.lock().len()
    }

    /// Cancel every in-flight operation
    ///
    /// Leaders stop at their next suspension point; all callers observe
    /// [`Error::Cancelled`].
    pub fn cancel_all(&self) {
        let flights = self.flights.lock();
        for flight in flights.values() {
            flight.cancel.notify_one();
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the flight entry and settles waiters exactly once
struct FlightGuard<K: Eq + Hash, V> {
    flights: Arc<Mutex<HashMap<K, Flight<V>>>>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> FlightGuard<K, V> {
    /// Normal completion path: broadcast the leader's result
    fn complete(mut self, result: Result<V>)
    where
        V: Clone,
    {
        if let Some(key) = self.key.take() {
            let waiters = Self::remove(&self.flights, &key);
            for tx in waiters {
                let _ = tx.send(result.clone());
            }
        }
    }

    fn remove(
        flights: &Mutex<HashMap<K, Flight<V>>>,
        key: &K,
    ) -> Vec<oneshot::Sender<Result<V>>> {
        flights
            .lock()
            .remove(key)
            .map(|f| f.waiters)
            .unwrap_or_default()
    }
}

impl<K: Eq + Hash, V> Drop for FlightGuard<K, V> {
    fn drop(&mut self) {
        // Only reached when the leader was dropped before completing
        if let Some(key) = self.key.take() {
            let waiters = Self::remove(&self.flights, &key);
            for tx in waiters {
                let _ = tx.send(Err(Error::Cancelled));
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_execute_once() {
        let flight: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flight
                    .execute("key".to_string(), async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flight: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let f1 = Arc::clone(&flight);
        let e1 = Arc::clone(&executions);
        let h1 = tokio::spawn(async move {
            f1.execute("a", async move {
                e1.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(1)
            })
            .await
        });

        let f2 = Arc::clone(&flight);
        let e2 = Arc::clone(&executions);
        let h2 = tokio::spawn(async move {
            f2.execute("b", async move {
                e2.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(2)
            })
            .await
        });

        assert_eq!(h1.await.unwrap().unwrap(), 1);
        assert_eq!(h2.await.unwrap().unwrap(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_broadcast() {
        let flight: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());

        let leader = Arc::clone(&flight);
        let h1 = tokio::spawn(async move {
            leader
                .execute("k", async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(Error::DownloadFailed(500))
                })
                .await
        });

        // Let the leader register before joining
        tokio::time::sleep(Duration::from_millis(10)).await;
        let joiner = Arc::clone(&flight);
        let h2 = tokio::spawn(async move { joiner.execute("k", async { Ok(7) }).await });

        assert_eq!(h1.await.unwrap(), Err(Error::DownloadFailed(500)));
        assert_eq!(h2.await.unwrap(), Err(Error::DownloadFailed(500)));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let flight: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());

        let leader = Arc::clone(&flight);
        let handle = tokio::spawn(async move {
            leader
                .execute("k", async {
                    // Parks until cancelled
                    std::future::pending::<()>().await;
                    Ok(1)
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(flight.is_in_flight(&"k"));
        assert_eq!(flight.in_flight_count(), 1);

        flight.cancel_all();

        assert_eq!(handle.await.unwrap(), Err(Error::Cancelled));
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_waiters_fail_when_leader_dropped() {
        let flight: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());

        let leader = Arc::clone(&flight);
        let leader_handle = tokio::spawn(async move {
            leader
                .execute("k", async {
                    std::future::pending::<()>().await;
                    Ok(1)
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let joiner = Arc::clone(&flight);
        let joiner_handle = tokio::spawn(async move { joiner.execute("k", async { Ok(7) }).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Killing the leader task drops its future mid-flight
        leader_handle.abort();

        assert_eq!(joiner_handle.await.unwrap(), Err(Error::Cancelled));
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_key_reusable_after_completion() {
        let flight: SingleFlight<&'static str, u32> = SingleFlight::new();

        assert_eq!(flight.execute("k", async { Ok(1) }).await.unwrap(), 1);
        assert_eq!(flight.execute("k", async { Ok(2) }).await.unwrap(), 2);
    }
}

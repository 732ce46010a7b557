//! # Concurrency Primitives
//!
//! Small, generic building blocks that make the network-facing
//! components safe under concurrent and cancellable execution.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  CONCURRENCY TOOLKIT                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────────┐   N concurrent calls, same key           │
//! │  │   SingleFlight   │   → one execution, shared result         │
//! │  └──────────────────┘   (attachment downloads)                 │
//! │                                                                 │
//! │  ┌──────────────────┐   drops calls arriving faster than       │
//! │  │ RateLimitedExec. │   a minimum interval                     │
//! │  └──────────────────┘   (heartbeat pings)                      │
//! │                                                                 │
//! │  ┌──────────────────┐   observable state + cleanup that        │
//! │  │ CancellationSafe │   runs on return, error, or cancel       │
//! │  │      State       │   (in-progress transfer markers)         │
//! │  └──────────────────┘                                          │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All three primitives carry their own synchronization; callers never
//! need external locking.

mod cancel_safe;
mod rate_limit;
mod single_flight;

pub use cancel_safe::CancellationSafeState;
pub use rate_limit::RateLimitedExecutor;
pub use single_flight::SingleFlight;

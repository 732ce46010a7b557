//! # Session
//!
//! The authenticated session record and the shared handle components use
//! to read it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SESSION LIFECYCLE                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │   AuthHandshake success                                     │
//! │        │                                                    │
//! │        ▼                                                    │
//! │   ┌──────────┐   token refresh    ┌──────────┐             │
//! │   │  Active  │ ─────────────────► │  Active  │             │
//! │   └──────────┘                    └──────────┘             │
//! │        │                                                    │
//! │        │  logout / kick / sessionExpiresAt reached          │
//! │        ▼                                                    │
//! │   ┌──────────┐                                              │
//! │   │  Cleared │   (memory and secure storage both wiped)     │
//! │   └──────────┘                                              │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one live session exists per device. Every holder of a
//! [`SessionState`] observes store/clear atomically, so a kick tears the
//! token out from under in-flight work instead of letting it be reused.
//!
//! The server's `serverTime` is captured on every ack and pong; the
//! resulting clock offset lets timestamp checks survive devices with a
//! skewed wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::time::is_timestamp_fresh;

/// Sessions expire server-side this many days after issuance
pub const SESSION_TTL_DAYS: i64 = 7;

/// An authenticated session issued by the registration handshake
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// WhisperID the session was issued for
    pub whisper_id: String,
    /// Opaque bearer token presented on authenticated requests
    pub session_token: String,
    /// When the token stops being accepted (Unix millis)
    pub session_expires_at: i64,
    /// Server wall clock at issuance (Unix millis)
    pub server_time: i64,
}

impl Session {
    /// Whether the token is still within its validity window
    pub fn is_valid(&self, now_millis: i64) -> bool {
        self.session_expires_at > now_millis
    }

    /// Milliseconds until expiry (zero if already expired)
    pub fn remaining_ms(&self, now_millis: i64) -> i64 {
        (self.session_expires_at - now_millis).max(0)
    }
}

// The bearer token must never reach logs
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("whisper_id", &self.whisper_id)
            .field("session_token", &"[REDACTED]")
            .field("session_expires_at", &self.session_expires_at)
            .field("server_time", &self.server_time)
            .finish()
    }
}

/// Shared, thread-safe view of the current session
///
/// Cheap to clone; all clones observe the same session. Also tracks the
/// server clock offset learned from acks and pongs.
#[derive(Clone, Default)]
pub struct SessionState {
    inner: Arc<RwLock<Option<Session>>>,
    /// serverTime minus local time at last sync, in millis
    clock_offset_ms: Arc<AtomicI64>,
}

impl SessionState {
    /// Create an empty (unauthenticated) state
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, replacing any previous one
    ///
    /// Captures the server clock offset from the ack's `serverTime`.
    pub fn store(&self, session: Session, now_millis: i64) {
        if !is_timestamp_fresh(session.server_time, now_millis) {
            tracing::warn!(
                "Device clock differs from server by {}ms, beyond protocol tolerance",
                session.server_time - now_millis
            );
        }

        self.clock_offset_ms
            .store(session.server_time - now_millis, Ordering::SeqCst);
        *self.inner.write() = Some(session);
    }

    /// Drop the session from memory
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Snapshot the current session, if any
    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    /// Current bearer token, if a session is installed
    pub fn token(&self) -> Option<String> {
        self.inner.read().as_ref().map(|s| s.session_token.clone())
    }

    /// WhisperID of the current session, if any
    pub fn whisper_id(&self) -> Option<String> {
        self.inner.read().as_ref().map(|s| s.whisper_id.clone())
    }

    /// Whether an unexpired session is installed
    pub fn is_authenticated(&self, now_millis: i64) -> bool {
        self.inner
            .read()
            .as_ref()
            .map(|s| s.is_valid(now_millis))
            .unwrap_or(false)
    }

    /// Update the clock offset from a pong's `serverTime`
    pub fn record_server_time(&self, server_time: i64, now_millis: i64) {
        self.clock_offset_ms
            .store(server_time - now_millis, Ordering::SeqCst);
    }

    /// Last observed serverTime minus local time, in millis
    pub fn clock_offset_ms(&self) -> i64 {
        self.clock_offset_ms.load(Ordering::SeqCst)
    }

    /// Best estimate of the server's current clock
    pub fn server_now(&self, now_millis: i64) -> i64 {
        now_millis + self.clock_offset_ms()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("session", &self.inner.read().as_ref().map(|s| &s.whisper_id))
            .field("clock_offset_ms", &self.clock_offset_ms())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: i64, server_time: i64) -> Session {
        Session {
            whisper_id: "WSP-AAAA-BBBB-CCCC".to_string(),
            session_token: "tok-123".to_string(),
            session_expires_at: expires_at,
            server_time,
        }
    }

    #[test]
    fn test_session_validity_window() {
        let s = session(10_000, 5_000);

        assert!(s.is_valid(9_999));
        assert!(!s.is_valid(10_000));
        assert!(!s.is_valid(20_000));

        assert_eq!(s.remaining_ms(9_000), 1_000);
        assert_eq!(s.remaining_ms(15_000), 0);
    }

    #[test]
    fn test_store_and_clear() {
        let state = SessionState::new();
        assert!(state.current().is_none());
        assert!(!state.is_authenticated(0));

        state.store(session(10_000, 5_000), 5_000);
        assert!(state.is_authenticated(5_000));
        assert_eq!(state.token().as_deref(), Some("tok-123"));
        assert_eq!(state.whisper_id().as_deref(), Some("WSP-AAAA-BBBB-CCCC"));

        state.clear();
        assert!(state.current().is_none());
        assert!(state.token().is_none());
    }

    #[test]
    fn test_expired_session_not_authenticated() {
        let state = SessionState::new();
        state.store(session(10_000, 5_000), 5_000);

        assert!(state.is_authenticated(9_999));
        assert!(!state.is_authenticated(10_001));
    }

    #[test]
    fn test_clones_share_state() {
        let state = SessionState::new();
        let view = state.clone();

        state.store(session(10_000, 5_000), 5_000);
        assert!(view.is_authenticated(5_000));

        view.clear();
        assert!(state.current().is_none());
    }

    #[test]
    fn test_clock_offset_tracking() {
        let state = SessionState::new();

        // Server is 2 seconds ahead of the device
        state.store(session(100_000, 7_000), 5_000);
        assert_eq!(state.clock_offset_ms(), 2_000);
        assert_eq!(state.server_now(6_000), 8_000);

        // Pong says the server is now 1 second behind
        state.record_server_time(9_000, 10_000);
        assert_eq!(state.clock_offset_ms(), -1_000);
    }

    #[test]
    fn test_debug_redacts_token() {
        let s = session(10_000, 5_000);
        let debug = format!("{:?}", s);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("tok-123"));
    }
}

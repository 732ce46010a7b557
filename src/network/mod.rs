//! # Network Module
//!
//! Client side of the Whisper server connection.
//!
//! ## Connection Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CONNECTION STACK                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Protocol Components                          │   │
//! │  │                                                                 │   │
//! │  │  AuthHandshake         - challenge/response registration        │   │
//! │  │  PendingMessageFetcher - offline backlog + delivery receipts    │   │
//! │  │  heartbeat             - ping/pong keepalive (rate limited)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Wire Format                                │   │
//! │  │                                                                 │   │
//! │  │  JSON envelope {type, requestId?, payload}                      │   │
//! │  │  camelCase fields, binary values as base64                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Transport (injected)                       │   │
//! │  │                                                                 │   │
//! │  │  WebSocket owned by the app shell; this crate sees a trait     │   │
//! │  │  for sending and an event stream for inbound frames, state     │   │
//! │  │  changes and close notifications.                               │   │
//! │  │                                                                 │   │
//! │  │  ReconnectPolicy paces re-dials after a drop.                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Registration Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       REGISTRATION FLOW                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. register_begin {protocolVersion, cryptoVersion, deviceId, ...}     │
//! │     └─► Announces the device and protocol revision                     │
//! │                                                                         │
//! │  2. register_challenge {challengeId, challenge, expiresAt}             │
//! │     └─► 32 random bytes the client must sign                           │
//! │                                                                         │
//! │  3. register_proof {challengeId, publicKeys, signature, ...}           │
//! │     └─► Ed25519 signature over SHA-256 of the challenge                │
//! │                                                                         │
//! │  4. register_ack {success, whisperId, sessionToken, ...}               │
//! │     └─► Session persisted atomically on success                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod fetcher;
mod handshake;
mod reconnect;
pub mod wire;

pub use fetcher::{Deduper, FetchOutcome, PendingMessageFetcher};
pub use handshake::{AuthHandshake, ChallengeRegistry, HandshakePhase};
pub use reconnect::{
    ReconnectPolicy, ReconnectState, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_ATTEMPTS,
    RECONNECT_MAX_DELAY_MS,
};
pub use wire::{Envelope, Frame};

use async_trait::async_trait;

use crate::error::Result;

/// WebSocket close code the server uses to kick a replaced session
pub const CLOSE_CODE_KICKED: u16 = 4001;

/// Interval between keepalive pings (30s)
pub const HEARTBEAT_INTERVAL_MS: i64 = 30_000;

/// Connection lifecycle as observed by the app shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Session invalid; re-dialing without a fresh handshake is useless
    AuthExpired,
}

impl ConnectionState {
    /// Whether frames can currently be sent
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Event pushed by the transport to the protocol components
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection lifecycle change
    StateChanged(ConnectionState),
    /// One inbound frame, undecoded wire text
    Frame(String),
    /// Connection closed by either side
    Closed { code: u16, reason: String },
}

/// Outbound half of the injected connection
///
/// The app shell owns the actual WebSocket and feeds inbound traffic
/// through an [`TransportEvent`] channel; the protocol components only
/// ever send through this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame of wire text
    async fn send(&self, text: String) -> Result<()>;

    /// Close the connection with a code and reason
    async fn close(&self, code: u16, reason: &str) -> Result<()>;

    /// Encode and send an envelope
    async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send(envelope.encode()?).await
    }
}

/// Whether a close code means the server replaced this session
pub fn close_indicates_kick(code: u16) -> bool {
    code == CLOSE_CODE_KICKED
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_transitions_are_distinct() {
        assert_ne!(ConnectionState::Disconnected, ConnectionState::Connecting);
        assert_ne!(ConnectionState::Reconnecting, ConnectionState::AuthExpired);
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
    }

    #[test]
    fn test_kick_close_code() {
        assert!(close_indicates_kick(CLOSE_CODE_KICKED));
        assert!(!close_indicates_kick(1000));
        assert!(!close_indicates_kick(1006));
    }
}

//! # Auth Handshake
//!
//! Challenge/response registration state machine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    HANDSHAKE STATE MACHINE                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   Idle ──register_begin──► AwaitingChallenge                    │
//! │                                  │                              │
//! │                        register_challenge                       │
//! │                        (32 bytes, unexpired,                    │
//! │                         never seen before)                      │
//! │                                  │                              │
//! │                         register_proof                          │
//! │                                  ▼                              │
//! │                            AwaitingAck                          │
//! │                                  │                              │
//! │                  register_ack {success: true}                   │
//! │                                  ▼                              │
//! │                           Authenticated                         │
//! │                                                                 │
//! │   any state ──error frame / close / invalid input──► Failed     │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server proves nothing; the client proves key ownership by
//! signing SHA-256 of the 32 challenge bytes with its Ed25519 key.
//! Challenge ids are remembered across runs of the machine so a
//! replayed challenge is rejected even after a reconnect.
//!
//! Session storage is the only durable side effect. All traffic goes
//! through the injected [`Transport`]; the machine never owns a socket.

use std::collections::{HashSet, VecDeque};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::sync::mpsc;

use crate::crypto::sign_sha256;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::network::wire::{
    msg_type, Envelope, Frame, RegisterAckPayload, RegisterBeginPayload, RegisterChallengePayload,
    RegisterProofPayload, CRYPTO_VERSION, PROTOCOL_VERSION,
};
use crate::network::{close_indicates_kick, Transport, TransportEvent};
use crate::session::{Session, SessionState};
use crate::storage::{keys, SecureStore};
use crate::time::SharedClock;

/// Challenge bytes must decode to exactly this length
const CHALLENGE_SIZE: usize = 32;

/// Challenge ids remembered for replay detection
const MAX_TRACKED_CHALLENGES: usize = 128;

/// Where the machine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Idle,
    AwaitingChallenge,
    AwaitingAck,
    Authenticated,
    Failed,
}

/// Bounded set of challenge ids already answered
///
/// A server (or an attacker replaying its traffic) must never get a
/// second proof for the same challenge. The set is capped; the oldest
/// entry falls out first.
pub struct ChallengeRegistry {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ChallengeRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`; returns false if it was already present
    pub fn register(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for ChallengeRegistry {
    fn default() -> Self {
        Self::new(MAX_TRACKED_CHALLENGES)
    }
}

/// Registration state machine
///
/// One instance survives reconnects so replay detection spans them;
/// each call to [`run`](Self::run) performs one complete handshake.
pub struct AuthHandshake {
    device_id: String,
    platform: String,
    push_token: Option<String>,
    clock: SharedClock,
    challenges: ChallengeRegistry,
    phase: HandshakePhase,
}

impl AuthHandshake {
    pub fn new(device_id: impl Into<String>, platform: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            device_id: device_id.into(),
            platform: platform.into(),
            push_token: None,
            clock,
            challenges: ChallengeRegistry::default(),
            phase: HandshakePhase::Idle,
        }
    }

    /// Attach a push token to forward in the proof
    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Run one complete handshake over the given transport
    ///
    /// On success the session has been written to `store` and installed
    /// in `session_state`; the caller receives a copy. On any failure
    /// nothing has been stored and the machine is in `Failed`.
    pub async fn run(
        &mut self,
        transport: &dyn Transport,
        events: &mut mpsc::Receiver<TransportEvent>,
        identity: &Identity,
        session_state: &SessionState,
        store: &dyn SecureStore,
    ) -> Result<Session> {
        let result = self
            .drive(transport, events, identity, session_state, store)
            .await;
        if result.is_err() {
            self.phase = HandshakePhase::Failed;
        }
        result
    }

    async fn drive(
        &mut self,
        transport: &dyn Transport,
        events: &mut mpsc::Receiver<TransportEvent>,
        identity: &Identity,
        session_state: &SessionState,
        store: &dyn SecureStore,
    ) -> Result<Session> {
        self.phase = HandshakePhase::AwaitingChallenge;
        let begin = RegisterBeginPayload {
            protocol_version: PROTOCOL_VERSION,
            crypto_version: CRYPTO_VERSION,
            device_id: self.device_id.clone(),
            platform: self.platform.clone(),
            whisper_id: identity.whisper_id().map(str::to_string),
        };
        transport
            .send_envelope(&Envelope::new(msg_type::REGISTER_BEGIN, &begin)?)
            .await?;
        tracing::debug!("Sent register_begin for device {}", self.device_id);

        loop {
            let event = events.recv().await.ok_or_else(|| {
                Error::TransportError("Transport event channel closed".to_string())
            })?;

            match event {
                TransportEvent::StateChanged(state) => {
                    tracing::debug!("Transport state changed during handshake: {:?}", state);
                }
                TransportEvent::Closed { code, reason } => {
                    if close_indicates_kick(code) {
                        tracing::warn!("Kicked during handshake: {}", reason);
                        return Err(Error::Kicked(reason));
                    }
                    return Err(Error::TransportClosed { code, reason });
                }
                TransportEvent::Frame(text) => {
                    match Frame::decode(&text)? {
                        Frame::Error(payload) => return Err(payload.to_error()),
                        Frame::RegisterChallenge(payload)
                            if self.phase == HandshakePhase::AwaitingChallenge =>
                        {
                            self.answer_challenge(transport, identity, payload).await?;
                        }
                        Frame::RegisterAck(payload) if self.phase == HandshakePhase::AwaitingAck => {
                            return self.accept_ack(payload, session_state, store);
                        }
                        Frame::RegisterChallenge(_) | Frame::RegisterAck(_) => {
                            return Err(Error::UnexpectedFrame(format!(
                                "Handshake frame out of order in phase {:?}",
                                self.phase
                            )));
                        }
                        // Unrelated traffic can race in after a reconnect
                        other => {
                            tracing::debug!("Ignoring non-handshake frame: {:?}", other);
                        }
                    }
                }
            }
        }
    }

    async fn answer_challenge(
        &mut self,
        transport: &dyn Transport,
        identity: &Identity,
        payload: RegisterChallengePayload,
    ) -> Result<()> {
        let challenge = BASE64
            .decode(&payload.challenge)
            .map_err(|_| Error::InvalidChallenge("Challenge is not valid base64".to_string()))?;
        if challenge.len() != CHALLENGE_SIZE {
            return Err(Error::InvalidChallenge(format!(
                "Challenge must be {} bytes, got {}",
                CHALLENGE_SIZE,
                challenge.len()
            )));
        }
        if payload.expires_at <= self.clock.now_millis() {
            return Err(Error::ChallengeExpired);
        }
        if !self.challenges.register(&payload.challenge_id) {
            tracing::warn!("Challenge id {} replayed", payload.challenge_id);
            return Err(Error::ReplayAttempt(payload.challenge_id));
        }

        let signature = sign_sha256(identity.signing(), &challenge);
        let keys = identity.public_keys();
        let proof = RegisterProofPayload {
            protocol_version: PROTOCOL_VERSION,
            crypto_version: CRYPTO_VERSION,
            challenge_id: payload.challenge_id,
            device_id: self.device_id.clone(),
            platform: self.platform.clone(),
            whisper_id: identity.whisper_id().map(str::to_string),
            enc_public_key: keys.encryption_base64(),
            sign_public_key: keys.signing_base64(),
            signature: signature.to_base64(),
            push_token: self.push_token.clone(),
        };
        transport
            .send_envelope(&Envelope::new(msg_type::REGISTER_PROOF, &proof)?)
            .await?;
        self.phase = HandshakePhase::AwaitingAck;
        Ok(())
    }

    fn accept_ack(
        &mut self,
        payload: RegisterAckPayload,
        session_state: &SessionState,
        store: &dyn SecureStore,
    ) -> Result<Session> {
        if !payload.success {
            return Err(Error::AuthFailed(
                "Server rejected the registration proof".to_string(),
            ));
        }

        let session = Session {
            whisper_id: payload
                .whisper_id
                .ok_or_else(|| missing_ack_field("whisperId"))?,
            session_token: payload
                .session_token
                .ok_or_else(|| missing_ack_field("sessionToken"))?,
            session_expires_at: payload
                .session_expires_at
                .ok_or_else(|| missing_ack_field("sessionExpiresAt"))?,
            server_time: payload
                .server_time
                .ok_or_else(|| missing_ack_field("serverTime"))?,
        };

        // Durable write first; memory only reflects what survived a crash
        let bytes = serde_json::to_vec(&session)?;
        store.store(keys::SESSION, &bytes)?;
        session_state.store(session.clone(), self.clock.now_millis());

        self.phase = HandshakePhase::Authenticated;
        tracing::info!("Authenticated as {}", session.whisper_id);
        Ok(session)
    }
}

fn missing_ack_field(field: &str) -> Error {
    Error::InvalidPayload(format!("register_ack success without {}", field))
}

// ============================================================================
// TESTS
// ============================================================================

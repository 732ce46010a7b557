//! # Whisper Core
//!
//! The platform-independent protocol engine behind the Whisper encrypted
//! chat application. The mobile shells own the UI, the WebSocket and the
//! database; this crate owns everything cryptographic and protocol-shaped
//! in between.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WHISPER CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Identity   │  │   Network   │  │ Attachments │  │     Sync     │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Keypairs  │  │ - Handshake │  │ - Encrypt   │  │ - SingleFlt  │   │
//! │  │ - Recovery  │  │ - Fetcher   │  │ - Presign   │  │ - RateLimit  │   │
//! │  │ - WhisperID │  │ - Reconnect │  │ - LRU cache │  │ - CancelSafe │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────────────┴────────────────┘           │
//! │                                   │                                     │
//! │  ┌─────────────┐  ┌─────────────┐ │ ┌─────────────────────────────────┐│
//! │  │   Crypto    │  │   Storage   │ │ │           Session               ││
//! │  │             │  │             │ │ │                                 ││
//! │  │ - KDF       │  │ - Secure    │◄┘ │ - Bearer token                 ││
//! │  │ - Secretbox │  │   store     │   │ - Expiry tracking              ││
//! │  │ - Canonical │  │ - Message   │   │ - Server clock offset          ││
//! │  │   signing   │  │   store     │   │                                 ││
//! │  └─────────────┘  └─────────────┘   └─────────────────────────────────┘│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`time`] - Injectable clock and timestamp helpers
//! - [`crypto`] - Cryptographic primitives (KDF, secretbox, canonical signing)
//! - [`identity`] - User identity (creation, recovery, WhisperID)
//! - [`session`] - Authenticated session state
//! - [`storage`] - Storage contracts the embedding shell implements
//! - [`network`] - Wire format, handshake, backlog fetch, reconnect
//! - [`attachments`] - Encrypted attachment pipeline and cache
//! - [`sync`] - Concurrency primitives
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Key Derivation (BIP-39 + HKDF-SHA256)                         │
//! │  ──────────────────────────────────────────────                         │
//! │  All key material derives deterministically from a 12-word recovery    │
//! │  phrase, domain-separated into encryption, signing and contacts-       │
//! │  backup keys. Nothing secret ever leaves the device.                   │
//! │                                                                         │
//! │  Layer 2: Authentication (Ed25519 challenge/response)                   │
//! │  ────────────────────────────────────────────────────                   │
//! │  The client proves key ownership by signing a server challenge;        │
//! │  challenges expire and are single-use, so captured traffic cannot      │
//! │  be replayed.                                                          │
//! │                                                                         │
//! │  Layer 3: Message Authentication (canonical signing)                    │
//! │  ───────────────────────────────────────────────────                    │
//! │  Every message is signed over a deterministic canonical string, so     │
//! │  substituting any field breaks verification.                           │
//! │                                                                         │
//! │  Layer 4: Attachment Confidentiality (XChaCha20-Poly1305)               │
//! │  ────────────────────────────────────────────────────────               │
//! │  Attachments are sealed under per-file keys that are themselves        │
//! │  sealed under the conversation key; the blob store only ever sees      │
//! │  ciphertext and random object keys.                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod attachments;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod network;
pub mod session;
pub mod storage;
pub mod sync;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use attachments::{AttachmentPipeline, AttachmentPointer};
pub use error::{Error, Result};
pub use identity::{Identity, RecoveryPhrase};
pub use network::{ConnectionState, ReconnectPolicy, Transport, TransportEvent};
pub use session::{Session, SessionState};

// ============================================================================
// COMPOSITION ROOT
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::attachments::{BlobApi, BlobTransfer, DEFAULT_CACHE_BYTES, DEFAULT_CACHE_ENTRIES};
use crate::identity::StoredIdentity;
use crate::network::wire::{msg_type, Envelope, Frame, PingPayload};
use crate::network::{
    close_indicates_kick, AuthHandshake, FetchOutcome, PendingMessageFetcher, ReconnectState,
    HEARTBEAT_INTERVAL_MS,
};
use crate::storage::{keys, MessageStore, SecureStore};
use crate::sync::RateLimitedExecutor;
use crate::time::{system_clock, SharedClock};

/// Configuration for constructing a [`WhisperCore`]
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Platform name reported during registration (`"ios"`, `"android"`)
    pub platform: String,
    /// Push token forwarded in the registration proof, if available
    pub push_token: Option<String>,
    /// Minimum interval between keepalive pings
    pub heartbeat_interval_ms: i64,
    /// Backoff policy the connection loop consults between re-dials
    pub reconnect: ReconnectPolicy,
    /// Attachment plaintext cache entry bound
    pub cache_max_entries: usize,
    /// Attachment plaintext cache byte budget
    pub cache_max_bytes: usize,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            platform: "unknown".to_string(),
            push_token: None,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            reconnect: ReconnectPolicy::default(),
            cache_max_entries: DEFAULT_CACHE_ENTRIES,
            cache_max_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

/// The protocol engine, owning all shared protocol state
///
/// One instance per app process, constructed by the shell with its
/// platform collaborators injected. All state lives behind interior
/// synchronization, so the core can sit behind an `Arc` and be driven
/// from any task.
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       WHISPER CORE LIFECYCLE                            │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Construct with collaborators (stores, blob API, transfer client)   │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  2. load() the persisted identity and session, or                      │
/// │     create_identity() / recover_identity() on a fresh install          │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  3. Shell connects its WebSocket; authenticate() runs the              │
/// │     challenge/response handshake and installs the session              │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  4. Active: fetch_pending() drains the backlog, handle_frame()         │
/// │     consumes inbound traffic, heartbeat() keeps the link alive,        │
/// │     attachments() moves encrypted files                                │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  5. logout() — or a kick — clears the session everywhere               │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct WhisperCore {
    config: WhisperConfig,
    clock: SharedClock,
    secure_store: Arc<dyn SecureStore>,
    message_store: Arc<dyn MessageStore>,
    identity: RwLock<Option<Identity>>,
    session: SessionState,
    /// Created on first authenticate so replay detection survives reconnects
    handshake: AsyncMutex<Option<AuthHandshake>>,
    fetcher: PendingMessageFetcher,
    attachments: AttachmentPipeline,
    heartbeat: RateLimitedExecutor,
}

impl WhisperCore {
    /// Construct a core on the system clock
    pub fn new(
        config: WhisperConfig,
        secure_store: Arc<dyn SecureStore>,
        message_store: Arc<dyn MessageStore>,
        blob_api: Arc<dyn BlobApi>,
        blob_transfer: Arc<dyn BlobTransfer>,
    ) -> Self {
        Self::with_clock(
            config,
            secure_store,
            message_store,
            blob_api,
            blob_transfer,
            system_clock(),
        )
    }

    /// Construct a core on an injected clock
    pub fn with_clock(
        config: WhisperConfig,
        secure_store: Arc<dyn SecureStore>,
        message_store: Arc<dyn MessageStore>,
        blob_api: Arc<dyn BlobApi>,
        blob_transfer: Arc<dyn BlobTransfer>,
        clock: SharedClock,
    ) -> Self {
        let session = SessionState::new();
        let attachments = AttachmentPipeline::with_cache_bounds(
            blob_api,
            blob_transfer,
            session.clone(),
            config.cache_max_entries,
            config.cache_max_bytes,
        );
        Self {
            heartbeat: RateLimitedExecutor::new(config.heartbeat_interval_ms, Arc::clone(&clock)),
            fetcher: PendingMessageFetcher::new(Arc::clone(&clock)),
            attachments,
            session,
            handshake: AsyncMutex::new(None),
            identity: RwLock::new(None),
            secure_store,
            message_store,
            clock,
            config,
        }
    }

    // ========================================================================
    // Identity lifecycle
    // ========================================================================

    /// Create a fresh identity and persist it
    ///
    /// Returns the recovery phrase. It is shown to the user exactly once
    /// and never stored by the core.
    pub fn create_identity(&self) -> Result<RecoveryPhrase> {
        let (identity, recovery) = Identity::create()?;
        self.persist_identity(&identity)?;
        *self.identity.write() = Some(identity);
        tracing::info!("Created new identity");
        Ok(recovery)
    }

    /// Recover an existing identity from its phrase and WhisperID
    pub fn recover_identity(&self, recovery: &RecoveryPhrase, whisper_id: &str) -> Result<()> {
        let identity = Identity::recover(recovery, whisper_id)?;
        self.persist_identity(&identity)?;
        *self.identity.write() = Some(identity);
        tracing::info!("Recovered identity {}", whisper_id);
        Ok(())
    }

    /// Load the persisted identity and session, if any
    ///
    /// Returns whether an identity was found. An expired persisted
    /// session is deleted rather than installed.
    pub fn load(&self) -> Result<bool> {
        let Some(bytes) = self.secure_store.retrieve(keys::IDENTITY)? else {
            return Ok(false);
        };
        let stored: StoredIdentity = serde_json::from_slice(&bytes)
            .map_err(|e| Error::StorageCorrupted(e.to_string()))?;
        *self.identity.write() = Some(Identity::from_stored(&stored)?);

        if let Some(bytes) = self.secure_store.retrieve(keys::SESSION)? {
            let session: Session = serde_json::from_slice(&bytes)
                .map_err(|e| Error::StorageCorrupted(e.to_string()))?;
            let now = self.clock.now_millis();
            if session.is_valid(now) {
                self.session.store(session, now);
            } else {
                tracing::info!("Discarding expired persisted session");
                self.secure_store.delete(keys::SESSION)?;
            }
        }
        Ok(true)
    }

    /// Whether an identity is loaded
    pub fn has_identity(&self) -> bool {
        self.identity.read().is_some()
    }

    /// WhisperID of the loaded identity, if assigned
    pub fn whisper_id(&self) -> Option<String> {
        self.identity
            .read()
            .as_ref()
            .and_then(|i| i.whisper_id().map(str::to_string))
    }

    /// Device identifier of the loaded identity
    pub fn device_id(&self) -> Option<String> {
        self.identity
            .read()
            .as_ref()
            .map(|i| i.device_id().to_string())
    }

    fn persist_identity(&self, identity: &Identity) -> Result<()> {
        let bytes = serde_json::to_vec(&identity.to_stored())?;
        self.secure_store.store(keys::IDENTITY, &bytes)
    }

    // ========================================================================
    // Session and authentication
    // ========================================================================

    /// Shared view of the current session
    pub fn session(&self) -> SessionState {
        self.session.clone()
    }

    /// Whether an unexpired session is installed
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated(self.clock.now_millis())
    }

    /// Run the registration handshake over a connected transport
    ///
    /// On success the session is persisted and installed and the
    /// server-assigned WhisperID is recorded on the identity. A kick
    /// during the handshake tears down any existing session.
    pub async fn authenticate(
        &self,
        transport: &dyn Transport,
        events: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<Session> {
        let identity = {
            let guard = self.identity.read();
            guard.as_ref().ok_or(Error::NoIdentity)?.clone_for_service()
        };

        let mut slot = self.handshake.lock().await;
        let handshake = slot.get_or_insert_with(|| {
            let machine = AuthHandshake::new(
                identity.device_id(),
                self.config.platform.clone(),
                Arc::clone(&self.clock),
            );
            match &self.config.push_token {
                Some(token) => machine.with_push_token(token.clone()),
                None => machine,
            }
        });

        let result = handshake
            .run(
                transport,
                events,
                &identity,
                &self.session,
                self.secure_store.as_ref(),
            )
            .await;

        match result {
            Ok(session) => {
                let mut guard = self.identity.write();
                if let Some(identity) = guard.as_mut() {
                    identity.assign_whisper_id(&session.whisper_id)?;
                    let bytes = serde_json::to_vec(&identity.to_stored())?;
                    self.secure_store.store(keys::IDENTITY, &bytes)?;
                }
                Ok(session)
            }
            Err(err) => {
                if matches!(err, Error::Kicked(_)) {
                    self.logout()?;
                }
                Err(err)
            }
        }
    }

    /// Clear the session from memory and secure storage
    ///
    /// Idempotent. Also aborts any in-flight attachment downloads, since
    /// their bearer token is no longer valid.
    pub fn logout(&self) -> Result<()> {
        self.session.clear();
        self.secure_store.delete(keys::SESSION)?;
        self.attachments.cancel_downloads();
        tracing::info!("Session cleared");
        Ok(())
    }

    // ========================================================================
    // Connection traffic
    // ========================================================================

    /// Request the next backlog batch from the server
    pub async fn fetch_pending(&self, transport: &dyn Transport) -> Result<()> {
        if !self.is_authenticated() {
            return Err(Error::AuthFailed("No active session".to_string()));
        }
        self.fetcher.request_pending(transport).await
    }

    /// Consume one inbound frame
    ///
    /// Dispatches pending-message batches to the fetcher (returning the
    /// batch outcome), pongs to the session's clock tracking, and error
    /// frames to the error taxonomy. A kick clears the session before
    /// the error is returned. Handshake frames arriving outside
    /// [`authenticate`](Self::authenticate) are ignored.
    pub async fn handle_frame(
        &self,
        text: &str,
        transport: &dyn Transport,
    ) -> Result<Option<FetchOutcome>> {
        match Frame::decode(text)? {
            Frame::PendingMessages(batch) => {
                let outcome = self
                    .fetcher
                    .process_batch(batch, transport, self.message_store.as_ref(), &self.session)
                    .await?;
                Ok(Some(outcome))
            }
            Frame::Pong(pong) => {
                self.session
                    .record_server_time(pong.server_time, self.clock.now_millis());
                Ok(None)
            }
            Frame::Error(payload) => {
                let err = payload.to_error();
                if matches!(err, Error::Kicked(_)) {
                    self.logout()?;
                }
                Err(err)
            }
            other => {
                tracing::debug!("Ignoring frame outside handshake: {:?}", other);
                Ok(None)
            }
        }
    }

    /// React to the transport closing
    ///
    /// A kick close code forces logout and surfaces [`Error::Kicked`];
    /// any other close becomes [`Error::TransportClosed`] for the
    /// reconnect loop to classify.
    pub fn handle_close(&self, code: u16, reason: &str) -> Result<()> {
        if close_indicates_kick(code) {
            tracing::warn!("Kicked by server: {}", reason);
            self.logout()?;
            return Err(Error::Kicked(reason.to_string()));
        }
        Err(Error::TransportClosed {
            code,
            reason: reason.to_string(),
        })
    }

    /// Send a keepalive ping, rate limited to the configured interval
    ///
    /// Returns whether a ping was actually sent.
    pub async fn heartbeat(&self, transport: &dyn Transport) -> Result<bool> {
        if !self.is_authenticated() {
            return Err(Error::AuthFailed("No active session".to_string()));
        }
        let ping = Envelope::new(
            msg_type::PING,
            &PingPayload {
                timestamp: self.clock.now_millis(),
            },
        )?;
        match self
            .heartbeat
            .execute_if_allowed(transport.send_envelope(&ping))
            .await
        {
            Some(result) => result.map(|_| true),
            None => Ok(false),
        }
    }

    /// Fresh reconnect bookkeeping for the shell's connection loop
    pub fn reconnect_state(&self) -> ReconnectState {
        ReconnectState::new(self.config.reconnect)
    }

    // ========================================================================
    // Component access
    // ========================================================================

    /// The encrypted attachment pipeline
    pub fn attachments(&self) -> &AttachmentPipeline {
        &self.attachments
    }

    /// The backlog fetcher, for cursor inspection and seeding
    pub fn fetcher(&self) -> &PendingMessageFetcher {
        &self.fetcher
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Whisper Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{
        HttpResponse, PresignDownload, PresignDownloadRequest, PresignUpload, PresignUploadRequest,
    };
    use crate::network::CLOSE_CODE_KICKED;
    use crate::storage::{InMemoryMessageStore, MemorySecureStore};
    use crate::time::{Clock, ManualClock};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct NullBlobs;

    #[async_trait]
    impl BlobApi for NullBlobs {
        async fn presign_upload(
            &self,
            _token: &str,
            _request: &PresignUploadRequest,
        ) -> Result<PresignUpload> {
            Err(Error::PresignFailed("unavailable".to_string()))
        }

        async fn presign_download(
            &self,
            _token: &str,
            _request: &PresignDownloadRequest,
        ) -> Result<PresignDownload> {
            Err(Error::PresignFailed("unavailable".to_string()))
        }
    }

    #[async_trait]
    impl BlobTransfer for NullBlobs {
        async fn put(
            &self,
            _url: &str,
            _headers: &HashMap<String, String>,
            _body: Bytes,
        ) -> Result<HttpResponse> {
            Err(Error::UploadFailed(503))
        }

        async fn get(&self, _url: &str) -> Result<HttpResponse> {
            Err(Error::DownloadFailed(503))
        }
    }

    struct MockTransport {
        sent: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, text: String) -> Result<()> {
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&self, _code: u16, _reason: &str) -> Result<()> {
            Ok(())
        }
    }

    fn core_with_clock(clock: Arc<ManualClock>) -> WhisperCore {
        WhisperCore::with_clock(
            WhisperConfig::default(),
            Arc::new(MemorySecureStore::new()),
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(NullBlobs),
            Arc::new(NullBlobs),
            clock,
        )
    }

    fn install_session(core: &WhisperCore, clock: &ManualClock) {
        core.session.store(
            Session {
                whisper_id: "WSP-AAAA-BBBB-CCCC".to_string(),
                session_token: "tok-1".to_string(),
                session_expires_at: clock.now_millis() + 100_000,
                server_time: clock.now_millis(),
            },
            clock.now_millis(),
        );
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_identity_create_and_reload() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemorySecureStore::new());
        let core = WhisperCore::with_clock(
            WhisperConfig::default(),
            Arc::clone(&store) as Arc<dyn SecureStore>,
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(NullBlobs),
            Arc::new(NullBlobs),
            Arc::clone(&clock) as SharedClock,
        );

        assert!(!core.has_identity());
        let recovery = core.create_identity().unwrap();
        assert_eq!(recovery.words().len(), 12);
        assert!(core.has_identity());
        let device_id = core.device_id().unwrap();

        // A second core over the same store sees the same identity
        let reloaded = WhisperCore::with_clock(
            WhisperConfig::default(),
            store,
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(NullBlobs),
            Arc::new(NullBlobs),
            clock,
        );
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.device_id().unwrap(), device_id);
    }

    #[test]
    fn test_load_without_identity() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(clock);

        assert!(!core.load().unwrap());
        assert!(!core.has_identity());
    }

    #[test]
    fn test_load_discards_expired_session() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemorySecureStore::new());
        let core = WhisperCore::with_clock(
            WhisperConfig::default(),
            Arc::clone(&store) as Arc<dyn SecureStore>,
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(NullBlobs),
            Arc::new(NullBlobs),
            Arc::clone(&clock) as SharedClock,
        );
        core.create_identity().unwrap();

        let expired = Session {
            whisper_id: "WSP-AAAA-BBBB-CCCC".to_string(),
            session_token: "tok-stale".to_string(),
            session_expires_at: 500_000,
            server_time: 400_000,
        };
        store
            .store(keys::SESSION, &serde_json::to_vec(&expired).unwrap())
            .unwrap();

        assert!(core.load().unwrap());
        assert!(!core.is_authenticated());
        assert!(store.retrieve(keys::SESSION).unwrap().is_none());
    }

    #[test]
    fn test_logout_clears_memory_and_store() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);
        core.secure_store.store(keys::SESSION, b"{}").unwrap();

        assert!(core.is_authenticated());
        core.logout().unwrap();
        assert!(!core.is_authenticated());
        assert!(core.secure_store.retrieve(keys::SESSION).unwrap().is_none());

        // Logging out twice is harmless
        core.logout().unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_is_rate_limited() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);
        let transport = MockTransport::new();

        assert!(core.heartbeat(&transport).await.unwrap());
        assert!(!core.heartbeat(&transport).await.unwrap());
        assert_eq!(transport.sent.lock().len(), 1);

        clock.advance(HEARTBEAT_INTERVAL_MS);
        assert!(core.heartbeat(&transport).await.unwrap());
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_requires_session() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(clock);
        let transport = MockTransport::new();

        let err = core.heartbeat(&transport).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pong_updates_clock_offset() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);
        let transport = MockTransport::new();

        let pong = r#"{"type":"pong","payload":{"timestamp":1000000,"serverTime":1003000}}"#;
        let outcome = core.handle_frame(pong, &transport).await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(core.session.clock_offset_ms(), 3_000);
    }

    #[tokio::test]
    async fn test_kick_error_frame_clears_session() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);
        let transport = MockTransport::new();

        let frame =
            r#"{"type":"error","payload":{"code":"AUTH_FAILED","message":"new_session elsewhere"}}"#;
        let err = core.handle_frame(frame, &transport).await.unwrap_err();
        assert!(matches!(err, Error::Kicked(_)));
        assert!(!core.is_authenticated());
    }

    #[test]
    fn test_kick_close_code_clears_session() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);

        let err = core.handle_close(CLOSE_CODE_KICKED, "replaced").unwrap_err();
        assert!(matches!(err, Error::Kicked(reason) if reason == "replaced"));
        assert!(!core.is_authenticated());
    }

    #[test]
    fn test_normal_close_is_not_a_kick() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);

        let err = core.handle_close(1006, "gone").unwrap_err();
        assert!(matches!(err, Error::TransportClosed { code: 1006, .. }));
        // The session survives an ordinary drop
        assert!(core.is_authenticated());
    }

    #[tokio::test]
    async fn test_fetch_pending_requires_session() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(clock);
        let transport = MockTransport::new();

        let err = core.fetch_pending(&transport).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pending_batch_flows_to_store_and_receipts() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(Arc::clone(&clock));
        install_session(&core, &clock);
        let transport = MockTransport::new();

        let nonce = "A".repeat(32);
        let sig = format!("{}==", "A".repeat(86));
        let frame = format!(
            concat!(
                r#"{{"type":"pending_messages","payload":{{"messages":[{{"#,
                r#""messageId":"m-1","from":"WSP-DDDD-EEEE-FFFF","to":"WSP-AAAA-BBBB-CCCC","#,
                r#""msgType":"send_message","timestamp":999000,"#,
                r#""nonce":"{}","ciphertext":"Y3Q=","sig":"{}"}}],"nextCursor":"cur-1"}}}}"#
            ),
            nonce, sig
        );

        let outcome = core
            .handle_frame(&frame, &transport)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.persisted, 1);
        assert!(core.message_store.exists("m-1").await.unwrap());
        assert_eq!(core.fetcher().cursor().as_deref(), Some("cur-1"));
        // Exactly one delivery receipt on the wire
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_without_identity_fails() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let core = core_with_clock(clock);
        let transport = MockTransport::new();
        let (_tx, mut rx) = mpsc::channel(4);

        let err = core.authenticate(&transport, &mut rx).await.unwrap_err();
        assert_eq!(err, Error::NoIdentity);
    }
}

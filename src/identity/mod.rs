//! # Identity Module
//!
//! This module handles user identity creation, recovery, and management.
//!
//! ## Identity Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         IDENTITY SYSTEM                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     USER IDENTITY                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Recovery Phrase (12 or 24 words)                               │   │
//! │  │         │                                                       │   │
//! │  │         ▼  BIP39 + HKDF key schedule                            │   │
//! │  │  ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐   │   │
//! │  │  │ Signing KeyPair │ │ Encryption      │ │ Contacts Key    │   │   │
//! │  │  │ (Ed25519)       │ │ KeyPair (X25519)│ │ (symmetric)     │   │   │
//! │  │  │                 │ │                 │ │                 │   │   │
//! │  │  │ • Sign messages │ │ • Key exchange  │ │ • Seals contact │   │   │
//! │  │  │ • Prove identity│ │ • E2E encryption│ │   backups       │   │   │
//! │  │  └─────────────────┘ └─────────────────┘ └─────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │  WhisperID: WSP-XXXX-XXXX-XXXX  (assigned by server)            │   │
//! │  │  DeviceID:  random UUID          (generated locally, stable)    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! | Event | WhisperID | Keys |
//! |-------|-----------|------|
//! | Create | `None` until first registration ack | Derived from fresh phrase |
//! | Recover | Supplied by the user, confirmed by server | Re-derived, identical |
//! | Registration ack | Assigned or confirmed | Unchanged |
//!
//! The keypairs are deterministic functions of the recovery phrase, so
//! recovering on a new device reproduces the exact same identity. The
//! server only ever sees the public halves.

mod recovery;

pub use recovery::{RecoveryPhrase, WORD_COUNT, WORD_COUNT_LONG};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{derive_from_seed, EncryptionKeyPair, SecretKey, SigningKeyPair};
use crate::error::{Error, Result};

/// A user's complete identity: keypairs plus server-assigned naming
///
/// ## Security
///
/// - Contains private keys - handle with care
/// - Key material is zeroized when dropped
/// - Should only exist in memory while needed
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    /// Server-assigned WhisperID, `None` until first registration
    #[zeroize(skip)]
    whisper_id: Option<String>,

    /// Stable per-install device identifier (UUID v4)
    #[zeroize(skip)]
    device_id: String,

    /// Ed25519 signing keypair
    #[zeroize(skip)]
    signing: SigningKeyPair,

    /// X25519 encryption keypair
    #[zeroize(skip)]
    encryption: EncryptionKeyPair,

    /// Symmetric key sealing contact backups
    #[zeroize(skip)]
    contacts_key: SecretKey,

    /// When the identity was created (Unix timestamp)
    created_at: i64,
}

impl Identity {
    /// Create a new identity with a random recovery phrase
    ///
    /// ## Returns
    ///
    /// Tuple of (Identity, RecoveryPhrase)
    ///
    /// ## Important
    ///
    /// The recovery phrase should be shown to the user exactly once
    /// and they should be instructed to write it down securely.
    /// It cannot be recovered later!
    pub fn create() -> Result<(Self, RecoveryPhrase)> {
        let recovery = RecoveryPhrase::generate()?;
        let identity = Self::from_recovery_phrase(&recovery)?;
        Ok((identity, recovery))
    }

    /// Derive a fresh identity from a recovery phrase
    ///
    /// The WhisperID starts unset; the first registration handshake
    /// assigns it.
    pub fn from_recovery_phrase(recovery: &RecoveryPhrase) -> Result<Self> {
        let mut seed = recovery.to_seed();
        let derived = derive_from_seed(&seed);
        seed.zeroize();
        let keys = derived?;

        Ok(Self {
            whisper_id: None,
            device_id: Uuid::new_v4().to_string(),
            signing: SigningKeyPair::from_seed(&keys.sign_seed),
            encryption: EncryptionKeyPair::from_seed(&keys.enc_seed),
            contacts_key: SecretKey::from_bytes(keys.contacts_key),
            created_at: crate::time::now_timestamp(),
        })
    }

    /// Recover an existing identity on a new device
    ///
    /// The user supplies both the phrase and their known WhisperID; the
    /// server confirms the pairing during the handshake.
    pub fn recover(recovery: &RecoveryPhrase, whisper_id: &str) -> Result<Self> {
        if !is_valid_whisper_id(whisper_id) {
            return Err(Error::InvalidPayload(format!(
                "Malformed WhisperID: {}",
                whisper_id
            )));
        }

        let mut identity = Self::from_recovery_phrase(recovery)?;
        identity.whisper_id = Some(whisper_id.to_string());
        Ok(identity)
    }

    /// Get the WhisperID, if assigned
    pub fn whisper_id(&self) -> Option<&str> {
        self.whisper_id.as_deref()
    }

    /// Get the device identifier
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Get when the identity was created
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Get the public key halves (safe to share)
    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            signing: self.signing.public_bytes(),
            encryption: self.encryption.public_bytes(),
        }
    }

    /// Get the signing keypair
    pub fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    /// Get the encryption keypair
    pub fn encryption(&self) -> &EncryptionKeyPair {
        &self.encryption
    }

    /// Get the contacts backup key
    pub fn contacts_key(&self) -> &SecretKey {
        &self.contacts_key
    }

    /// Record the WhisperID the server assigned or confirmed
    ///
    /// ## Errors
    ///
    /// Fails if the ID is malformed, or if a different ID was already
    /// assigned (the server must never rename an identity).
    pub fn assign_whisper_id(&mut self, whisper_id: &str) -> Result<()> {
        if !is_valid_whisper_id(whisper_id) {
            return Err(Error::InvalidPayload(format!(
                "Malformed WhisperID: {}",
                whisper_id
            )));
        }

        match &self.whisper_id {
            Some(existing) if existing != whisper_id => Err(Error::AuthFailed(format!(
                "Server returned WhisperID {} for identity {}",
                whisper_id, existing
            ))),
            _ => {
                self.whisper_id = Some(whisper_id.to_string());
                Ok(())
            }
        }
    }

    /// Create an independent copy for passing into service constructors.
    ///
    /// Reconstructs the keypairs from their seed bytes rather than using
    /// `Clone` (which is intentionally not derived due to `ZeroizeOnDrop`).
    /// The new identity fully owns its own key material.
    pub fn clone_for_service(&self) -> Self {
        Self {
            whisper_id: self.whisper_id.clone(),
            device_id: self.device_id.clone(),
            signing: SigningKeyPair::from_seed(&self.signing.seed_bytes()),
            encryption: EncryptionKeyPair::from_seed(&self.encryption.secret_bytes()),
            contacts_key: self.contacts_key.clone(),
            created_at: self.created_at,
        }
    }

    /// Snapshot this identity for secure storage
    pub fn to_stored(&self) -> StoredIdentity {
        StoredIdentity {
            whisper_id: self.whisper_id.clone(),
            device_id: self.device_id.clone(),
            sign_seed: BASE64.encode(self.signing.seed_bytes()),
            enc_seed: BASE64.encode(self.encryption.secret_bytes()),
            contacts_key: BASE64.encode(self.contacts_key.as_bytes()),
            created_at: self.created_at,
        }
    }

    /// Rebuild an identity from its stored form
    pub fn from_stored(stored: &StoredIdentity) -> Result<Self> {
        let sign_seed = decode_key(&stored.sign_seed)?;
        let enc_seed = decode_key(&stored.enc_seed)?;
        let contacts_key = decode_key(&stored.contacts_key)?;

        Ok(Self {
            whisper_id: stored.whisper_id.clone(),
            device_id: stored.device_id.clone(),
            signing: SigningKeyPair::from_seed(&sign_seed),
            encryption: EncryptionKeyPair::from_seed(&enc_seed),
            contacts_key: SecretKey::from_bytes(contacts_key),
            created_at: stored.created_at,
        })
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("whisper_id", &self.whisper_id)
            .field("device_id", &self.device_id)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

fn decode_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| Error::StorageCorrupted("Stored key is not valid base64".into()))?;
    bytes
        .try_into()
        .map_err(|_| Error::StorageCorrupted("Stored key has wrong length".into()))
}

/// Check that a WhisperID has the `WSP-XXXX-XXXX-XXXX` shape
///
/// The ID is otherwise opaque; only the server mints them.
pub fn is_valid_whisper_id(id: &str) -> bool {
    let mut parts = id.split('-');

    if parts.next() != Some("WSP") {
        return false;
    }

    let mut groups = 0;
    for part in parts {
        if part.len() != 4 || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
            return false;
        }
        groups += 1;
    }

    groups == 3
}

/// Public key halves of an identity (safe to transmit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Ed25519 verifying key
    pub signing: [u8; 32],
    /// X25519 public key
    pub encryption: [u8; 32],
}

impl PublicKeys {
    /// Base64 of the signing public key (wire form)
    pub fn signing_base64(&self) -> String {
        BASE64.encode(self.signing)
    }

    /// Base64 of the encryption public key (wire form)
    pub fn encryption_base64(&self) -> String {
        BASE64.encode(self.encryption)
    }
}

/// Serialized identity as written to secure storage
///
/// Seeds and keys are base64; the storage layer is responsible for
/// encryption at rest.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredIdentity {
    pub whisper_id: Option<String>,
    pub device_id: String,
    pub sign_seed: String,
    pub enc_seed: String,
    pub contacts_key: String,
    pub created_at: i64,
}

impl std::fmt::Debug for StoredIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredIdentity")
            .field("whisper_id", &self.whisper_id)
            .field("device_id", &self.device_id)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

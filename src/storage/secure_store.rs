//! # Secure Storage
//!
//! Platform-agnostic secure key-value storage for sensitive records:
//! the identity key material and the live session.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SecureStore Trait                                              │   │
//! │  │  ──────────────────                                              │   │
//! │  │                                                                 │   │
//! │  │  • store(key, value)   - Store encrypted data                  │   │
//! │  │  • retrieve(key)       - Retrieve and decrypt data             │   │
//! │  │  • delete(key)         - Securely delete data                  │   │
//! │  │  • exists(key)         - Check if key exists                   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  The embedding shell provides the real backend:                        │
//! │  ───────────────────────────────────────────────                        │
//! │                                                                         │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐              │
//! │  │     iOS       │  │   Android     │  │    Tests      │              │
//! │  │   Keychain    │  │  Keystore +   │  │ MemorySecure- │              │
//! │  │               │  │  Encrypted    │  │ Store         │              │
//! │  │ - Hardware-   │  │  SharedPrefs  │  │               │              │
//! │  │   backed      │  │ - Hardware-   │  │ - Optional    │              │
//! │  │ - Biometric   │  │   backed      │  │   envelope    │              │
//! │  │   optional    │  │               │  │   encryption  │              │
//! │  └───────────────┘  └───────────────┘  └───────────────┘              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What We Store
//!
//! | Key | Record | Contains secrets? |
//! |-----|--------|-------------------|
//! | `whisper.identity` | Serialized [`StoredIdentity`] | Yes (seeds, contacts key) |
//! | `whisper.session` | Serialized [`Session`] | Yes (bearer token) |
//!
//! Reads come back wrapped in [`Zeroizing`] so decrypted secrets are
//! scrubbed when the caller drops them.
//!
//! [`StoredIdentity`]: crate::identity::StoredIdentity
//! [`Session`]: crate::session::Session

use std::collections::HashMap;

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::crypto::{open, seal, Nonce, SecretKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Key names for secure storage
pub mod keys {
    /// The serialized identity (seeds + naming)
    pub const IDENTITY: &str = "whisper.identity";

    /// The serialized live session
    pub const SESSION: &str = "whisper.session";
}

/// Secure storage interface
///
/// Implemented by the embedding shell over the platform keychain or
/// keystore. The in-crate [`MemorySecureStore`] backs tests and
/// development builds.
pub trait SecureStore: Send + Sync {
    /// Store data under a key, replacing any previous value
    fn store(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve data for a key
    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Delete data for a key, returning whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a key exists
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.retrieve(key)?.is_some())
    }
}

/// In-memory [`SecureStore`] with optional encryption at rest
///
/// With an encryption key, values are sealed as `nonce || ciphertext`
/// before hitting the map, mimicking what a real keystore-wrapped
/// backend does.
pub struct MemorySecureStore {
    memory: RwLock<HashMap<String, Vec<u8>>>,
    encryption_key: Option<SecretKey>,
}

impl MemorySecureStore {
    /// Create a plaintext in-memory store
    pub fn new() -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            encryption_key: None,
        }
    }

    /// Create a store that encrypts every value at rest
    pub fn with_encryption(key: [u8; 32]) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            encryption_key: Some(SecretKey::from_bytes(key)),
        }
    }
}

impl Default for MemorySecureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureStore for MemorySecureStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let data = if let Some(ref enc_key) = self.encryption_key {
            let (nonce, ciphertext) = seal(enc_key, value)?;
            let mut sealed = nonce.as_bytes().to_vec();
            sealed.extend_from_slice(&ciphertext);
            sealed
        } else {
            value.to_vec()
        };

        self.memory.write().insert(key.to_string(), data);
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let data = match self.memory.read().get(key) {
            Some(d) => d.clone(),
            None => return Ok(None),
        };

        let result = if let Some(ref enc_key) = self.encryption_key {
            if data.len() < NONCE_SIZE + TAG_SIZE {
                return Err(Error::StorageCorrupted(format!(
                    "Sealed record too short: {} bytes",
                    data.len()
                )));
            }

            let nonce = Nonce::from_slice(&data[..NONCE_SIZE])?;
            Zeroizing::new(open(enc_key, &nonce, &data[NONCE_SIZE..])?)
        } else {
            Zeroizing::new(data)
        };

        Ok(Some(result))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.memory.write().remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.memory.read().contains_key(key))
    }
}

// ============================================================================
// TESTS
// ============================================================================

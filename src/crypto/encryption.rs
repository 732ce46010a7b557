//! # Symmetric Encryption
//!
//! XChaCha20-Poly1305 authenticated encryption, the protocol's symmetric
//! primitive for message bodies, attachment payloads, wrapped file keys,
//! and contacts backups.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SECRETBOX SEAL / OPEN                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  seal(key, plaintext)                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  1. nonce    ← 24 random bytes from the OS CSPRNG           │       │
//! │  │  2. ct       ← XChaCha20-Poly1305(key, nonce, plaintext)    │       │
//! │  │                                                             │       │
//! │  │  ct length = plaintext length + 16-byte Poly1305 tag        │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  open(key, nonce, ct)                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Verifies the tag, then returns the plaintext.              │       │
//! │  │  Any tamper, wrong key, or wrong nonce → DecryptionFailed.  │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | Only key holders can read the plaintext |
//! | Integrity | Any modification is detected by the tag |
//! | Nonce safety | 24-byte random nonces make collisions negligible |
//!
//! Sizes are validated before any AEAD call: keys must be exactly
//! 32 bytes and nonces exactly 24 bytes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the XChaCha20 nonce in bytes (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Maximum size of a sealed contacts backup payload
pub const MAX_BACKUP_SIZE: usize = 256 * 1024;

/// A nonce (number used once) for XChaCha20-Poly1305
///
/// ## Critical Security Requirement
///
/// **Never reuse a nonce with the same key.** Nonces here are 24 bytes
/// and drawn from the OS CSPRNG, so random generation is safe for any
/// realistic message volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 24 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != NONCE_SIZE {
            return Err(Error::InvalidNonceLength(slice.len()));
        }
        let mut bytes = [0u8; NONCE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Encode as standard base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Decode from standard base64 (decoded form must be 24 bytes)
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::InvalidPayload(format!("Nonce is not valid base64: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

/// A 256-bit symmetric key
///
/// Used for conversation keys, per-file attachment keys, and the
/// contacts backup key. Zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Generate a random key from the OS CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_SIZE {
            return Err(Error::InvalidKeyLength(slice.len()));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the raw key bytes
    ///
    /// ## Security Warning
    ///
    /// Only for secure storage or wrapping. Never log or transmit.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// X25519 encryption keypair
///
/// The private key is the 32-byte encryption seed from the key schedule,
/// used directly, so recovery reproduces the identical keypair.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    /// Private encryption key (secret)
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    /// Public encryption key (derived from secret)
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    ///
    /// Only for tests; real identities derive from the key schedule.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create deterministically from the 32-byte encryption seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*seed);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for secure storage only)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// Both parties compute the same shared secret:
    /// alice_secret × bob_public = bob_secret × alice_public.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> SecretKey {
        let their_public = X25519PublicKey::from(*their_public);
        SecretKey(self.secret.diffie_hellman(&their_public).to_bytes())
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext under a symmetric key
///
/// Generates a fresh random nonce per call.
///
/// ## Returns
///
/// `(nonce, ciphertext)` where the ciphertext is the plaintext length
/// plus the 16-byte authentication tag.
pub fn seal(key: &SecretKey, plaintext: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let ciphertext = seal_with_nonce(key, &nonce, plaintext)?;
    Ok((nonce, ciphertext))
}

/// Encrypt plaintext under a symmetric key with a caller-chosen nonce
///
/// The caller is responsible for nonce uniqueness.
pub fn seal_with_nonce(key: &SecretKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    cipher
        .encrypt(XNonce::from_slice(&nonce.0), plaintext)
        .map_err(|_| Error::EncryptionFailed("AEAD seal failed".into()))
}

/// Decrypt ciphertext under a symmetric key
///
/// ## Errors
///
/// Returns [`Error::DecryptionFailed`] if the ciphertext was tampered
/// with, or the key or nonce is wrong.
pub fn open(key: &SecretKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    cipher
        .decrypt(XNonce::from_slice(&nonce.0), ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

// ============================================================================
// KEY WRAPPING
// ============================================================================

/// A symmetric key encrypted under another symmetric key
///
/// Attachments use this to carry their per-file key: the file key is
/// sealed under the conversation's shared key, so only conversation
/// participants can recover it. Serializes with the wire's camelCase
/// base64 fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBox {
    /// Nonce used to seal the wrapped key (base64, 24 bytes)
    #[serde(with = "nonce_base64")]
    pub nonce: Nonce,
    /// The sealed 32-byte key plus tag (base64)
    #[serde(with = "bytes_base64")]
    pub ciphertext: Vec<u8>,
}

/// Seal a key under a wrapping key
pub fn seal_key(wrapping_key: &SecretKey, key: &SecretKey) -> Result<KeyBox> {
    let (nonce, ciphertext) = seal(wrapping_key, key.as_bytes())?;
    Ok(KeyBox { nonce, ciphertext })
}

/// Open a [`KeyBox`] with the wrapping key
pub fn open_key(wrapping_key: &SecretKey, key_box: &KeyBox) -> Result<SecretKey> {
    let bytes = open(wrapping_key, &key_box.nonce, &key_box.ciphertext)?;
    SecretKey::from_slice(&bytes)
}

// ============================================================================
// CONTACTS BACKUP
// ============================================================================

/// Seal a contacts export under the contacts key
///
/// Produces a self-contained base64 blob (`nonce || ciphertext`) ready
/// for the backup API. Rejects payloads over [`MAX_BACKUP_SIZE`].
pub fn seal_contacts_backup(contacts_key: &SecretKey, payload: &[u8]) -> Result<String> {
    if payload.len() > MAX_BACKUP_SIZE {
        return Err(Error::InvalidPayload(format!(
            "Contacts backup too large: {} bytes (max {})",
            payload.len(),
            MAX_BACKUP_SIZE
        )));
    }

    let (nonce, ciphertext) = seal(contacts_key, payload)?;
    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(nonce.as_bytes());
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

/// Open a sealed contacts backup blob
pub fn open_contacts_backup(contacts_key: &SecretKey, blob: &str) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(blob)
        .map_err(|e| Error::InvalidPayload(format!("Backup is not valid base64: {}", e)))?;

    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::InvalidPayload(format!(
            "Backup blob too short: {} bytes",
            bytes.len()
        )));
    }

    let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE])?;
    open(contacts_key, &nonce, &bytes[NONCE_SIZE..])
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// Serde helper for [`Nonce`] as base64
pub(crate) mod nonce_base64 {
    use super::Nonce;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(nonce: &Nonce, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(nonce.0))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Nonce, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        let bytes: [u8; super::NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid nonce length"))?;
        Ok(Nonce(bytes))
    }
}

/// Serde helper for byte vectors as base64
pub(crate) mod bytes_base64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Digital Signatures
//!
//! Ed25519 signing for identity proof and message authentication.
//!
//! ## Signature Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SIGNING FLOW                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER                                RECIPIENT (or anyone)            │
//! │  ──────────────────────────            ───────────────────────────     │
//! │                                                                         │
//! │  ┌──────────────┐                      ┌──────────────────────────┐    │
//! │  │   message    │                      │ message + sig + pub key  │    │
//! │  └──────┬───────┘                      └──────────┬───────────────┘    │
//! │         │                                          │                    │
//! │         ▼                                          ▼                    │
//! │  ┌──────────────────────┐              ┌──────────────────────┐        │
//! │  │    Ed25519 Sign      │              │   Ed25519 Verify     │        │
//! │  │                      │              │                      │        │
//! │  │  sign seed (32 B)    │              │  public key (32 B)   │        │
//! │  │  → signature (64 B)  │              │  → valid / invalid   │        │
//! │  └──────────────────────┘              └──────────────────────┘        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Description |
//! |----------|-------------|
//! | Authenticity | Verifies the message came from the claimed sender |
//! | Integrity | Detects any modification to the signed message |
//! | Determinism | Same message and key always produce the same signature |
//! | Public Verification | Anyone with the public key can verify |

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Size of an Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signing keypair
///
/// Built deterministically from the 32-byte sign seed produced by the
/// key schedule, so a recovered phrase reproduces the identical keypair.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    ///
    /// Only for tests and throwaway identities; real identities come
    /// from [`from_seed`](Self::from_seed) so they can be recovered.
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self { secret }
    }

    /// Create deterministically from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let secret = SigningKey::from_bytes(seed);
        Self { secret }
    }

    /// Get the seed bytes (for secure storage only)
    ///
    /// ## Security Warning
    ///
    /// Never log or transmit these bytes.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    /// Get reference to the signing key
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// An Ed25519 digital signature
///
/// Serializes as standard base64, the protocol's encoding for signature
/// fields on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_base64")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(Error::InvalidSignatureLength(slice.len()));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Encode as standard base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Decode from standard base64 (decoded form must be 64 bytes)
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::InvalidPayload(format!("Signature is not valid base64: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sign a message using Ed25519
///
/// ## Security Note
///
/// Ed25519 signatures are deterministic: signing the same message with
/// the same key always produces the same signature.
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature
///
/// ## Returns
///
/// `Ok(true)` if the signature is valid for `message` under
/// `public_key`, `Ok(false)` if it is not. An error is returned only
/// when the public key itself is structurally invalid.
pub fn verify(public_key: &[u8; PUBLIC_KEY_SIZE], message: &[u8], signature: &Signature) -> Result<bool> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))?;

    let sig = Ed25519Signature::from_bytes(&signature.0);

    Ok(verifying_key.verify(message, &sig).is_ok())
}

/// Serde helper for signature bytes as base64
mod signature_base64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid signature length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

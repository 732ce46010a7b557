//! # Canonical Message Signing
//!
//! Every protocol message is signed over a deterministic serialization of
//! its fields, so signer and verifier are guaranteed to compute identical
//! bytes regardless of platform or JSON field ordering.
//!
//! ## Canonical Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CANONICAL STRING (v1)                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   "v1\n"                                                                │
//! │   messageType        "\n"                                               │
//! │   messageId          "\n"                                               │
//! │   from               "\n"                                               │
//! │   toOrGroupId        "\n"                                               │
//! │   timestamp          "\n"     (decimal Unix millis)                     │
//! │   base64(nonce)      "\n"                                               │
//! │   base64(ciphertext) "\n"     (trailing newline mandatory)              │
//! │                                                                         │
//! │   signature = Ed25519( SHA-256( canonical UTF-8 bytes ) )               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The SHA-256 pre-hash is part of the frozen format: implementations
//! sign the digest, not the raw string. Any single-field substitution
//! changes the digest and fails verification.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

use crate::crypto::signing::{sign, verify, Signature, SigningKeyPair, PUBLIC_KEY_SIZE};
use crate::error::Result;

/// Version prefix of the canonical format
pub const CANONICAL_VERSION: &str = "v1";

/// Fields covered by a canonical message signature
///
/// Borrowed view so callers can sign without cloning ciphertexts.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalFields<'a> {
    /// Message type constant (e.g. `"send_message"`)
    pub message_type: &'a str,
    /// Unique message id
    pub message_id: &'a str,
    /// Sender whisper id
    pub from: &'a str,
    /// Recipient whisper id, or the group id for group messages
    pub to_or_group_id: &'a str,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Encryption nonce (raw bytes; base64 happens here)
    pub nonce: &'a [u8],
    /// Message ciphertext (raw bytes; base64 happens here)
    pub ciphertext: &'a [u8],
}

/// Build the canonical string for a message
///
/// Byte-for-byte reproducible: the same fields always produce the same
/// string, including the trailing newline.
pub fn build_canonical_string(fields: &CanonicalFields<'_>) -> String {
    let mut canonical = String::new();
    canonical.push_str(CANONICAL_VERSION);
    canonical.push('\n');
    canonical.push_str(fields.message_type);
    canonical.push('\n');
    canonical.push_str(fields.message_id);
    canonical.push('\n');
    canonical.push_str(fields.from);
    canonical.push('\n');
    canonical.push_str(fields.to_or_group_id);
    canonical.push('\n');
    canonical.push_str(&fields.timestamp.to_string());
    canonical.push('\n');
    canonical.push_str(&BASE64.encode(fields.nonce));
    canonical.push('\n');
    canonical.push_str(&BASE64.encode(fields.ciphertext));
    canonical.push('\n');
    canonical
}

/// SHA-256 digest of the canonical string
pub fn canonical_digest(fields: &CanonicalFields<'_>) -> [u8; 32] {
    sha256(build_canonical_string(fields).as_bytes())
}

/// Sign a message over its canonical form
pub fn sign_message(keypair: &SigningKeyPair, fields: &CanonicalFields<'_>) -> Signature {
    sign_sha256(keypair, build_canonical_string(fields).as_bytes())
}

/// Verify a message signature against the claimed fields
///
/// Recomputes the canonical string from the claimed fields and checks
/// the signature under the claimed sender's public signing key.
pub fn verify_message(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    fields: &CanonicalFields<'_>,
    signature: &Signature,
) -> Result<bool> {
    let digest = canonical_digest(fields);
    verify(public_key, &digest, signature)
}

/// Sign the SHA-256 digest of arbitrary bytes
///
/// The hash-then-sign form is shared by canonical message signing and
/// the handshake's challenge proof.
pub fn sign_sha256(keypair: &SigningKeyPair, data: &[u8]) -> Signature {
    sign(keypair, &sha256(data))
}

/// Verify a signature over the SHA-256 digest of arbitrary bytes
pub fn verify_sha256(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    data: &[u8],
    signature: &Signature,
) -> Result<bool> {
    verify(public_key, &sha256(data), signature)
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ============================================================================
// TESTS
// ============================================================================

//! # Cryptography Module
//!
//! This module provides all cryptographic primitives used by Whisper Core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY HIERARCHY                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Recovery Phrase (BIP39 - 12 or 24 words)                      │   │
//! │  │                          │                                      │   │
//! │  │                          ▼                                      │   │
//! │  │  ┌─────────────────────────────────────────────────────────┐   │   │
//! │  │  │              Master Seed (512 bits)                      │   │   │
//! │  │  │         Derived via PBKDF2-SHA512 (2048 rounds)         │   │   │
//! │  │  └─────────────────────────────────────────────────────────┘   │   │
//! │  │                          │                                      │   │
//! │  │                HKDF-SHA256, salt "whisper"                     │   │
//! │  │        ┌─────────────────┼──────────────────┐                  │   │
//! │  │        ▼                 ▼                  ▼                  │   │
//! │  │  ┌───────────┐    ┌───────────┐     ┌────────────┐           │   │
//! │  │  │Encryption │    │  Signing  │     │  Contacts  │           │   │
//! │  │  │ (X25519)  │    │ (Ed25519) │     │Backup Key  │           │   │
//! │  │  │           │    │           │     │            │           │   │
//! │  │  │"whisper/  │    │"whisper/  │     │"whisper/   │           │   │
//! │  │  │ enc"      │    │ sign"     │     │ contacts"  │           │   │
//! │  │  └───────────┘    └───────────┘     └────────────┘           │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ENCRYPTION SCHEME                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Symmetric Encryption (XChaCha20-Poly1305)                     │   │
//! │  │  ──────────────────────────────────────────                     │   │
//! │  │                                                                 │   │
//! │  │  • 256-bit key                                                 │   │
//! │  │  • 192-bit nonce (random per message)                          │   │
//! │  │  • 128-bit authentication tag                                  │   │
//! │  │                                                                 │   │
//! │  │  Ciphertext = XChaCha20-Poly1305(key, nonce, plaintext)        │   │
//! │  │                                                                 │   │
//! │  │  Conversation keys come from X25519 ECDH:                      │   │
//! │  │     Alice's Private × Bob's Public = Shared Secret            │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SIGNATURE SCHEME                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Digital Signatures (Ed25519, hash-then-sign)                  │   │
//! │  │  ─────────────────────────────────────────────                  │   │
//! │  │                                                                 │   │
//! │  │  1. Canonical string built from the message envelope           │   │
//! │  │  2. SHA-256 digest of the canonical string                     │   │
//! │  │  3. Ed25519 signature over the 32-byte digest                  │   │
//! │  │                                                                 │   │
//! │  │  • Signature size: 64 bytes                                    │   │
//! │  │  • Public key size: 32 bytes                                   │   │
//! │  │  • Deterministic (same message = same signature)              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices & Rationale
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | Ed25519 | Signing | Fast, small keys, widely audited |
//! | X25519 | Key Exchange | Fast ECDH, same curve as Ed25519 |
//! | XChaCha20-Poly1305 | Encryption | Large random nonces, AEAD |
//! | HKDF-SHA256 | Key Derivation | Industry standard, well-analyzed |
//! | BIP39 | Recovery Phrase | User-friendly backup, standard |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: All secret keys are zeroized when dropped
//! 2. **Constant-Time Operations**: Using dalek for constant-time crypto
//! 3. **Secure Random**: Using `rand::rngs::OsRng` for cryptographic randomness
//! 4. **No Key Reuse**: Unique nonces for every encryption operation

mod canonical;
mod encryption;
mod kdf;
mod signing;

pub use canonical::{
    build_canonical_string, canonical_digest, sign_message, sign_sha256, verify_message,
    verify_sha256, CanonicalFields, CANONICAL_VERSION,
};
pub use encryption::{
    open, open_contacts_backup, open_key, seal, seal_contacts_backup, seal_key, seal_with_nonce,
    EncryptionKeyPair, KeyBox, Nonce, SecretKey, MAX_BACKUP_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{derive_all, derive_from_seed, seed_from_mnemonic, DerivedKeys, HKDF_SALT};
pub use signing::{sign, verify, Signature, SigningKeyPair, SIGNATURE_SIZE};

pub(crate) use encryption::{bytes_base64, nonce_base64};

/// Size of symmetric and private keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the BIP39 master seed in bytes (512 bits)
pub const SEED_LENGTH: usize = 64;

//! # Error Handling
//!
//! This module provides the error types for Whisper Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                      │
//! │  │   ├── KeyDerivationFailed   - HKDF/seed expansion failed             │
//! │  │   ├── InvalidSeedLength     - BIP-39 seed is not 64 bytes            │
//! │  │   ├── EncryptionFailed      - AEAD seal failed                       │
//! │  │   ├── DecryptionFailed      - AEAD open failed / tag mismatch        │
//! │  │   ├── InvalidKeyLength      - Symmetric key is not 32 bytes          │
//! │  │   ├── InvalidNonceLength    - Nonce is not 24 bytes                  │
//! │  │   └── InvalidSignatureLength- Signature is not 64 bytes              │
//! │  │                                                                      │
//! │  ├── Identity & Auth Errors                                             │
//! │  │   ├── InvalidMnemonic       - BIP-39 checksum/wordlist failure       │
//! │  │   ├── NoIdentity            - No identity loaded                     │
//! │  │   ├── AuthFailed            - Server rejected authentication         │
//! │  │   ├── Kicked                - Forced logout (new session elsewhere)  │
//! │  │   ├── ChallengeExpired      - Challenge past its expiry              │
//! │  │   ├── InvalidChallenge      - Challenge malformed                    │
//! │  │   ├── ReplayAttempt         - Challenge id seen before               │
//! │  │   ├── NotRegistered         - Server does not know this device      │
//! │  │   └── SessionExpired        - Bearer token past its TTL              │
//! │  │                                                                      │
//! │  ├── Protocol Errors                                                    │
//! │  │   ├── InvalidPayload        - Frame payload failed validation        │
//! │  │   ├── RateLimited           - Server asked us to back off            │
//! │  │   ├── UnexpectedFrame       - Frame type out of sequence             │
//! │  │   ├── TransportError        - Send/receive failure                   │
//! │  │   ├── TransportClosed       - Connection closed (code + reason)      │
//! │  │   └── Timeout               - Network-bound operation timed out      │
//! │  │                                                                      │
//! │  ├── Attachment Errors                                                  │
//! │  │   ├── PresignFailed         - Presign API rejected the request       │
//! │  │   ├── UploadFailed          - Blob PUT returned a bad status         │
//! │  │   ├── DownloadFailed        - Blob GET returned a bad status         │
//! │  │   └── AttachmentTooLarge    - Plaintext over the size limit          │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                     │
//! │  │   ├── StorageReadError      - Collaborator store read failed         │
//! │  │   ├── StorageWriteError     - Collaborator store write failed        │
//! │  │   └── StorageCorrupted      - Persisted record failed to decode      │
//! │  │                                                                      │
//! │  └── Concurrency Errors                                                 │
//! │      └── Cancelled             - Operation cancelled before completion  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for Whisper Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Whisper Core
///
/// All errors are categorized by module/domain to make error handling
/// clearer and to provide meaningful error messages to the shells.
/// Errors are `Clone` so that coalesced callers (see
/// [`crate::sync::SingleFlight`]) can all observe the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Crypto Errors (100-199)
    // ========================================================================

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// BIP-39 seed has the wrong length
    #[error("Invalid seed length: expected 64 bytes, got {0}")]
    InvalidSeedLength(usize),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Symmetric key has the wrong length
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Nonce has the wrong length
    #[error("Invalid nonce length: expected 24 bytes, got {0}")]
    InvalidNonceLength(usize),

    /// Signature has the wrong length
    #[error("Invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    /// Key is structurally invalid (bad encoding, bad curve point)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========================================================================
    // Identity & Auth Errors (200-299)
    // ========================================================================

    /// Invalid BIP-39 mnemonic phrase
    #[error("Invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    /// No identity has been loaded
    #[error("No identity loaded. Create or recover an identity first.")]
    NoIdentity,

    /// Server rejected authentication
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Forced logout: the server terminated this session
    #[error("Kicked by server: {0}")]
    Kicked(String),

    /// Challenge past its expiry timestamp
    #[error("Challenge expired")]
    ChallengeExpired,

    /// Challenge failed structural validation
    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),

    /// Challenge id has already been consumed
    #[error("Challenge replay detected: {0}")]
    ReplayAttempt(String),

    /// Server does not recognize this device
    #[error("Device is not registered")]
    NotRegistered,

    /// Bearer token is past its TTL
    #[error("Session expired")]
    SessionExpired,

    // ========================================================================
    // Protocol Errors (300-399)
    // ========================================================================

    /// Frame payload failed validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Server asked us to back off
    #[error("Rate limited by server")]
    RateLimited,

    /// Frame type arrived out of sequence
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// Transport send/receive failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Connection closed by the far end
    #[error("Transport closed with code {code}: {reason}")]
    TransportClosed { code: u16, reason: String },

    /// Network-bound operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ========================================================================
    // Attachment Errors (400-499)
    // ========================================================================

    /// Presign API rejected the request
    #[error("Presign failed: {0}")]
    PresignFailed(String),

    /// Blob PUT returned a non-success status
    #[error("Upload failed with HTTP status {0}")]
    UploadFailed(u16),

    /// Blob GET returned a non-success status
    #[error("Download failed with HTTP status {0}")]
    DownloadFailed(u16),

    /// Plaintext exceeds the attachment size limit
    #[error("Attachment too large: {0} bytes")]
    AttachmentTooLarge(u64),

    // ========================================================================
    // Storage Errors (500-599)
    // ========================================================================

    /// Failed to read from the collaborator store
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to the collaborator store
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Persisted record failed to decode
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    // ========================================================================
    // Concurrency Errors (600-699)
    // ========================================================================

    /// Operation cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Crypto
    /// - 200-299: Identity & auth
    /// - 300-399: Protocol
    /// - 400-499: Attachments
    /// - 500-599: Storage
    /// - 600-699: Concurrency
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Crypto (100-199)
            Error::KeyDerivationFailed(_) => 100,
            Error::InvalidSeedLength(_) => 101,
            Error::EncryptionFailed(_) => 102,
            Error::DecryptionFailed => 103,
            Error::InvalidKeyLength(_) => 104,
            Error::InvalidNonceLength(_) => 105,
            Error::InvalidSignatureLength(_) => 106,
            Error::InvalidKey(_) => 107,

            // Identity & auth (200-299)
            Error::InvalidMnemonic(_) => 200,
            Error::NoIdentity => 201,
            Error::AuthFailed(_) => 202,
            Error::Kicked(_) => 203,
            Error::ChallengeExpired => 204,
            Error::InvalidChallenge(_) => 205,
            Error::ReplayAttempt(_) => 206,
            Error::NotRegistered => 207,
            Error::SessionExpired => 208,

            // Protocol (300-399)
            Error::InvalidPayload(_) => 300,
            Error::RateLimited => 301,
            Error::UnexpectedFrame(_) => 302,
            Error::TransportError(_) => 303,
            Error::TransportClosed { .. } => 304,
            Error::Timeout(_) => 305,

            // Attachments (400-499)
            Error::PresignFailed(_) => 400,
            Error::UploadFailed(_) => 401,
            Error::DownloadFailed(_) => 402,
            Error::AttachmentTooLarge(_) => 403,

            // Storage (500-599)
            Error::StorageReadError(_) => 500,
            Error::StorageWriteError(_) => 501,
            Error::StorageCorrupted(_) => 502,

            // Concurrency (600-699)
            Error::Cancelled => 600,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can potentially be resolved by retrying
    /// (typically after a reconnect backoff) without user action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited
                | Error::Timeout(_)
                | Error::TransportError(_)
                | Error::TransportClosed { .. }
                | Error::PresignFailed(_)
                | Error::UploadFailed(_)
                | Error::DownloadFailed(_)
                | Error::Cancelled
        )
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::NoIdentity | Error::InvalidMnemonic(_) | Error::Kicked(_) | Error::SessionExpired
        )
    }

    /// Check if this error must terminate the active session
    ///
    /// A kicked or expired session is unusable; callers must tear the
    /// session down and re-authenticate.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Error::Kicked(_) | Error::SessionExpired | Error::AuthFailed(_))
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bip39::Error> for Error {
    fn from(err: bip39::Error) -> Self {
        Error::InvalidMnemonic(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::KeyDerivationFailed("test".into()).code(), 100);
        assert_eq!(Error::InvalidMnemonic("test".into()).code(), 200);
        assert_eq!(Error::InvalidPayload("test".into()).code(), 300);
        assert_eq!(Error::PresignFailed("500".into()).code(), 400);
        assert_eq!(Error::StorageReadError("test".into()).code(), 500);
        assert_eq!(Error::Cancelled.code(), 600);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::RateLimited.is_recoverable());
        assert!(Error::Timeout("fetch".into()).is_recoverable());
        assert!(Error::UploadFailed(503).is_recoverable());
        assert!(!Error::InvalidMnemonic("bad".into()).is_recoverable());
        assert!(!Error::DecryptionFailed.is_recoverable());
    }

    #[test]
    fn test_session_fatal_errors() {
        assert!(Error::Kicked("new_session".into()).is_fatal_to_session());
        assert!(Error::SessionExpired.is_fatal_to_session());
        assert!(!Error::RateLimited.is_fatal_to_session());
    }

    #[test]
    fn test_size_errors_carry_actual_length() {
        let err = Error::InvalidNonceLength(16);
        assert!(err.to_string().contains("16"));
        assert!(err.to_string().contains("24"));
    }
}

//! # Attachments Module
//!
//! End-to-end encrypted file transfer through an untrusted blob store.
//!
//! ## Attachment Encryption Scheme
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ATTACHMENT ENCRYPTION                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Upload:                                                                │
//! │                                                                         │
//! │  plaintext ──XChaCha20-Poly1305──► ciphertext ──PUT──► blob store       │
//! │                  ▲                                                      │
//! │         fileKey (random 32B)                                            │
//! │         fileNonce (random 24B)                                          │
//! │                  │                                                      │
//! │                  └──sealed under conversation key──► fileKeyBox         │
//! │                                                                         │
//! │  AttachmentPointer {objectKey, contentType, ciphertextSize,             │
//! │                     fileNonce, fileKeyBox}                              │
//! │     └─► travels inside the (already encrypted) message                 │
//! │                                                                         │
//! │  Download:                                                              │
//! │                                                                         │
//! │  cache[objectKey]? ──hit──► plaintext (zero network calls)              │
//! │        │ miss                                                           │
//! │        ▼                                                                │
//! │  presign ──► GET ──► open fileKeyBox ──► open body ──► cache, return    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The blob store only ever sees ciphertext and random object keys.
//! Whoever holds the conversation key can recover the file key from the
//! pointer; nobody else can, including the server.

mod cache;
mod pipeline;

pub use cache::LruAttachmentCache;
pub use pipeline::AttachmentPipeline;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyBox, Nonce};
use crate::error::Result;

/// Largest plaintext accepted for upload (100 MiB)
pub const MAX_ATTACHMENT_SIZE: u64 = 100 * 1024 * 1024;

/// Default plaintext cache bounds
pub const DEFAULT_CACHE_ENTRIES: usize = 32;
pub const DEFAULT_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Everything a recipient needs to fetch and decrypt one attachment
///
/// Issued at upload time and never mutated; it rides inside the
/// encrypted body of the message that references the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPointer {
    pub object_key: String,
    pub content_type: String,
    pub ciphertext_size: u64,
    #[serde(with = "crate::crypto::nonce_base64")]
    pub file_nonce: Nonce,
    /// Per-file key sealed under the conversation key
    pub file_key_box: KeyBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

// ============================================================================
// PRESIGN API
// ============================================================================

/// Body of `POST /attachments/presign/upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignUploadRequest {
    pub content_type: String,
    /// Ciphertext size in bytes
    pub size: u64,
}

/// Presigned upload target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignUpload {
    pub object_key: String,
    pub upload_url: String,
    pub expires_at_ms: i64,
    /// Headers the PUT must carry verbatim
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Body of `POST /attachments/presign/download`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignDownloadRequest {
    pub object_key: String,
}

/// Presigned download source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignDownload {
    pub download_url: String,
    pub expires_at_ms: i64,
    pub size_bytes: u64,
    pub content_type: String,
}

/// Authenticated presign API
///
/// Implementations add `Authorization: Bearer <token>` and surface
/// HTTP failures as `PresignFailed`.
#[async_trait]
pub trait BlobApi: Send + Sync {
    async fn presign_upload(
        &self,
        token: &str,
        request: &PresignUploadRequest,
    ) -> Result<PresignUpload>;

    async fn presign_download(
        &self,
        token: &str,
        request: &PresignDownloadRequest,
    ) -> Result<PresignDownload>;
}

/// Raw HTTP exchange against a presigned URL
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Unauthenticated blob mover for presigned URLs
///
/// Presigned URLs embed their own authorization; the transfer client
/// just moves bytes and reports the status it saw.
#[async_trait]
pub trait BlobTransfer: Send + Sync {
    async fn put(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: Bytes,
    ) -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{seal_key, SecretKey};

    #[test]
    fn test_pointer_serialization_shape() {
        let conversation_key = SecretKey::random();
        let file_key = SecretKey::random();
        let pointer = AttachmentPointer {
            object_key: "obj-1".to_string(),
            content_type: "image/png".to_string(),
            ciphertext_size: 1024 + 16,
            file_nonce: Nonce::from_bytes([3u8; 24]),
            file_key_box: seal_key(&conversation_key, &file_key).unwrap(),
            file_name: None,
        };

        let json = serde_json::to_string(&pointer).unwrap();
        assert!(json.contains("\"objectKey\":\"obj-1\""));
        assert!(json.contains("\"contentType\":\"image/png\""));
        assert!(json.contains("\"ciphertextSize\":1040"));
        assert!(json.contains("\"fileNonce\""));
        assert!(json.contains("\"fileKeyBox\""));
        assert!(!json.contains("fileName"));

        let parsed: AttachmentPointer = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pointer);
    }

    #[test]
    fn test_presign_types_use_camel_case() {
        let request = PresignUploadRequest {
            content_type: "video/mp4".to_string(),
            size: 99,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"contentType\""));
        assert!(json.contains("\"size\":99"));

        let response: PresignUpload = serde_json::from_str(
            r#"{"objectKey":"o","uploadUrl":"https://blobs/o","expiresAtMs":5}"#,
        )
        .unwrap();
        assert_eq!(response.object_key, "o");
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_http_response_success_range() {
        let ok = HttpResponse {
            status: 204,
            body: Bytes::new(),
            headers: HashMap::new(),
        };
        assert!(ok.is_success());

        let redirect = HttpResponse {
            status: 301,
            body: Bytes::new(),
            headers: HashMap::new(),
        };
        assert!(!redirect.is_success());
    }
}

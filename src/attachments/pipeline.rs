//! Attachment upload/download orchestration.
//!
//! Ties together the AEAD layer, the presign API, the raw blob mover,
//! the plaintext cache and the in-flight coalescer. Every failure path
//! is typed and leaves no partial state: no pointer without a stored
//! blob, no cache entry without a fully verified decrypt.

use std::sync::Arc;

use bytes::Bytes;

use crate::attachments::{
    AttachmentPointer, BlobApi, BlobTransfer, LruAttachmentCache, PresignDownloadRequest,
    PresignUploadRequest, DEFAULT_CACHE_BYTES, DEFAULT_CACHE_ENTRIES, MAX_ATTACHMENT_SIZE,
};
use crate::crypto::{open, open_key, seal, seal_key, SecretKey};
use crate::error::{Error, Result};
use crate::session::SessionState;
use crate::sync::{CancellationSafeState, SingleFlight};

/// Encrypting blob pipeline
///
/// One instance per authenticated core; safe to share behind an `Arc`
/// and call from any task.
pub struct AttachmentPipeline {
    api: Arc<dyn BlobApi>,
    transfer: Arc<dyn BlobTransfer>,
    session: SessionState,
    cache: LruAttachmentCache,
    downloads: SingleFlight<String, Bytes>,
    active_upload: CancellationSafeState<String>,
    active_download: CancellationSafeState<String>,
}

impl AttachmentPipeline {
    pub fn new(
        api: Arc<dyn BlobApi>,
        transfer: Arc<dyn BlobTransfer>,
        session: SessionState,
    ) -> Self {
        Self::with_cache_bounds(api, transfer, session, DEFAULT_CACHE_ENTRIES, DEFAULT_CACHE_BYTES)
    }

    pub fn with_cache_bounds(
        api: Arc<dyn BlobApi>,
        transfer: Arc<dyn BlobTransfer>,
        session: SessionState,
        max_entries: usize,
        max_total_bytes: usize,
    ) -> Self {
        Self {
            api,
            transfer,
            session,
            cache: LruAttachmentCache::new(max_entries, max_total_bytes),
            downloads: SingleFlight::new(),
            active_upload: CancellationSafeState::new(),
            active_download: CancellationSafeState::new(),
        }
    }

    /// Encrypt and upload, returning the pointer recipients will use
    ///
    /// Order: size check, auth check, encrypt, presign, PUT, seal the
    /// file key. Nothing durable happens before the PUT succeeds, so a
    /// failure anywhere yields an error and no pointer.
    pub async fn upload(
        &self,
        plaintext: &[u8],
        content_type: &str,
        conversation_key: &SecretKey,
    ) -> Result<AttachmentPointer> {
        self.upload_named(plaintext, content_type, conversation_key, None)
            .await
    }

    /// [`upload`](Self::upload) with an original file name in the pointer
    pub async fn upload_named(
        &self,
        plaintext: &[u8],
        content_type: &str,
        conversation_key: &SecretKey,
        file_name: Option<String>,
    ) -> Result<AttachmentPointer> {
        if plaintext.len() as u64 > MAX_ATTACHMENT_SIZE {
            return Err(Error::AttachmentTooLarge(plaintext.len() as u64));
        }
        let token = self.require_token()?;

        let file_key = SecretKey::random();
        let (file_nonce, ciphertext) = seal(&file_key, plaintext)?;
        let ciphertext_size = ciphertext.len() as u64;

        let presign = self
            .api
            .presign_upload(
                &token,
                &PresignUploadRequest {
                    content_type: content_type.to_string(),
                    size: ciphertext_size,
                },
            )
            .await?;

        let object_key = presign.object_key.clone();
        let scope_key = object_key.clone();
        self.active_upload
            .with_value(
                object_key.clone(),
                move || tracing::debug!("Upload scope for {} closed", scope_key),
                async {
                    let response = self
                        .transfer
                        .put(&presign.upload_url, &presign.headers, Bytes::from(ciphertext))
                        .await?;
                    if !response.is_success() {
                        return Err(Error::UploadFailed(response.status));
                    }
                    Ok(())
                },
            )
            .await?;

        let file_key_box = seal_key(conversation_key, &file_key)?;
        tracing::info!(
            "Uploaded attachment {} ({} ciphertext bytes)",
            object_key,
            ciphertext_size
        );
        Ok(AttachmentPointer {
            object_key,
            content_type: content_type.to_string(),
            ciphertext_size,
            file_nonce,
            file_key_box,
            file_name,
        })
    }

    /// Fetch and decrypt an attachment
    ///
    /// A cache hit returns immediately with zero network calls.
    /// Concurrent misses for the same object key share one network
    /// round trip through the in-flight coalescer. Failures never
    /// populate the cache.
    pub async fn download(
        &self,
        pointer: &AttachmentPointer,
        conversation_key: &SecretKey,
    ) -> Result<Bytes> {
        if let Some(hit) = self.cache.get(&pointer.object_key) {
            tracing::debug!("Attachment cache hit for {}", pointer.object_key);
            return Ok(hit);
        }

        self.downloads
            .execute(
                pointer.object_key.clone(),
                self.fetch_and_decrypt(pointer, conversation_key),
            )
            .await
    }

    async fn fetch_and_decrypt(
        &self,
        pointer: &AttachmentPointer,
        conversation_key: &SecretKey,
    ) -> Result<Bytes> {
        // A completed flight may have filled the cache while we queued
        if let Some(hit) = self.cache.get(&pointer.object_key) {
            return Ok(hit);
        }
        let token = self.require_token()?;

        let scope_key = pointer.object_key.clone();
        self.active_download
            .with_value(
                pointer.object_key.clone(),
                move || tracing::debug!("Download scope for {} closed", scope_key),
                async {
                    let presign = self
                        .api
                        .presign_download(
                            &token,
                            &PresignDownloadRequest {
                                object_key: pointer.object_key.clone(),
                            },
                        )
                        .await?;

                    let response = self.transfer.get(&presign.download_url).await?;
                    if !response.is_success() {
                        return Err(Error::DownloadFailed(response.status));
                    }

                    let file_key = open_key(conversation_key, &pointer.file_key_box)?;
                    let plaintext =
                        Bytes::from(open(&file_key, &pointer.file_nonce, &response.body)?);

                    self.cache
                        .insert(pointer.object_key.clone(), plaintext.clone());
                    Ok(plaintext)
                },
            )
            .await
    }

    fn require_token(&self) -> Result<String> {
        self.session
            .token()
            .ok_or_else(|| Error::AuthFailed("No active session".to_string()))
    }

    /// The plaintext cache (for eviction and inspection)
    pub fn cache(&self) -> &LruAttachmentCache {
        &self.cache
    }

    /// Object key of the upload currently in its network phase, if any
    pub fn uploading(&self) -> Option<String> {
        self.active_upload.current()
    }

    /// Object key of a download currently in its network phase, if any
    pub fn downloading(&self) -> Option<String> {
        self.active_download.current()
    }

    pub fn is_downloading(&self, object_key: &str) -> bool {
        self.downloads.is_in_flight(&object_key.to_string())
    }

    pub fn downloads_in_flight(&self) -> usize {
        self.downloads.in_flight_count()
    }

    /// Abort every in-flight download; callers observe `Cancelled`
    pub fn cancel_downloads(&self) {
        self.downloads.cancel_all();
    }
}

// ============================================================================
// TESTS
// ============================================================================

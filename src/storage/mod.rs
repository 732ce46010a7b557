//! # Storage Module
//!
//! Storage surfaces the core depends on. The engine does not own a
//! database; the embedding shell supplies persistence and the core
//! defines the contracts.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SecureStore (trait)                                            │   │
//! │  │  ───────────────────                                             │   │
//! │  │                                                                 │   │
//! │  │  Small secrets: identity seeds, live session.                  │   │
//! │  │  Backed by Keychain / Keystore on device,                      │   │
//! │  │  MemorySecureStore in tests.                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  MessageStore (trait)                                           │   │
//! │  │  ────────────────────                                            │   │
//! │  │                                                                 │   │
//! │  │  Validated inbound messages, keyed by messageId.               │   │
//! │  │  Backed by the shell's database (Room / CoreData);             │   │
//! │  │  InMemoryMessageStore in tests.                                │   │
//! │  │                                                                 │   │
//! │  │  insert() reports whether the row was new, which drives        │   │
//! │  │  exactly-once delivery receipts.                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod secure_store;

pub use secure_store::{keys, MemorySecureStore, SecureStore};

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::crypto::{Nonce, Signature};
use crate::error::Result;

/// A validated inbound message, ready for persistence
///
/// Produced by the pending-message fetcher after size and signature
/// field checks; `nonce` and `sig` are already decoded from their wire
/// base64 forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Globally unique message identifier (dedup key)
    pub message_id: String,
    /// Sender WhisperID
    pub from: String,
    /// Recipient WhisperID or group identifier
    pub to: String,
    /// Wire message type (e.g. `send_message`)
    pub msg_type: String,
    /// Sender-claimed Unix millis
    pub timestamp: i64,
    /// Encryption nonce (24 bytes)
    #[serde(with = "crate::crypto::nonce_base64")]
    pub nonce: Nonce,
    /// Encrypted message body
    #[serde(with = "crate::crypto::bytes_base64")]
    pub ciphertext: Vec<u8>,
    /// Sender's canonical signature (64 bytes)
    pub sig: Signature,
    /// Message being replied to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Group conversation this belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Sender's signing public key (base64), when the server includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_public_key: Option<String>,
}

/// Message persistence contract implemented by the embedding shell
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message
    ///
    /// Returns `true` if the message was newly inserted, `false` if a
    /// row with the same `message_id` already existed.
    async fn insert(&self, message: &StoredMessage) -> Result<bool>;

    /// Whether a message with this id is already persisted
    async fn exists(&self, message_id: &str) -> Result<bool>;

    /// Fetch a persisted message by id
    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>>;
}

/// In-memory [`MessageStore`] for tests and development
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<String, StoredMessage>>,
}

impl InMemoryMessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted messages
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: &StoredMessage) -> Result<bool> {
        let mut messages = self.messages.write();
        if messages.contains_key(&message.message_id) {
            return Ok(false);
        }
        messages.insert(message.message_id.clone(), message.clone());
        Ok(true)
    }

    async fn exists(&self, message_id: &str) -> Result<bool> {
        Ok(self.messages.read().contains_key(message_id))
    }

    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        Ok(self.messages.read().get(message_id).cloned())
    }
}

// ============================================================================
// TESTS
// ============================================================================

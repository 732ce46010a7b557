//! # Pending Message Fetcher
//!
//! Drains the server-side backlog of messages queued while this device
//! was offline.
//!
//! ## Batch Processing
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      BATCH PIPELINE                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  fetch_pending {cursor?}                                        │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  pending_messages {messages[], nextCursor}                      │
//! │       │                                                         │
//! │       ▼  per item, in receive order                             │
//! │  validate sizes ──fail──► reject (count, no receipt)            │
//! │       │                                                         │
//! │  Deduper seen? ──yes──► drop (count, no receipt)                │
//! │       │                                                         │
//! │  store.insert ──existed──► drop (count, no receipt)             │
//! │       │ new                                                     │
//! │       ▼                                                         │
//! │  delivery_receipt {status: "delivered"}                         │
//! │       │                                                         │
//! │       ▼  after the whole batch                                  │
//! │  cursor := nextCursor (verbatim, null clears)                   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A malformed item never aborts its batch. A receipt is sent only
//! after the message is durably persisted, exactly once per message id.
//! The cursor advances only once every item of the batch has been
//! handled, so a failure mid-batch leads to a refetch, not a gap.

use std::collections::{HashSet, VecDeque};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::crypto::{Nonce, Signature};
use crate::error::{Error, Result};
use crate::network::wire::{
    msg_type, DeliveryReceiptPayload, Envelope, FetchPendingPayload, PendingMessageItem,
    PendingMessagesPayload, STATUS_DELIVERED,
};
use crate::network::Transport;
use crate::session::SessionState;
use crate::storage::{MessageStore, StoredMessage};
use crate::time::SharedClock;

/// Message ids remembered by the deduper
const DEFAULT_SEEN_CAPACITY: usize = 1_024;

/// Bounded seen-set of message ids
///
/// Shields the store from repeated inserts when the server re-sends a
/// batch, and drops spoofed duplicates that claim a different sender
/// for an already-seen id. Oldest ids fall out first once the cap is
/// reached. Safe for concurrent use.
pub struct Deduper {
    inner: Mutex<DeduperInner>,
}

struct DeduperInner {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Deduper {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(DeduperInner {
                seen: HashSet::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Mark `id` as seen; returns false if it already was
    pub fn insert(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.seen.contains(id) {
            return false;
        }
        if inner.order.len() == inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Deduper {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAPACITY)
    }
}

/// What happened to one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOutcome {
    /// Newly persisted and receipted
    pub persisted: usize,
    /// Dropped as already seen or already stored
    pub duplicates: usize,
    /// Dropped for failing validation
    pub rejected: usize,
}

/// Backlog fetch protocol driver
///
/// Sends `fetch_pending` requests and turns `pending_messages` batches
/// into store inserts plus delivery receipts. Holds the pagination
/// cursor between batches.
pub struct PendingMessageFetcher {
    deduper: Deduper,
    cursor: Mutex<Option<String>>,
    clock: SharedClock,
}

impl PendingMessageFetcher {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            deduper: Deduper::default(),
            cursor: Mutex::new(None),
            clock,
        }
    }

    pub fn with_seen_capacity(clock: SharedClock, capacity: usize) -> Self {
        Self {
            deduper: Deduper::new(capacity),
            cursor: Mutex::new(None),
            clock,
        }
    }

    /// Cursor to thread into the next fetch
    pub fn cursor(&self) -> Option<String> {
        self.cursor.lock().clone()
    }

    /// Restore a cursor saved from a previous run
    pub fn set_cursor(&self, cursor: Option<String>) {
        *self.cursor.lock() = cursor;
    }

    pub fn deduper(&self) -> &Deduper {
        &self.deduper
    }

    /// Ask the server for the next batch
    pub async fn request_pending(&self, transport: &dyn Transport) -> Result<()> {
        let payload = FetchPendingPayload {
            cursor: self.cursor(),
        };
        let envelope = Envelope::with_request_id(
            msg_type::FETCH_PENDING,
            Uuid::new_v4().to_string(),
            &payload,
        )?;
        transport.send_envelope(&envelope).await
    }

    /// Persist a batch, receipt the new messages, advance the cursor
    ///
    /// Items are handled strictly in receive order. A validation
    /// failure drops only the failing item; a store or transport
    /// failure aborts the batch with the cursor unchanged so the server
    /// re-sends it.
    pub async fn process_batch(
        &self,
        batch: PendingMessagesPayload,
        transport: &dyn Transport,
        store: &dyn MessageStore,
        session: &SessionState,
    ) -> Result<FetchOutcome> {
        let current = session
            .current()
            .ok_or_else(|| Error::AuthFailed("No active session".to_string()))?;

        let mut outcome = FetchOutcome::default();
        for item in &batch.messages {
            if self.deduper.contains(&item.message_id) {
                outcome.duplicates += 1;
                continue;
            }

            let stored = match validate_item(item) {
                Ok(stored) => stored,
                Err(err) => {
                    tracing::warn!("Rejecting pending message {}: {}", item.message_id, err);
                    outcome.rejected += 1;
                    continue;
                }
            };

            // Persist before marking seen: an id marked seen but not
            // stored would be silently lost on refetch.
            if !store.insert(&stored).await? {
                self.deduper.insert(&item.message_id);
                outcome.duplicates += 1;
                continue;
            }
            self.deduper.insert(&item.message_id);

            let receipt = DeliveryReceiptPayload {
                session_token: current.session_token.clone(),
                message_id: item.message_id.clone(),
                from: current.whisper_id.clone(),
                to: item.from.clone(),
                status: STATUS_DELIVERED.to_string(),
                timestamp: self.clock.now_millis(),
            };
            transport
                .send_envelope(&Envelope::new(msg_type::DELIVERY_RECEIPT, &receipt)?)
                .await?;
            outcome.persisted += 1;
        }

        *self.cursor.lock() = batch.next_cursor.clone();
        tracing::debug!(
            "Processed pending batch: {} persisted, {} duplicates, {} rejected",
            outcome.persisted,
            outcome.duplicates,
            outcome.rejected
        );
        Ok(outcome)
    }
}

/// Decode and size-check one wire item
fn validate_item(item: &PendingMessageItem) -> Result<StoredMessage> {
    let nonce_bytes = BASE64
        .decode(&item.nonce)
        .map_err(|_| Error::InvalidPayload("Message nonce is not valid base64".to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes)?;

    let sig_bytes = BASE64
        .decode(&item.sig)
        .map_err(|_| Error::InvalidPayload("Message signature is not valid base64".to_string()))?;
    let sig = Signature::from_slice(&sig_bytes)?;

    let ciphertext = BASE64
        .decode(&item.ciphertext)
        .map_err(|_| Error::InvalidPayload("Message ciphertext is not valid base64".to_string()))?;

    Ok(StoredMessage {
        message_id: item.message_id.clone(),
        from: item.from.clone(),
        to: item.to.clone(),
        msg_type: item.msg_type.clone(),
        timestamp: item.timestamp,
        nonce,
        ciphertext,
        sig,
        reply_to: item.reply_to.clone(),
        group_id: item.group_id.clone(),
        sender_public_key: item.sender_public_key.clone(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::storage::InMemoryMessageStore;
    use crate::time::ManualClock;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct MockTransport {
        sent: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_envelopes(&self) -> Vec<Envelope> {
            self.sent
                .lock()
                .iter()
                .map(|text| Envelope::decode(text).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, text: String) -> Result<()> {
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&self, _code: u16, _reason: &str) -> Result<()> {
            Ok(())
        }
    }

    fn session_state() -> SessionState {
        let state = SessionState::new();
        state.store(
            Session {
                whisper_id: "WSP-AAAA-BBBB-CCCC".to_string(),
                session_token: "tok-1".to_string(),
                session_expires_at: 2_000_000,
                server_time: 1_000_000,
            },
            1_000_000,
        );
        state
    }

    fn item(message_id: &str, from: &str) -> PendingMessageItem {
        PendingMessageItem {
            message_id: message_id.to_string(),
            from: from.to_string(),
            to: "WSP-AAAA-BBBB-CCCC".to_string(),
            msg_type: "text".to_string(),
            timestamp: 999_000,
            nonce: BASE64.encode([1u8; 24]),
            ciphertext: BASE64.encode(b"sealed"),
            sig: BASE64.encode([2u8; 64]),
            reply_to: None,
            group_id: None,
            sender_public_key: None,
        }
    }

    fn batch(messages: Vec<PendingMessageItem>, next_cursor: Option<&str>) -> PendingMessagesPayload {
        PendingMessagesPayload {
            messages,
            next_cursor: next_cursor.map(str::to_string),
        }
    }

    fn fetcher() -> PendingMessageFetcher {
        PendingMessageFetcher::new(Arc::new(ManualClock::new(1_000_100)))
    }

    #[tokio::test]
    async fn test_batch_persists_and_receipts_in_order() {
        let fetcher = fetcher();
        let transport = MockTransport::new();
        let store = InMemoryMessageStore::new();
        let session = session_state();

        let outcome = fetcher
            .process_batch(
                batch(
                    vec![
                        item("m-1", "WSP-SEND-ERAA-AAAA"),
                        item("m-2", "WSP-SEND-ERBB-BBBB"),
                    ],
                    Some("cur-1"),
                ),
                &transport,
                &store,
                &session,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome {
                persisted: 2,
                duplicates: 0,
                rejected: 0
            }
        );
        assert!(store.exists("m-1").await.unwrap());
        assert!(store.exists("m-2").await.unwrap());

        let sent = transport.sent_envelopes();
        assert_eq!(sent.len(), 2);
        let first: DeliveryReceiptPayload = sent[0].parse_payload().unwrap();
        let second: DeliveryReceiptPayload = sent[1].parse_payload().unwrap();
        assert_eq!(first.message_id, "m-1");
        assert_eq!(second.message_id, "m-2");
        assert_eq!(first.from, "WSP-AAAA-BBBB-CCCC");
        assert_eq!(first.to, "WSP-SEND-ERAA-AAAA");
        assert_eq!(first.status, STATUS_DELIVERED);
        assert_eq!(first.session_token, "tok-1");
        assert_eq!(first.timestamp, 1_000_100);
    }

    #[tokio::test]
    async fn test_duplicate_id_dropped_even_with_different_sender() {
        let fetcher = fetcher();
        let transport = MockTransport::new();
        let store = InMemoryMessageStore::new();
        let session = session_state();

        let outcome = fetcher
            .process_batch(
                batch(
                    vec![
                        item("m-1", "WSP-SEND-ERAA-AAAA"),
                        item("m-1", "WSP-SPOO-FEDC-DDDD"),
                    ],
                    None,
                ),
                &transport,
                &store,
                &session,
            )
            .await
            .unwrap();

        assert_eq!(outcome.persisted, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(transport.sent_envelopes().len(), 1);
        // The first claimed sender won
        assert_eq!(
            store.get("m-1").await.unwrap().unwrap().from,
            "WSP-SEND-ERAA-AAAA"
        );
    }

    #[tokio::test]
    async fn test_malformed_item_rejected_without_aborting_batch() {
        let fetcher = fetcher();
        let transport = MockTransport::new();
        let store = InMemoryMessageStore::new();
        let session = session_state();

        let mut short_nonce = item("m-bad-nonce", "WSP-SEND-ERAA-AAAA");
        short_nonce.nonce = BASE64.encode([1u8; 23]);
        let mut short_sig = item("m-bad-sig", "WSP-SEND-ERAA-AAAA");
        short_sig.sig = BASE64.encode([2u8; 63]);
        let mut bad_base64 = item("m-bad-b64", "WSP-SEND-ERAA-AAAA");
        bad_base64.ciphertext = "not base64!!!".to_string();

        let outcome = fetcher
            .process_batch(
                batch(
                    vec![short_nonce, short_sig, bad_base64, item("m-ok", "WSP-SEND-ERAA-AAAA")],
                    None,
                ),
                &transport,
                &store,
                &session,
            )
            .await
            .unwrap();

        assert_eq!(outcome.rejected, 3);
        assert_eq!(outcome.persisted, 1);
        assert!(!store.exists("m-bad-nonce").await.unwrap());
        assert!(!store.exists("m-bad-sig").await.unwrap());
        assert!(store.exists("m-ok").await.unwrap());
        assert_eq!(transport.sent_envelopes().len(), 1);
    }

    #[tokio::test]
    async fn test_already_stored_message_not_receipted_again() {
        let fetcher = fetcher();
        let transport = MockTransport::new();
        let store = InMemoryMessageStore::new();
        let session = session_state();

        store.insert(&validate_item(&item("m-1", "WSP-SEND-ERAA-AAAA")).unwrap())
            .await
            .unwrap();

        let outcome = fetcher
            .process_batch(
                batch(vec![item("m-1", "WSP-SEND-ERAA-AAAA")], None),
                &transport,
                &store,
                &session,
            )
            .await
            .unwrap();

        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.persisted, 0);
        assert!(transport.sent_envelopes().is_empty());
        // Now remembered without a store round trip
        assert!(fetcher.deduper().contains("m-1"));
    }

    #[tokio::test]
    async fn test_cursor_threaded_and_cleared() {
        let fetcher = fetcher();
        let transport = MockTransport::new();
        let store = InMemoryMessageStore::new();
        let session = session_state();

        fetcher
            .process_batch(batch(vec![], Some("cur-2")), &transport, &store, &session)
            .await
            .unwrap();
        assert_eq!(fetcher.cursor().as_deref(), Some("cur-2"));

        fetcher.request_pending(&transport).await.unwrap();
        let sent = transport.sent_envelopes();
        let request: FetchPendingPayload = sent.last().unwrap().parse_payload().unwrap();
        assert_eq!(request.cursor.as_deref(), Some("cur-2"));
        assert!(sent.last().unwrap().request_id.is_some());

        // Explicit null clears the stored cursor
        fetcher
            .process_batch(batch(vec![], None), &transport, &store, &session)
            .await
            .unwrap();
        assert_eq!(fetcher.cursor(), None);

        fetcher.request_pending(&transport).await.unwrap();
        let sent = transport.sent_envelopes();
        let request: FetchPendingPayload = sent.last().unwrap().parse_payload().unwrap();
        assert_eq!(request.cursor, None);
    }

    #[tokio::test]
    async fn test_no_session_fails_before_any_side_effect() {
        let fetcher = fetcher();
        let transport = MockTransport::new();
        let store = InMemoryMessageStore::new();
        let session = SessionState::new();

        let err = fetcher
            .process_batch(
                batch(vec![item("m-1", "WSP-SEND-ERAA-AAAA")], Some("cur-9")),
                &transport,
                &store,
                &session,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthFailed(_)));
        assert!(transport.sent_envelopes().is_empty());
        assert!(!store.exists("m-1").await.unwrap());
        assert_eq!(fetcher.cursor(), None);
    }

    #[test]
    fn test_deduper_bounds() {
        let deduper = Deduper::new(2);
        assert!(deduper.insert("a"));
        assert!(deduper.insert("b"));
        assert!(!deduper.insert("a"));
        assert!(deduper.insert("c"));
        assert_eq!(deduper.len(), 2);
        assert!(!deduper.contains("a"));
        assert!(deduper.contains("c"));
    }
}

//! # Wire Format
//!
//! JSON frame types exchanged with the Whisper server over the
//! WebSocket transport.
//!
//! ## Envelope
//!
//! Every frame is a JSON object `{type, requestId?, payload}`. The
//! `type` string selects the payload schema; `requestId` correlates a
//! response with the request that caused it. Payload fields are
//! camelCase on the wire. Binary values (challenges, nonces,
//! ciphertexts, signatures, public keys) travel as base64 strings and
//! are decoded where they are consumed.
//!
//! ```text
//! {"type":"register_begin","payload":{"protocolVersion":1,...}}
//! {"type":"error","payload":{"code":"AUTH_FAILED","message":"..."}}
//! ```
//!
//! Must match the server's frame definitions.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};

/// Protocol revision carried in `register_begin` / `register_proof`
pub const PROTOCOL_VERSION: u16 = 1;

/// Crypto suite revision (key derivation + AEAD + signature scheme)
pub const CRYPTO_VERSION: u16 = 1;

/// Maximum encoded frame size (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Substring in an `AUTH_FAILED` message that marks a kick
///
/// The server sends it when another device registers the same account,
/// invalidating this session.
pub const KICK_MARKER: &str = "new_session";

/// Delivery receipt status for a message persisted locally
pub const STATUS_DELIVERED: &str = "delivered";

/// Frame type constants
pub mod msg_type {
    pub const REGISTER_BEGIN: &str = "register_begin";
    pub const REGISTER_CHALLENGE: &str = "register_challenge";
    pub const REGISTER_PROOF: &str = "register_proof";
    pub const REGISTER_ACK: &str = "register_ack";
    pub const ERROR: &str = "error";
    pub const FETCH_PENDING: &str = "fetch_pending";
    pub const PENDING_MESSAGES: &str = "pending_messages";
    pub const DELIVERY_RECEIPT: &str = "delivery_receipt";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
}

/// Error code constants used in `error` frames
pub mod error_code {
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const NOT_REGISTERED: &str = "NOT_REGISTERED";
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Outer frame wrapper: `{type, requestId?, payload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wrap `payload` in an envelope of the given type
    pub fn new<P: Serialize>(msg_type: &str, payload: &P) -> Result<Self> {
        Ok(Self {
            msg_type: msg_type.to_string(),
            request_id: None,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Wrap `payload` with a correlation id
    pub fn with_request_id<P: Serialize>(
        msg_type: &str,
        request_id: impl Into<String>,
        payload: &P,
    ) -> Result<Self> {
        Ok(Self {
            request_id: Some(request_id.into()),
            ..Self::new(msg_type, payload)?
        })
    }

    /// Serialize to the JSON text sent on the wire
    ///
    /// Fails with `InvalidPayload` if the encoded frame exceeds
    /// [`MAX_MESSAGE_SIZE`].
    pub fn encode(&self) -> Result<String> {
        let text = serde_json::to_string(self)?;
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidPayload(format!(
                "Frame of {} bytes exceeds maximum of {} bytes",
                text.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(text)
    }

    /// Parse an inbound frame
    pub fn decode(text: &str) -> Result<Self> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidPayload(format!(
                "Frame of {} bytes exceeds maximum of {} bytes",
                text.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        serde_json::from_str(text).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Decode the payload into its typed form
    pub fn parse_payload<P: DeserializeOwned>(&self) -> Result<P> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}

// ============================================================================
// CLIENT → SERVER PAYLOADS
// ============================================================================

/// Opens the registration handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBeginPayload {
    pub protocol_version: u16,
    pub crypto_version: u16,
    pub device_id: String,
    pub platform: String,
    /// Present when recovering an existing account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_id: Option<String>,
}

/// Answers the server's challenge with a signed proof of key ownership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProofPayload {
    pub protocol_version: u16,
    pub crypto_version: u16,
    pub challenge_id: String,
    pub device_id: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_id: Option<String>,
    /// base64 X25519 public key
    pub enc_public_key: String,
    /// base64 Ed25519 public key
    pub sign_public_key: String,
    /// base64 Ed25519 signature over SHA-256 of the challenge bytes
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

/// Requests the backlog of messages queued while offline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPendingPayload {
    /// Pagination cursor from the previous batch, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Acknowledges local persistence of one message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceiptPayload {
    pub session_token: String,
    pub message_id: String,
    /// Receipt sender (us)
    pub from: String,
    /// Original message sender
    pub to: String,
    pub status: String,
    pub timestamp: i64,
}

/// Keepalive probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub timestamp: i64,
}

// ============================================================================
// SERVER → CLIENT PAYLOADS
// ============================================================================

/// Random challenge the client must sign to prove key ownership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterChallengePayload {
    pub challenge_id: String,
    /// base64, decodes to exactly 32 bytes
    pub challenge: String,
    /// Unix millis after which the challenge is void
    pub expires_at: i64,
}

/// Final handshake verdict
///
/// On `success = false` the session fields are absent and nothing may
/// be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAckPayload {
    pub success: bool,
    #[serde(default)]
    pub whisper_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub session_expires_at: Option<i64>,
    #[serde(default)]
    pub server_time: Option<i64>,
}

/// One queued message as delivered by `pending_messages`
///
/// Binary fields are base64; they are length-checked when the item is
/// validated, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessageItem {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub msg_type: String,
    pub timestamp: i64,
    /// base64, 24 bytes decoded
    pub nonce: String,
    /// base64
    pub ciphertext: String,
    /// base64, 64 bytes decoded
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_public_key: Option<String>,
}

/// Batch response to `fetch_pending`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessagesPayload {
    #[serde(default)]
    pub messages: Vec<PendingMessageItem>,
    /// Cursor for the next fetch; `null` clears any stored cursor
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Keepalive reply carrying the server clock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    /// Echo of the ping timestamp
    pub timestamp: i64,
    pub server_time: i64,
}

/// Server-reported failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    /// Map a server error frame onto the client error taxonomy
    ///
    /// `AUTH_FAILED` whose message carries [`KICK_MARKER`] means another
    /// device took over the account and this session must be torn down.
    pub fn to_error(&self) -> Error {
        match self.code.as_str() {
            error_code::AUTH_FAILED if self.message.contains(KICK_MARKER) => {
                Error::Kicked(self.message.clone())
            }
            error_code::AUTH_FAILED => Error::AuthFailed(self.message.clone()),
            error_code::INVALID_PAYLOAD => Error::InvalidPayload(self.message.clone()),
            error_code::RATE_LIMITED => Error::RateLimited,
            error_code::NOT_REGISTERED => Error::NotRegistered,
            other => Error::TransportError(format!("{}: {}", other, self.message)),
        }
    }
}

// ============================================================================
// TYPED INBOUND FRAMES
// ============================================================================

/// Server frame decoded to its typed payload
///
/// Covers the frame types the client consumes; anything else is an
/// `UnexpectedFrame` error at decode time.
#[derive(Debug, Clone)]
pub enum Frame {
    RegisterChallenge(RegisterChallengePayload),
    RegisterAck(RegisterAckPayload),
    PendingMessages(PendingMessagesPayload),
    Pong(PongPayload),
    Error(ErrorPayload),
}

impl Frame {
    /// Decode a parsed envelope into its typed payload
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        match envelope.msg_type.as_str() {
            msg_type::REGISTER_CHALLENGE => {
                Ok(Frame::RegisterChallenge(envelope.parse_payload()?))
            }
            msg_type::REGISTER_ACK => Ok(Frame::RegisterAck(envelope.parse_payload()?)),
            msg_type::PENDING_MESSAGES => Ok(Frame::PendingMessages(envelope.parse_payload()?)),
            msg_type::PONG => Ok(Frame::Pong(envelope.parse_payload()?)),
            msg_type::ERROR => Ok(Frame::Error(envelope.parse_payload()?)),
            other => Err(Error::UnexpectedFrame(other.to_string())),
        }
    }

    /// Decode straight from wire text
    pub fn decode(text: &str) -> Result<Self> {
        Self::from_envelope(&Envelope::decode(text)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_begin_serialization() {
        let envelope = Envelope::new(
            msg_type::REGISTER_BEGIN,
            &RegisterBeginPayload {
                protocol_version: PROTOCOL_VERSION,
                crypto_version: CRYPTO_VERSION,
                device_id: "dev-1".to_string(),
                platform: "android".to_string(),
                whisper_id: None,
            },
        )
        .unwrap();

        let json = envelope.encode().unwrap();
        assert!(json.contains("\"type\":\"register_begin\""));
        assert!(json.contains("\"protocolVersion\":1"));
        assert!(json.contains("\"cryptoVersion\":1"));
        assert!(json.contains("\"deviceId\":\"dev-1\""));
        // Absent optionals stay off the wire
        assert!(!json.contains("whisperId"));
        assert!(!json.contains("requestId"));
    }

    #[test]
    fn test_request_id_round_trip() {
        let envelope = Envelope::with_request_id(
            msg_type::FETCH_PENDING,
            "req-7",
            &FetchPendingPayload { cursor: None },
        )
        .unwrap();

        let json = envelope.encode().unwrap();
        assert!(json.contains("\"requestId\":\"req-7\""));

        let parsed = Envelope::decode(&json).unwrap();
        assert_eq!(parsed.request_id.as_deref(), Some("req-7"));
    }

    #[test]
    fn test_register_challenge_decode() {
        let json = r#"{"type":"register_challenge","payload":{"challengeId":"ch-1","challenge":"AAAA","expiresAt":1700000000000}}"#;
        match Frame::decode(json).unwrap() {
            Frame::RegisterChallenge(p) => {
                assert_eq!(p.challenge_id, "ch-1");
                assert_eq!(p.challenge, "AAAA");
                assert_eq!(p.expires_at, 1_700_000_000_000);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_register_ack_failure_has_no_session_fields() {
        let json = r#"{"type":"register_ack","payload":{"success":false}}"#;
        match Frame::decode(json).unwrap() {
            Frame::RegisterAck(p) => {
                assert!(!p.success);
                assert!(p.session_token.is_none());
                assert!(p.whisper_id.is_none());
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_pending_messages_decode() {
        let json = r#"{"type":"pending_messages","payload":{"messages":[{"messageId":"m-1","from":"WSP-AAAA-BBBB-CCCC","to":"WSP-DDDD-EEEE-FFFF","msgType":"text","timestamp":1000,"nonce":"bm9uY2U=","ciphertext":"Y3Q=","sig":"c2ln"}],"nextCursor":"cur-2"}}"#;
        match Frame::decode(json).unwrap() {
            Frame::PendingMessages(p) => {
                assert_eq!(p.messages.len(), 1);
                assert_eq!(p.messages[0].message_id, "m-1");
                assert_eq!(p.messages[0].reply_to, None);
                assert_eq!(p.next_cursor.as_deref(), Some("cur-2"));
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_pending_messages_null_cursor() {
        let json = r#"{"type":"pending_messages","payload":{"messages":[],"nextCursor":null}}"#;
        match Frame::decode(json).unwrap() {
            Frame::PendingMessages(p) => {
                assert!(p.messages.is_empty());
                assert_eq!(p.next_cursor, None);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_pong_decode() {
        let json = r#"{"type":"pong","payload":{"timestamp":100,"serverTime":150}}"#;
        match Frame::decode(json).unwrap() {
            Frame::Pong(p) => {
                assert_eq!(p.timestamp, 100);
                assert_eq!(p.server_time, 150);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_error_frame_mapping() {
        let auth = ErrorPayload {
            code: error_code::AUTH_FAILED.to_string(),
            message: "bad signature".to_string(),
        };
        assert!(matches!(auth.to_error(), Error::AuthFailed(_)));

        let kicked = ErrorPayload {
            code: error_code::AUTH_FAILED.to_string(),
            message: "replaced by new_session on another device".to_string(),
        };
        assert!(matches!(kicked.to_error(), Error::Kicked(_)));

        let rate = ErrorPayload {
            code: error_code::RATE_LIMITED.to_string(),
            message: "slow down".to_string(),
        };
        assert_eq!(rate.to_error(), Error::RateLimited);

        let unregistered = ErrorPayload {
            code: error_code::NOT_REGISTERED.to_string(),
            message: "unknown device".to_string(),
        };
        assert_eq!(unregistered.to_error(), Error::NotRegistered);
    }

    #[test]
    fn test_unexpected_frame_type() {
        let json = r#"{"type":"presence_update","payload":{}}"#;
        assert!(matches!(
            Frame::decode(json),
            Err(Error::UnexpectedFrame(t)) if t == "presence_update"
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let huge = "x".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            Envelope::decode(&huge),
            Err(Error::InvalidPayload(_))
        ));

        let envelope = Envelope::new(
            msg_type::DELIVERY_RECEIPT,
            &serde_json::json!({ "blob": "y".repeat(MAX_MESSAGE_SIZE) }),
        )
        .unwrap();
        assert!(matches!(envelope.encode(), Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_delivery_receipt_field_names() {
        let receipt = DeliveryReceiptPayload {
            session_token: "tok".to_string(),
            message_id: "m-1".to_string(),
            from: "WSP-AAAA-BBBB-CCCC".to_string(),
            to: "WSP-DDDD-EEEE-FFFF".to_string(),
            status: STATUS_DELIVERED.to_string(),
            timestamp: 42,
        };
        let json = serde_json::to_string(&receipt).unwrap();
        assert!(json.contains("\"sessionToken\":\"tok\""));
        assert!(json.contains("\"messageId\":\"m-1\""));
        assert!(json.contains("\"status\":\"delivered\""));
    }
}

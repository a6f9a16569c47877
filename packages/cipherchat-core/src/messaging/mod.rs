//! # Messaging Module
//!
//! End-to-end encrypted direct and group messages.
//!
//! ## Message Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice)                                                        │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  Input: "Hello Bob!"                                                   │
//! │                                                                         │
//! │  1. Session key                                                        │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  ECDH(alice_p256_private, bob_p256_public) = session_key    │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  2. Encrypt                                                            │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(                                               │       │
//! │  │    key = session_key,                                      │       │
//! │  │    iv = random_16_bytes,                                   │       │
//! │  │    plaintext = "Hello Bob!"                                │       │
//! │  │  )                                                         │       │
//! │  │  → ciphertext + 16-byte auth tag                          │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  3. Transmit { sender, recipient, type, ciphertext, iv, timestamp }    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bob derives the same key from his private key and Alice's public key.
//! Group messages repeat step 1 and 2 per member, each with its own IV.
//!
//! ## Message Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Composed ──► Encrypted ──► Transmitted ──┬──► Delivered ──┬──► Decrypted
//! │                                           │                │            │
//! │                                           └──► DeliveryFailed           │
//! │                                                            └──► DecryptionFailed
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A message that fails to decrypt is shown as `"[Failed to decrypt]"` and
//! never retried.

mod codec;
mod files;
mod group;
mod service;

pub use codec::{decrypt, encrypt, EncryptedPayload};
pub use files::{FileAttachment, DEFAULT_FILE_TYPE};
pub use group::{encrypt_for_group, GroupCiphertexts};
pub use service::{MessageEvent, MessagingService, SentMessage};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Text shown in place of a message that could not be decrypted
pub const DECRYPTION_FAILED_PLACEHOLDER: &str = "[Failed to decrypt]";

/// Encrypted content of one message for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    /// UTF-8 text
    Text {
        /// Base64 ciphertext
        ciphertext: String,
        /// Base64 IV
        iv: String,
    },
    /// File contents with clear metadata
    File {
        /// Base64 ciphertext
        ciphertext: String,
        /// Base64 IV
        iv: String,
        /// Display name
        file_name: String,
        /// MIME type
        file_type: String,
    },
}

impl MessageBody {
    /// Text body from an encrypted payload
    pub fn text(payload: EncryptedPayload) -> Self {
        Self::Text {
            ciphertext: payload.ciphertext,
            iv: payload.iv,
        }
    }

    /// File body from an encrypted payload
    pub fn file(payload: EncryptedPayload, file_name: &str, file_type: &str) -> Self {
        Self::File {
            ciphertext: payload.ciphertext,
            iv: payload.iv,
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
        }
    }

    /// Base64 ciphertext
    pub fn ciphertext(&self) -> &str {
        match self {
            Self::Text { ciphertext, .. } | Self::File { ciphertext, .. } => ciphertext,
        }
    }

    /// Base64 IV
    pub fn iv(&self) -> &str {
        match self {
            Self::Text { iv, .. } | Self::File { iv, .. } => iv,
        }
    }

    /// Wire tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::File { .. } => "file",
        }
    }
}

/// Encrypted content of a group message, one payload per member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GroupBody {
    /// UTF-8 text
    Text {
        /// Member username → that member's ciphertext
        ciphertexts: BTreeMap<String, EncryptedPayload>,
    },
    /// File contents with clear metadata
    File {
        /// Member username → that member's ciphertext
        ciphertexts: BTreeMap<String, EncryptedPayload>,
        /// Display name
        file_name: String,
        /// MIME type
        file_type: String,
    },
}

impl GroupBody {
    /// Per-member payloads
    pub fn ciphertexts(&self) -> &BTreeMap<String, EncryptedPayload> {
        match self {
            Self::Text { ciphertexts } | Self::File { ciphertexts, .. } => ciphertexts,
        }
    }

    /// The single-recipient body addressed to `member`
    pub fn for_member(&self, member: &str) -> Option<MessageBody> {
        let payload = self.ciphertexts().get(member)?.clone();
        Some(match self {
            Self::Text { .. } => MessageBody::text(payload),
            Self::File {
                file_name,
                file_type,
                ..
            } => MessageBody::file(payload, file_name, file_type),
        })
    }
}

/// Where a message is addressed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageTarget {
    /// A single user
    Direct(String),
    /// A group
    Group(String),
}

impl MessageTarget {
    /// The recipient of a direct message
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Direct(recipient) => Some(recipient),
            Self::Group(_) => None,
        }
    }

    /// The group of a group message
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Group(group) => Some(group),
            Self::Direct(_) => None,
        }
    }
}

/// A message as stored by the backend, still encrypted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Unique message ID
    pub id: String,
    /// Sending username
    pub sender: String,
    /// Recipient or group
    pub target: MessageTarget,
    /// Encrypted content for the local user
    #[serde(flatten)]
    pub body: MessageBody,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
}

impl EncryptedMessage {
    /// Whether the local user sent this message
    pub fn is_outgoing(&self, username: &str) -> bool {
        self.sender == username
    }

    /// Whose public key decrypts this message for `username`
    ///
    /// Incoming messages use the sender's key. Our own direct messages use
    /// the recipient's key, and our own group messages use our own key
    /// (the self copy).
    pub fn counterpart<'a>(&'a self, username: &'a str) -> &'a str {
        if !self.is_outgoing(username) {
            return &self.sender;
        }
        match &self.target {
            MessageTarget::Direct(recipient) => recipient,
            MessageTarget::Group(_) => username,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Decrypted content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Text message
    Text(String),
    /// File attachment
    File(FileAttachment),
}

impl MessageContent {
    /// Get the text if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::File(_) => None,
        }
    }
}

/// Where a message is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Plaintext written, nothing encrypted yet
    Composed,
    /// Ciphertext ready
    Encrypted,
    /// Handed to the transport
    Transmitted,
    /// Accepted by the backend (sender) or received (recipient)
    Delivered,
    /// The transport gave up
    DeliveryFailed,
    /// Decrypted successfully
    Decrypted,
    /// Decryption failed; terminal
    DecryptionFailed,
}

impl MessageState {
    /// Name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composed => "composed",
            Self::Encrypted => "encrypted",
            Self::Transmitted => "transmitted",
            Self::Delivered => "delivered",
            Self::DeliveryFailed => "delivery_failed",
            Self::Decrypted => "decrypted",
            Self::DecryptionFailed => "decryption_failed",
        }
    }

    /// Move to `next`, or fail with `InvalidStateTransition`
    pub fn advance(self, next: MessageState) -> Result<MessageState> {
        use MessageState::*;

        let allowed = matches!(
            (self, next),
            (Composed, Encrypted)
                | (Encrypted, Transmitted)
                | (Transmitted, Delivered)
                | (Transmitted, DeliveryFailed)
                | (Delivered, Decrypted)
                | (Delivered, DecryptionFailed)
        );

        if allowed {
            Ok(next)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Whether no further transition exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DeliveryFailed | Self::Decrypted | Self::DecryptionFailed)
    }
}

/// A message ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Unique message ID
    pub id: String,
    /// Sending username
    pub sender: String,
    /// Recipient or group
    pub target: MessageTarget,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
    /// `Decrypted` or `DecryptionFailed`
    pub state: MessageState,
    /// Content, when decryption succeeded
    pub content: Option<MessageContent>,
}

impl DecryptedMessage {
    fn from_parts(message: EncryptedMessage, content: Option<MessageContent>) -> Self {
        let state = if content.is_some() {
            MessageState::Decrypted
        } else {
            MessageState::DecryptionFailed
        };
        Self {
            id: message.id,
            sender: message.sender,
            target: message.target,
            timestamp: message.timestamp,
            state,
            content,
        }
    }

    /// Text to render in a conversation view
    pub fn display_text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::File(file)) => format!("[File: {}]", file.file_name),
            None => DECRYPTION_FAILED_PLACEHOLDER.to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(sender: &str, target: MessageTarget) -> EncryptedMessage {
        EncryptedMessage {
            id: "m1".to_string(),
            sender: sender.to_string(),
            target,
            body: MessageBody::Text {
                ciphertext: "Y3Q=".to_string(),
                iv: "aXY=".to_string(),
            },
            timestamp: 42,
        }
    }

    #[test]
    fn test_body_tagging() {
        let text: MessageBody =
            serde_json::from_str(r#"{"type":"text","ciphertext":"a","iv":"b"}"#).unwrap();
        assert_eq!(text.kind(), "text");
        assert_eq!(text.iv(), "b");

        let file: MessageBody = serde_json::from_str(
            r#"{"type":"file","ciphertext":"a","iv":"b","file_name":"x.pdf","file_type":"application/pdf"}"#,
        )
        .unwrap();
        assert!(matches!(file, MessageBody::File { ref file_name, .. } if file_name == "x.pdf"));
    }

    #[test]
    fn test_file_body_requires_metadata() {
        let result: std::result::Result<MessageBody, _> =
            serde_json::from_str(r#"{"type":"file","ciphertext":"a","iv":"b"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_group_body_for_member() {
        let mut ciphertexts = BTreeMap::new();
        ciphertexts.insert(
            "bob".to_string(),
            EncryptedPayload { ciphertext: "a".to_string(), iv: "b".to_string() },
        );
        let body = GroupBody::File {
            ciphertexts,
            file_name: "x.pdf".to_string(),
            file_type: "application/pdf".to_string(),
        };

        let bobs = body.for_member("bob").unwrap();
        assert_eq!(bobs.kind(), "file");
        assert_eq!(bobs.ciphertext(), "a");
        assert!(body.for_member("carol").is_none());
    }

    #[test]
    fn test_counterpart() {
        let incoming = stored("alice", MessageTarget::Direct("bob".into()));
        assert_eq!(incoming.counterpart("bob"), "alice");

        let outgoing = stored("bob", MessageTarget::Direct("alice".into()));
        assert_eq!(outgoing.counterpart("bob"), "alice");

        let own_group = stored("bob", MessageTarget::Group("g".into()));
        assert_eq!(own_group.counterpart("bob"), "bob");

        let group = stored("alice", MessageTarget::Group("g".into()));
        assert_eq!(group.counterpart("bob"), "alice");
    }

    #[test]
    fn test_message_json() {
        let message = stored("alice", MessageTarget::Group("g".into()));
        let json = message.to_json().unwrap();
        assert!(json.contains(r#""type":"text""#));

        let back = EncryptedMessage::from_json(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_state_machine_happy_paths() {
        let sent = MessageState::Composed
            .advance(MessageState::Encrypted)
            .and_then(|s| s.advance(MessageState::Transmitted))
            .and_then(|s| s.advance(MessageState::Delivered))
            .unwrap();
        assert_eq!(sent, MessageState::Delivered);

        let read = sent.advance(MessageState::Decrypted).unwrap();
        assert!(read.is_terminal());
    }

    #[test]
    fn test_state_machine_rejects_skips() {
        let result = MessageState::Composed.advance(MessageState::Transmitted);
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { from: "composed", to: "transmitted" })
        ));

        assert!(MessageState::DecryptionFailed.advance(MessageState::Decrypted).is_err());
        assert!(MessageState::DeliveryFailed.advance(MessageState::Delivered).is_err());
    }

    #[test]
    fn test_display_placeholder() {
        let incoming = stored("alice", MessageTarget::Direct("bob".into()));
        let message = DecryptedMessage::from_parts(incoming, None);
        assert_eq!(message.state, MessageState::DecryptionFailed);
        assert_eq!(message.display_text(), DECRYPTION_FAILED_PLACEHOLDER);
    }
}

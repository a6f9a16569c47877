//! # Transport Module
//!
//! Moves encrypted messages to and from the backend.
//!
//! ## Wire Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         BACKEND WIRE FORMAT                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  POST /message                                                         │
//! │  {                                                                      │
//! │    "id": "uuid-v4",                                                    │
//! │    "sender": "alice",                                                  │
//! │    "recipient": "bob",                                                 │
//! │    "type": "text",                  // or "file"                       │
//! │    "ciphertext": "base64...",       // AES-GCM output, tag appended    │
//! │    "iv": "base64...",               // 16 bytes                        │
//! │    "file_name": "...",              // file messages only              │
//! │    "file_type": "...",              // file messages only              │
//! │    "timestamp": 1700000000000                                          │
//! │  }                                                                      │
//! │                                                                         │
//! │  POST /group_message                                                   │
//! │  {                                                                      │
//! │    "id": "uuid-v4",                                                    │
//! │    "sender": "alice",                                                  │
//! │    "group": "g-42",                                                    │
//! │    "type": "text",                                                     │
//! │    "ciphertexts": {                                                    │
//! │      "bob":   { "ciphertext": "...", "iv": "..." },                    │
//! │      "carol": { "ciphertext": "...", "iv": "..." }                     │
//! │    },                                                                   │
//! │    "timestamp": 1700000000000                                          │
//! │  }                                                                      │
//! │                                                                         │
//! │  Push event (one per recipient)                                        │
//! │  { "sender", "group"?, "timestamp"?, "type", "ciphertext", "iv", ... } │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this module sees plaintext. Delivery is at-least-once; the
//! [`PushInbox`] drops re-deliveries, separately for each recipient.

#[cfg(not(target_arch = "wasm32"))]
mod http;
mod memory;

#[cfg(not(target_arch = "wasm32"))]
pub use http::HttpBackend;
pub use memory::InMemoryBackend;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::error::Result;
use crate::messaging::{EncryptedMessage, GroupBody, MessageBody, MessageTarget};

/// Sends encrypted messages to the backend
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Deliver a direct message
    async fn send_message(&self, message: &OutgoingMessage) -> Result<DeliveryReceipt>;

    /// Deliver a group message with its per-member ciphertexts
    async fn send_group_message(&self, message: &OutgoingGroupMessage) -> Result<DeliveryReceipt>;
}

/// Body of `POST /message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Client-generated message ID
    pub id: String,
    /// Sending username
    pub sender: String,
    /// Receiving username
    pub recipient: String,
    /// Encrypted content
    #[serde(flatten)]
    pub body: MessageBody,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
}

impl OutgoingMessage {
    /// The stored form of this message
    pub fn to_message(&self) -> EncryptedMessage {
        EncryptedMessage {
            id: self.id.clone(),
            sender: self.sender.clone(),
            target: MessageTarget::Direct(self.recipient.clone()),
            body: self.body.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Body of `POST /group_message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingGroupMessage {
    /// Client-generated message ID
    pub id: String,
    /// Sending username
    pub sender: String,
    /// Group ID
    pub group: String,
    /// Per-member encrypted content
    #[serde(flatten)]
    pub body: GroupBody,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
}

/// What the backend acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// ID of the accepted message
    pub message_id: String,
    /// Number of ciphertexts accepted (1 for a direct message)
    pub recipients: usize,
}

/// A message delivered by the push feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Message ID, when the backend forwards it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sending username
    pub sender: String,
    /// Group ID for group messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Unix timestamp (milliseconds), when the backend forwards it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// This recipient's ciphertext
    #[serde(flatten)]
    pub body: MessageBody,
}

impl PushEvent {
    /// Parse a push feed frame
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::error::Error::DeserializationError(e.to_string()))
    }

    /// Serialize to a push feed frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Turn the event into a stored message addressed to `recipient`
    ///
    /// A missing timestamp is filled with the receive time.
    pub fn into_message(self, recipient: &str) -> EncryptedMessage {
        let target = match self.group {
            Some(group) => MessageTarget::Group(group),
            None => MessageTarget::Direct(recipient.to_string()),
        };
        EncryptedMessage {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            sender: self.sender,
            target,
            body: self.body,
            timestamp: self.timestamp.unwrap_or_else(crate::time::now_millis),
        }
    }
}

/// (recipient, sender, IV)
type DeliveryKey = (String, String, String);

fn delivery_key(recipient: &str, sender: &str, iv: &str) -> DeliveryKey {
    (recipient.to_string(), sender.to_string(), iv.to_string())
}

/// De-duplicates push deliveries
///
/// Remembers the last `window` (recipient, sender, IV) triples. IVs are
/// random per ciphertext, so a repeat means the same ciphertext reached the
/// same user twice. One inbox serves every session on a service; entries of
/// one recipient never affect another.
#[derive(Debug)]
pub struct PushInbox {
    window: usize,
    seen: Mutex<Seen>,
}

#[derive(Debug, Default)]
struct Seen {
    keys: HashSet<DeliveryKey>,
    order: VecDeque<DeliveryKey>,
}

impl PushInbox {
    /// Inbox remembering up to `window` deliveries; 0 disables de-duplication
    pub fn new(window: usize) -> Self {
        Self {
            window,
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Record a delivery to `recipient`; returns false if it was already seen
    pub fn accept(&self, recipient: &str, event: &PushEvent) -> bool {
        if self.window == 0 {
            return true;
        }

        let key = delivery_key(recipient, &event.sender, event.body.iv());
        let mut seen = self.seen.lock();
        if !seen.keys.insert(key.clone()) {
            tracing::debug!(
                recipient = %recipient,
                sender = %event.sender,
                "Dropping duplicate push delivery"
            );
            return false;
        }
        seen.order.push_back(key);

        while seen.order.len() > self.window {
            if let Some(oldest) = seen.order.pop_front() {
                seen.keys.remove(&oldest);
            }
        }
        true
    }

    /// Un-record one delivery so that its re-delivery is processed again
    pub fn forget(&self, recipient: &str, sender: &str, iv: &str) {
        let key = delivery_key(recipient, sender, iv);
        let mut seen = self.seen.lock();
        if seen.keys.remove(&key) {
            seen.order.retain(|k| k != &key);
        }
    }

    /// Forget every delivery to `recipient`
    pub fn forget_recipient(&self, recipient: &str) {
        let mut seen = self.seen.lock();
        seen.keys.retain(|(r, _, _)| r != recipient);
        seen.order.retain(|(r, _, _)| r != recipient);
    }
}

// ============================================================================
// TESTS
// ============================================================================

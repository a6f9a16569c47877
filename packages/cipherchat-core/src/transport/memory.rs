//! In-process backend for tests and local demos.
//!
//! Plays both server roles: it answers directory lookups and routes sent
//! messages into per-user push inboxes, one event per recipient, the way
//! the real backend's push feed does.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{DeliveryReceipt, OutgoingGroupMessage, OutgoingMessage, PushEvent, TransportAdapter};
use crate::directory::PeerDirectory;
use crate::error::{Error, Result};
use crate::messaging::EncryptedMessage;

/// A backend that lives in memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    public_keys: RwLock<HashMap<String, String>>,
    groups: RwLock<HashMap<String, BTreeSet<String>>>,
    inboxes: RwLock<HashMap<String, Vec<PushEvent>>>,
    stored: RwLock<Vec<EncryptedMessage>>,
    wire_log: RwLock<Vec<serde_json::Value>>,
    offline: AtomicBool,
    directory_offline: AtomicBool,
    rejecting: AtomicBool,
}

impl InMemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) a user's base64 SPKI public key
    pub fn publish_key(&self, username: &str, public_key: &str) {
        self.public_keys
            .write()
            .insert(username.to_string(), public_key.to_string());
    }

    /// Create (or replace) a group roster
    pub fn create_group<I, S>(&self, group_id: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .write()
            .insert(group_id.to_string(), members.into_iter().map(Into::into).collect());
    }

    /// Make every send fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every directory lookup fail with a transport error
    pub fn set_directory_offline(&self, offline: bool) {
        self.directory_offline.store(offline, Ordering::SeqCst);
    }

    /// Refuse every send the way a backend answers 403
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Drain a user's pending push events
    pub fn take_inbox(&self, username: &str) -> Vec<PushEvent> {
        self.inboxes.write().remove(username).unwrap_or_default()
    }

    /// Stored direct messages between two users, in arrival order
    pub fn conversation(&self, a: &str, b: &str) -> Vec<EncryptedMessage> {
        self.stored
            .read()
            .iter()
            .filter(|m| {
                let recipient = m.target.recipient().unwrap_or_default();
                (m.sender == a && recipient == b) || (m.sender == b && recipient == a)
            })
            .cloned()
            .collect()
    }

    /// Every request body received, as JSON
    pub fn wire_log(&self) -> Vec<serde_json::Value> {
        self.wire_log.read().clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::TransportError("backend unreachable".into()));
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(Error::DeliveryRejected("backend returned 403 Forbidden".into()));
        }
        Ok(())
    }

    fn check_directory(&self) -> Result<()> {
        if self.directory_offline.load(Ordering::SeqCst) {
            return Err(Error::TransportError("directory unreachable".into()));
        }
        Ok(())
    }

    fn deliver(&self, recipient: &str, event: PushEvent) {
        self.inboxes
            .write()
            .entry(recipient.to_string())
            .or_default()
            .push(event);
    }
}

#[async_trait]
impl PeerDirectory for InMemoryBackend {
    async fn get_public_key(&self, username: &str) -> Result<String> {
        self.check_directory()?;
        self.public_keys
            .read()
            .get(username)
            .cloned()
            .ok_or_else(|| Error::PeerKeyUnavailable(username.to_string()))
    }

    async fn get_group_members(&self, group_id: &str) -> Result<BTreeSet<String>> {
        self.check_directory()?;
        self.groups
            .read()
            .get(group_id)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))
    }
}

#[async_trait]
impl TransportAdapter for InMemoryBackend {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<DeliveryReceipt> {
        self.check_online()?;
        self.wire_log.write().push(serde_json::to_value(message)?);

        self.stored.write().push(message.to_message());
        self.deliver(
            &message.recipient,
            PushEvent {
                id: Some(message.id.clone()),
                sender: message.sender.clone(),
                group: None,
                timestamp: Some(message.timestamp),
                body: message.body.clone(),
            },
        );

        Ok(DeliveryReceipt {
            message_id: message.id.clone(),
            recipients: 1,
        })
    }

    async fn send_group_message(&self, message: &OutgoingGroupMessage) -> Result<DeliveryReceipt> {
        self.check_online()?;
        if !self.groups.read().contains_key(&message.group) {
            return Err(Error::GroupNotFound(message.group.clone()));
        }
        self.wire_log.write().push(serde_json::to_value(message)?);

        for member in message.body.ciphertexts().keys() {
            if member == &message.sender {
                continue;
            }
            if let Some(body) = message.body.for_member(member) {
                self.deliver(
                    member,
                    PushEvent {
                        id: Some(message.id.clone()),
                        sender: message.sender.clone(),
                        group: Some(message.group.clone()),
                        timestamp: Some(message.timestamp),
                        body,
                    },
                );
            }
        }

        Ok(DeliveryReceipt {
            message_id: message.id.clone(),
            recipients: message.body.ciphertexts().len(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{EncryptedPayload, GroupBody, MessageBody};
    use std::collections::BTreeMap;

    fn payload(tag: &str) -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: format!("ct-{}", tag),
            iv: format!("iv-{}", tag),
        }
    }

    fn direct(sender: &str, recipient: &str) -> OutgoingMessage {
        OutgoingMessage {
            id: format!("{}-{}", sender, recipient),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            body: MessageBody::text(payload(recipient)),
            timestamp: 1,
        }
    }

    #[test]
    fn test_directory_lookups() {
        let backend = InMemoryBackend::new();
        backend.publish_key("alice", "a-key");
        backend.create_group("g", ["alice", "bob"]);

        tokio_test::block_on(async {
            assert_eq!(backend.get_public_key("alice").await.unwrap(), "a-key");
            assert!(matches!(
                backend.get_public_key("bob").await,
                Err(Error::PeerKeyUnavailable(_))
            ));
            assert_eq!(backend.get_group_members("g").await.unwrap().len(), 2);
            assert!(matches!(
                backend.get_group_members("nope").await,
                Err(Error::GroupNotFound(_))
            ));
        });
    }

    #[test]
    fn test_direct_delivery_and_conversation() {
        let backend = InMemoryBackend::new();

        tokio_test::block_on(async {
            backend.send_message(&direct("alice", "bob")).await.unwrap();
            backend.send_message(&direct("bob", "alice")).await.unwrap();
            backend.send_message(&direct("alice", "carol")).await.unwrap();
        });

        assert_eq!(backend.conversation("alice", "bob").len(), 2);
        assert_eq!(backend.conversation("bob", "alice").len(), 2);

        let inbox = backend.take_inbox("bob");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id.as_deref(), Some("alice-bob"));
        assert!(backend.take_inbox("bob").is_empty());
    }

    #[test]
    fn test_group_delivery_skips_sender() {
        let backend = InMemoryBackend::new();
        backend.create_group("g", ["alice", "bob", "carol"]);

        let ciphertexts: BTreeMap<_, _> = ["alice", "bob", "carol"]
            .iter()
            .map(|m| (m.to_string(), payload(m)))
            .collect();
        let message = OutgoingGroupMessage {
            id: "m1".into(),
            sender: "alice".into(),
            group: "g".into(),
            body: GroupBody::Text { ciphertexts },
            timestamp: 1,
        };

        let receipt = tokio_test::block_on(backend.send_group_message(&message)).unwrap();
        assert_eq!(receipt.recipients, 3);

        assert!(backend.take_inbox("alice").is_empty());
        let bob = backend.take_inbox("bob");
        assert_eq!(bob[0].body.ciphertext(), "ct-bob");
        assert_eq!(bob[0].group.as_deref(), Some("g"));
    }

    #[test]
    fn test_offline_and_unknown_group() {
        let backend = InMemoryBackend::new();
        let message = OutgoingGroupMessage {
            id: "m1".into(),
            sender: "alice".into(),
            group: "missing".into(),
            body: GroupBody::Text {
                ciphertexts: BTreeMap::new(),
            },
            timestamp: 1,
        };

        let result = tokio_test::block_on(backend.send_group_message(&message));
        assert!(matches!(result, Err(Error::GroupNotFound(_))));

        backend.set_offline(true);
        let result = tokio_test::block_on(backend.send_message(&direct("alice", "bob")));
        assert!(matches!(result, Err(Error::TransportError(_))));
        assert!(backend.wire_log().is_empty());
    }

    #[test]
    fn test_directory_outage_and_rejection() {
        let backend = InMemoryBackend::new();
        backend.publish_key("bob", "b-key");

        backend.set_directory_offline(true);
        let result = tokio_test::block_on(backend.get_public_key("bob"));
        assert!(matches!(result, Err(Error::TransportError(_))));
        backend.set_directory_offline(false);

        backend.set_rejecting(true);
        let result = tokio_test::block_on(backend.send_message(&direct("alice", "bob")));
        assert!(matches!(result, Err(Error::DeliveryRejected(_))));
        assert!(backend.take_inbox("bob").is_empty());
    }
}

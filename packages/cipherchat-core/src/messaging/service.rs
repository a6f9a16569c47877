//! Send and receive flows built on the session, key exchange and codec.

use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    codec, group, DecryptedMessage, EncryptedMessage, FileAttachment, GroupBody, MessageBody,
    MessageContent, MessageState,
};
use crate::config::CoreConfig;
use crate::directory::PeerDirectory;
use crate::error::{Error, Result};
use crate::exchange::SessionKeyDeriver;
use crate::identity::{KeyPairVault, WrappedPrivateKey};
use crate::session::{SecretCache, Session};
use crate::transport::{
    DeliveryReceipt, OutgoingGroupMessage, OutgoingMessage, PushEvent, PushInbox, TransportAdapter,
};

/// Notifications for UI subscribers
#[derive(Debug, Clone)]
pub enum MessageEvent {
    /// A push delivery was decrypted (or replaced by the placeholder)
    Received(DecryptedMessage),
    /// The backend accepted a message
    Delivered {
        /// Message ID
        message_id: String,
    },
    /// The backend could not be reached or refused a message
    DeliveryFailed {
        /// Message ID
        message_id: String,
        /// Human-readable reason
        reason: String,
    },
}

/// Result of a successful send
#[derive(Debug)]
pub struct SentMessage {
    /// Message ID
    pub id: String,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
    /// Always `Delivered` for a returned value
    pub state: MessageState,
    /// Number of ciphertexts the backend accepted
    pub recipients: usize,
    /// Group members that did not get a copy, with the reason
    pub skipped: BTreeMap<String, Error>,
}

/// A ciphertext waiting for a user-triggered retry
#[derive(Debug, Clone)]
enum PendingDelivery {
    Direct(OutgoingMessage),
    Group(OutgoingGroupMessage),
}

impl PendingDelivery {
    fn id(&self) -> &str {
        match self {
            Self::Direct(m) => &m.id,
            Self::Group(m) => &m.id,
        }
    }

    fn sender(&self) -> &str {
        match self {
            Self::Direct(m) => &m.sender,
            Self::Group(m) => &m.sender,
        }
    }
}

/// Messaging service for sending and receiving encrypted messages
pub struct MessagingService {
    config: CoreConfig,
    deriver: SessionKeyDeriver,
    transport: Arc<dyn TransportAdapter>,
    inbox: PushInbox,
    /// Messages whose delivery failed with a recoverable error
    outbox: RwLock<Vec<PendingDelivery>>,
    events: broadcast::Sender<MessageEvent>,
}

impl MessagingService {
    /// Create a new messaging service
    pub fn new(
        config: CoreConfig,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn TransportAdapter>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inbox: PushInbox::new(config.push_dedup_window),
            deriver: SessionKeyDeriver::new(directory),
            transport,
            outbox: RwLock::new(Vec::new()),
            events,
            config,
        }
    }

    /// Subscribe to message events
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.events.subscribe()
    }

    /// The key vault matching this service's configuration
    pub fn vault(&self) -> KeyPairVault {
        KeyPairVault::from_config(&self.config)
    }

    /// The session key deriver
    pub fn deriver(&self) -> &SessionKeyDeriver {
        &self.deriver
    }

    /// Unwrap the user's key and start a session
    ///
    /// The session's key cache is sized from `key_cache_capacity`.
    pub fn login(
        &self,
        secrets: Arc<SecretCache>,
        username: &str,
        wrapped: &WrappedPrivateKey,
        password: &str,
    ) -> Result<Session> {
        let session = Session::login(secrets, &self.vault(), username, wrapped, password)?;
        Ok(session.with_key_cache(self.config.key_cache_capacity))
    }

    /// End a session and drop its pending deliveries
    pub fn logout(&self, session: &Session) {
        session.logout();
        self.outbox.write().retain(|p| p.sender() != session.username());
        self.inbox.forget_recipient(session.username());
    }

    // ========================================================================
    // SENDING
    // ========================================================================

    /// Send a text message to one user
    pub async fn send_text(
        &self,
        session: &Session,
        recipient: &str,
        text: &str,
    ) -> Result<SentMessage> {
        self.check_text(text)?;
        let payload = self.encrypt_direct(session, recipient, text.as_bytes()).await?;
        self.transmit_direct(session, recipient, MessageBody::text(payload)).await
    }

    /// Send a file to one user
    pub async fn send_file(
        &self,
        session: &Session,
        recipient: &str,
        file: &FileAttachment,
    ) -> Result<SentMessage> {
        file.check_size(self.config.max_file_size)?;
        let payload = self.encrypt_direct(session, recipient, &file.data).await?;
        let body = MessageBody::file(payload, &file.file_name, &file.file_type);
        self.transmit_direct(session, recipient, body).await
    }

    /// Send a text message to every member of a group
    ///
    /// Each member gets their own ciphertext. The plaintext never leaves
    /// this process.
    pub async fn send_group_text(
        &self,
        session: &Session,
        group_id: &str,
        text: &str,
    ) -> Result<SentMessage> {
        self.check_text(text)?;
        let (ciphertexts, skipped) = self.encrypt_group(session, group_id, text.as_bytes()).await?;
        self.transmit_group(session, group_id, GroupBody::Text { ciphertexts }, skipped)
            .await
    }

    /// Send a file to every member of a group
    pub async fn send_group_file(
        &self,
        session: &Session,
        group_id: &str,
        file: &FileAttachment,
    ) -> Result<SentMessage> {
        file.check_size(self.config.max_file_size)?;
        let (ciphertexts, skipped) = self.encrypt_group(session, group_id, &file.data).await?;
        let body = GroupBody::File {
            ciphertexts,
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
        };
        self.transmit_group(session, group_id, body, skipped).await
    }

    /// Resend this user's failed deliveries
    ///
    /// The stored ciphertexts are sent unchanged. Successful ones leave the
    /// outbox; the rest stay for the next attempt.
    pub async fn retry_outbox(
        &self,
        session: &Session,
    ) -> Result<Vec<(String, Result<DeliveryReceipt>)>> {
        session.ensure_active()?;

        let pending: Vec<PendingDelivery> = self
            .outbox
            .read()
            .iter()
            .filter(|p| p.sender() == session.username())
            .cloned()
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        for delivery in pending {
            let result = match &delivery {
                PendingDelivery::Direct(m) => self.transport.send_message(m).await,
                PendingDelivery::Group(m) => self.transport.send_group_message(m).await,
            };
            if result.is_ok() {
                self.outbox.write().retain(|p| p.id() != delivery.id());
                let _ = self.events.send(MessageEvent::Delivered {
                    message_id: delivery.id().to_string(),
                });
            }
            outcomes.push((delivery.id().to_string(), result));
        }

        Ok(outcomes)
    }

    /// IDs of messages waiting for a retry
    pub fn pending_deliveries(&self) -> Vec<String> {
        self.outbox.read().iter().map(|p| p.id().to_string()).collect()
    }

    // ========================================================================
    // RECEIVING
    // ========================================================================

    /// Decrypt one stored or pushed message
    ///
    /// ## Errors
    ///
    /// - `NotAuthenticated` once the session has ended
    /// - `PeerKeyUnavailable` if the counterpart has no published key
    /// - `DecryptionFailure` on a tag mismatch, bad encoding or bad UTF-8
    pub async fn decrypt_message(
        &self,
        session: &Session,
        message: &EncryptedMessage,
    ) -> Result<MessageContent> {
        session.ensure_active()?;

        let counterpart = message.counterpart(session.username());
        let key = self.deriver.derive_for_peer(session, counterpart).await?;
        let plaintext = codec::decrypt(key.key(), message.body.ciphertext(), message.body.iv())?;

        match &message.body {
            MessageBody::Text { .. } => String::from_utf8(plaintext)
                .map(MessageContent::Text)
                .map_err(|_| Error::DecryptionFailure("plaintext is not valid UTF-8".into())),
            MessageBody::File {
                file_name,
                file_type,
                ..
            } => Ok(MessageContent::File(FileAttachment {
                file_name: file_name.clone(),
                file_type: file_type.clone(),
                data: plaintext,
            })),
        }
    }

    /// Decrypt a conversation history
    ///
    /// Messages are decrypted concurrently and returned sorted by
    /// timestamp. A message that fails to decrypt becomes a placeholder; it
    /// does not fail the batch. An ended session fails the whole batch with
    /// `NotAuthenticated`.
    pub async fn decrypt_history(
        &self,
        session: &Session,
        messages: Vec<EncryptedMessage>,
    ) -> Result<Vec<DecryptedMessage>> {
        session.ensure_active()?;

        let results = join_all(messages.iter().map(|m| self.decrypt_message(session, m))).await;

        let mut decrypted = Vec::with_capacity(messages.len());
        for (message, result) in messages.into_iter().zip(results) {
            decrypted.push(self.open(message, result)?);
        }

        decrypted.sort_by_key(|m| m.timestamp);
        Ok(decrypted)
    }

    /// Handle one push delivery
    ///
    /// Returns `None` for a re-delivery of a message already handled. A
    /// delivery only counts as handled once it decrypted or failed
    /// authentication; when the key lookup itself failed, the placeholder is
    /// returned and a later re-delivery is processed again.
    pub async fn receive_push(
        &self,
        session: &Session,
        event: PushEvent,
    ) -> Result<Option<DecryptedMessage>> {
        session.ensure_active()?;

        if !self.inbox.accept(session.username(), &event) {
            return Ok(None);
        }

        if self.config.verbose_logging {
            tracing::debug!(
                sender = %event.sender,
                kind = event.body.kind(),
                ciphertext_len = event.body.ciphertext().len(),
                "Push delivery"
            );
        }

        let message = event.into_message(session.username());
        let result = self.decrypt_message(session, &message).await;
        if !matches!(result, Ok(_) | Err(Error::DecryptionFailure(_))) {
            self.inbox
                .forget(session.username(), &message.sender, message.body.iv());
        }
        let decrypted = self.open(message, result)?;

        let _ = self.events.send(MessageEvent::Received(decrypted.clone()));
        Ok(Some(decrypted))
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn check_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(Error::InvalidMessageContent("message is empty".into()));
        }
        if text.len() > self.config.max_message_size {
            return Err(Error::InvalidMessageContent(format!(
                "Message too large: {} bytes (max {})",
                text.len(),
                self.config.max_message_size
            )));
        }
        Ok(())
    }

    /// Turn a decryption outcome into a display message
    ///
    /// Only `NotAuthenticated` is passed through; every other failure is
    /// rendered as the placeholder.
    fn open(
        &self,
        message: EncryptedMessage,
        result: Result<MessageContent>,
    ) -> Result<DecryptedMessage> {
        match result {
            Ok(content) => Ok(DecryptedMessage::from_parts(message, Some(content))),
            Err(Error::NotAuthenticated) => Err(Error::NotAuthenticated),
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    sender = %message.sender,
                    error = %e,
                    "Message could not be decrypted"
                );
                Ok(DecryptedMessage::from_parts(message, None))
            }
        }
    }

    async fn encrypt_direct(
        &self,
        session: &Session,
        recipient: &str,
        plaintext: &[u8],
    ) -> Result<codec::EncryptedPayload> {
        let key = self.deriver.derive_for_peer(session, recipient).await?;
        codec::encrypt(key.key(), plaintext)
    }

    async fn encrypt_group(
        &self,
        session: &Session,
        group_id: &str,
        plaintext: &[u8],
    ) -> Result<(BTreeMap<String, codec::EncryptedPayload>, BTreeMap<String, Error>)> {
        let keys = self.deriver.derive_group_keys(session, group_id).await?;
        let member_keys = keys.member_keys();
        let mut skipped = keys.failures;

        let encrypted = group::encrypt_for_group(&member_keys, plaintext)?;
        skipped.extend(encrypted.failures);

        let has_other_member = encrypted.payloads.keys().any(|m| m != session.username());
        if !has_other_member {
            return Err(Error::DeliveryFailed(format!(
                "no member of {} other than the sender could be keyed",
                group_id
            )));
        }

        Ok((encrypted.payloads, skipped))
    }

    async fn transmit_direct(
        &self,
        session: &Session,
        recipient: &str,
        body: MessageBody,
    ) -> Result<SentMessage> {
        let state = MessageState::Composed.advance(MessageState::Encrypted)?;
        let message = OutgoingMessage {
            id: Uuid::new_v4().to_string(),
            sender: session.username().to_string(),
            recipient: recipient.to_string(),
            body,
            timestamp: crate::time::now_millis(),
        };

        if self.config.verbose_logging {
            tracing::debug!(
                message_id = %message.id,
                kind = message.body.kind(),
                ciphertext_len = message.body.ciphertext().len(),
                "Transmitting direct message"
            );
        }

        let state = state.advance(MessageState::Transmitted)?;
        let result = self.transport.send_message(&message).await;
        let receipt = self.settle(state, result, || PendingDelivery::Direct(message.clone()))?;

        tracing::info!(message_id = %message.id, recipient = %recipient, "Message sent");
        Ok(SentMessage {
            id: message.id,
            timestamp: message.timestamp,
            state: MessageState::Delivered,
            recipients: receipt.recipients,
            skipped: BTreeMap::new(),
        })
    }

    async fn transmit_group(
        &self,
        session: &Session,
        group_id: &str,
        body: GroupBody,
        skipped: BTreeMap<String, Error>,
    ) -> Result<SentMessage> {
        let state = MessageState::Composed.advance(MessageState::Encrypted)?;
        let message = OutgoingGroupMessage {
            id: Uuid::new_v4().to_string(),
            sender: session.username().to_string(),
            group: group_id.to_string(),
            body,
            timestamp: crate::time::now_millis(),
        };

        if self.config.verbose_logging {
            tracing::debug!(
                message_id = %message.id,
                members = message.body.ciphertexts().len(),
                "Transmitting group message"
            );
        }

        let state = state.advance(MessageState::Transmitted)?;
        let result = self.transport.send_group_message(&message).await;
        let receipt = self.settle(state, result, || PendingDelivery::Group(message.clone()))?;

        tracing::info!(
            message_id = %message.id,
            group = %group_id,
            recipients = receipt.recipients,
            skipped = skipped.len(),
            "Group message sent"
        );
        Ok(SentMessage {
            id: message.id,
            timestamp: message.timestamp,
            state: MessageState::Delivered,
            recipients: receipt.recipients,
            skipped,
        })
    }

    /// Record the transport outcome of a transmitted message
    fn settle(
        &self,
        state: MessageState,
        result: Result<DeliveryReceipt>,
        pending: impl FnOnce() -> PendingDelivery,
    ) -> Result<DeliveryReceipt> {
        match result {
            Ok(receipt) => {
                state.advance(MessageState::Delivered)?;
                let _ = self.events.send(MessageEvent::Delivered {
                    message_id: receipt.message_id.clone(),
                });
                Ok(receipt)
            }
            Err(e) => {
                state.advance(MessageState::DeliveryFailed)?;
                let pending = pending();
                tracing::warn!(message_id = %pending.id(), error = %e, "Message delivery failed");
                let _ = self.events.send(MessageEvent::DeliveryFailed {
                    message_id: pending.id().to_string(),
                    reason: e.to_string(),
                });
                if e.is_recoverable() {
                    self.outbox.write().push(pending);
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService")
            .field("pending", &self.outbox.read().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

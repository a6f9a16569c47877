//! # Session Key Exchange
//!
//! Derives the AES-256-GCM key shared by two accounts.
//!
//! ## Pairwise Derivation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PAIRWISE SESSION KEY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Session ──► SecretCache ──► PKCS#8 import ──► our P-256 secret        │
//! │                                                        │                │
//! │  Directory ──► base64 SPKI ──► decode ──► import ──► their P-256 point │
//! │                                                        │                │
//! │                                                        ▼                │
//! │                              ECDH → 32-byte shared x-coordinate         │
//! │                                                        │                │
//! │                                                        ▼                │
//! │                              AES-256-GCM key (used as-is)              │
//! │                                                                         │
//! │  derive(alice, bob_pub) == derive(bob, alice_pub)                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no HKDF step. Deployed clients use the raw shared secret as the
//! key, and changing that would make every stored message unreadable.
//!
//! ## Group Derivation
//!
//! One pairwise derivation per roster member, issued concurrently. A member
//! whose key cannot be derived is reported in [`GroupKeys::failures`]; the
//! others are unaffected.
//!
//! Keys resolved by username come back as a [`SessionKey`] that records who
//! the key is shared with and when the ECDH ran.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::crypto::{AccountPublicKey, SymmetricKey};
use crate::directory::PeerDirectory;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::time::now_millis;

/// Who a session key is shared with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    /// A direct conversation with one user
    Peer(String),
    /// One member's copy of a group fan-out
    Group {
        /// Group ID
        group: String,
        /// Member the key is shared with
        member: String,
    },
}

/// A derived key together with its owner and derivation time
///
/// Dropped (and zeroized) after the operation that needed it, unless the
/// session's key cache keeps the underlying key.
#[derive(Debug, Clone)]
pub struct SessionKey {
    scope: KeyScope,
    key: SymmetricKey,
    derived_at: i64,
}

impl SessionKey {
    /// Who the key is shared with
    pub fn scope(&self) -> &KeyScope {
        &self.scope
    }

    /// Username on the other end of the key
    pub fn peer(&self) -> &str {
        match &self.scope {
            KeyScope::Peer(peer) => peer,
            KeyScope::Group { member, .. } => member,
        }
    }

    /// Group the key was derived for, if any
    pub fn group(&self) -> Option<&str> {
        match &self.scope {
            KeyScope::Peer(_) => None,
            KeyScope::Group { group, .. } => Some(group),
        }
    }

    /// The AES-256-GCM key
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Unix time (milliseconds) of the ECDH that produced the key
    pub fn derived_at(&self) -> i64 {
        self.derived_at
    }
}

/// Per-member outcome of a group derivation
#[derive(Debug, Default)]
pub struct GroupKeys {
    /// Keys for members whose derivation succeeded
    pub keys: BTreeMap<String, SessionKey>,
    /// Members whose derivation failed, with the reason
    pub failures: BTreeMap<String, Error>,
}

impl GroupKeys {
    /// Whether no member could be keyed
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Bare keys by member, as the fan-out encryption takes them
    pub fn member_keys(&self) -> BTreeMap<String, SymmetricKey> {
        self.keys
            .iter()
            .map(|(member, key)| (member.clone(), key.key().clone()))
            .collect()
    }
}

/// Derives pairwise and group session keys
#[derive(Clone)]
pub struct SessionKeyDeriver {
    directory: Arc<dyn PeerDirectory>,
}

impl SessionKeyDeriver {
    /// Create a deriver that resolves peers through `directory`
    pub fn new(directory: Arc<dyn PeerDirectory>) -> Self {
        Self { directory }
    }

    /// Derive the key shared with the holder of `peer_public_key`
    ///
    /// ## Errors
    ///
    /// - `NotAuthenticated` if the session has ended
    /// - `PlatformCryptoError` if the public key is not base64 P-256 SPKI
    pub fn derive_pairwise_key(
        &self,
        session: &Session,
        peer_public_key: &str,
    ) -> Result<SymmetricKey> {
        self.derive_timed(session, peer_public_key).map(|(key, _)| key)
    }

    /// Look up a user's public key and derive the shared key
    pub async fn derive_for_peer(&self, session: &Session, username: &str) -> Result<SessionKey> {
        session.ensure_active()?;

        let peer_public_key = self.directory.get_public_key(username).await?;
        let (key, derived_at) = self.derive_timed(session, &peer_public_key)?;
        Ok(SessionKey {
            scope: KeyScope::Peer(username.to_string()),
            key,
            derived_at,
        })
    }

    /// Derive a key for every member of a group
    ///
    /// The roster is returned as-is, so it includes the sender when the
    /// sender is a member. That member's key is the session's self key.
    ///
    /// ## Errors
    ///
    /// Fails as a whole only when the session has ended or the roster
    /// lookup fails. Per-member failures land in [`GroupKeys::failures`].
    pub async fn derive_group_keys(&self, session: &Session, group_id: &str) -> Result<GroupKeys> {
        session.ensure_active()?;

        let members = self.directory.get_group_members(group_id).await?;
        tracing::debug!(group = %group_id, members = members.len(), "Deriving group keys");

        let results = join_all(members.into_iter().map(|member| async move {
            let outcome = self.derive_for_peer(session, &member).await;
            (member, outcome)
        }))
        .await;

        let mut group = GroupKeys::default();
        for (member, outcome) in results {
            match outcome {
                Ok(peer_key) => {
                    let key = SessionKey {
                        scope: KeyScope::Group {
                            group: group_id.to_string(),
                            member: member.clone(),
                        },
                        key: peer_key.key,
                        derived_at: peer_key.derived_at,
                    };
                    group.keys.insert(member, key);
                }
                Err(Error::NotAuthenticated) => return Err(Error::NotAuthenticated),
                Err(e) => {
                    tracing::warn!(
                        group = %group_id,
                        member = %member,
                        error = %e,
                        "Group member key unavailable"
                    );
                    group.failures.insert(member, e);
                }
            }
        }

        Ok(group)
    }

    /// ECDH with the session's secret, through the key cache
    ///
    /// Returns the key and the time it was first derived.
    fn derive_timed(
        &self,
        session: &Session,
        peer_public_key: &str,
    ) -> Result<(SymmetricKey, i64)> {
        session.ensure_active()?;

        if let Some(cached) = session.key_cache().get(peer_public_key) {
            return Ok(cached);
        }

        let our_secret = session.private_key()?;
        let their_public = AccountPublicKey::from_base64(peer_public_key)?;
        let key = our_secret.diffie_hellman(&their_public);
        let derived_at = now_millis();

        session.key_cache().insert(peer_public_key, key.clone(), derived_at);
        Ok((key, derived_at))
    }
}

impl std::fmt::Debug for SessionKeyDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyDeriver").finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

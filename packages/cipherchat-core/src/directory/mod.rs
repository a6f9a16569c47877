//! # Peer Directory
//!
//! Where public keys and group rosters come from.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PEER DIRECTORY                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  get_public_key("bob")        → "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcD..."  │
//! │                                 (base64 DER SPKI)                      │
//! │                                                                         │
//! │  get_group_members("g-42")    → { "alice", "bob", "carol" }           │
//! │                                                                         │
//! │  Failures:                                                             │
//! │  • unknown user / no key      → PeerKeyUnavailable (never retried)     │
//! │  • unknown group              → GroupNotFound                          │
//! │  • network                    → TransportError / Timeout               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The directory is trusted: a substituted public key is not detected here.
//! Compare [`AccountPublicKey::fingerprint`] out of band when that matters.
//!
//! [`AccountPublicKey::fingerprint`]: crate::crypto::AccountPublicKey::fingerprint

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::Result;

/// Lookup of published public keys and group membership
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Base64 SPKI public key of a user
    async fn get_public_key(&self, username: &str) -> Result<String>;

    /// Usernames in a group
    async fn get_group_members(&self, group_id: &str) -> Result<BTreeSet<String>>;
}

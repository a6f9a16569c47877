//! # Session Module
//!
//! The logged-in user's unwrapped private key, held in memory only.
//!
//! ## Session Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SESSION MODEL                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  login(username, wrapped key, password)                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SecretCache                                                    │   │
//! │  │  ───────────                                                     │   │
//! │  │  "alice" → PKCS#8 bytes (zeroized on removal)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Session { username, secrets, key cache }                       │   │
//! │  │  Passed by reference to every operation that needs the key     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  logout() → entry removed, derived keys dropped                        │
//! │             every later operation fails with NotAuthenticated          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is global. Two sessions for two users can share one
//! [`SecretCache`] or use separate ones.

mod key_cache;

pub use key_cache::KeyCache;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::crypto::AccountPrivateKey;
use crate::error::{Error, Result};
use crate::identity::{KeyPairVault, WrappedPrivateKey};

/// In-memory map from username to that user's PKCS#8 private key
///
/// Entries are zeroized when removed or when the cache is dropped. The
/// cache is never persisted.
#[derive(Default)]
pub struct SecretCache {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl SecretCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a user's private key, replacing any previous entry
    pub fn insert(&self, username: &str, private_key: &AccountPrivateKey) -> Result<()> {
        let pkcs8 = private_key.to_pkcs8_der()?;
        self.entries.write().insert(username.to_string(), pkcs8);
        Ok(())
    }

    /// Import the private key for a user
    ///
    /// Returns `NotAuthenticated` if the user has no entry.
    pub fn get(&self, username: &str) -> Result<AccountPrivateKey> {
        let entries = self.entries.read();
        let pkcs8 = entries.get(username).ok_or(Error::NotAuthenticated)?;
        AccountPrivateKey::from_pkcs8_der(pkcs8)
    }

    /// Remove a user's entry
    pub fn remove(&self, username: &str) -> bool {
        self.entries.write().remove(username).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Check whether a user has an entry
    pub fn contains(&self, username: &str) -> bool {
        self.entries.read().contains_key(username)
    }

    /// Number of cached users
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache").field("entries", &self.len()).finish()
    }
}

/// An authenticated user's context
///
/// Cloning is cheap and every clone refers to the same cache entries, so a
/// logout through any clone ends them all.
#[derive(Clone)]
pub struct Session {
    username: String,
    secrets: Arc<SecretCache>,
    keys: Arc<KeyCache>,
}

impl Session {
    /// Unwrap the stored private key and start a session
    ///
    /// Fails with `AuthenticationFailure` when the password is wrong. The
    /// cache is not touched on failure.
    pub fn login(
        secrets: Arc<SecretCache>,
        vault: &KeyPairVault,
        username: &str,
        wrapped: &WrappedPrivateKey,
        password: &str,
    ) -> Result<Self> {
        let private_key = vault.unwrap(wrapped, password).map_err(|e| {
            tracing::warn!(username = %username, "Private key unwrap failed");
            e
        })?;

        let session = Self::from_private_key(secrets, username, &private_key)?;
        tracing::info!(username = %username, "Session started");
        Ok(session)
    }

    /// Start a session from a key pair that is already in hand
    ///
    /// Used right after enrollment, when the fresh private key has not yet
    /// gone through a wrap/unwrap cycle.
    pub fn from_private_key(
        secrets: Arc<SecretCache>,
        username: &str,
        private_key: &AccountPrivateKey,
    ) -> Result<Self> {
        secrets.insert(username, private_key)?;
        Ok(Self {
            username: username.to_string(),
            secrets,
            keys: Arc::new(KeyCache::disabled()),
        })
    }

    /// Keep up to `capacity` derived session keys for this login
    ///
    /// A capacity of 0 disables caching.
    pub fn with_key_cache(mut self, capacity: usize) -> Self {
        self.keys = Arc::new(KeyCache::new(capacity));
        self
    }

    /// The logged-in username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Import the private key for one operation
    pub fn private_key(&self) -> Result<AccountPrivateKey> {
        self.secrets.get(&self.username)
    }

    /// Fail with `NotAuthenticated` once the session has ended
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    /// Whether the private key is still cached
    pub fn is_active(&self) -> bool {
        self.secrets.contains(&self.username)
    }

    /// Derived session keys for this login
    pub fn key_cache(&self) -> &KeyCache {
        &self.keys
    }

    /// End the session
    ///
    /// Removes the private key and drops every derived key. Idempotent.
    pub fn logout(&self) {
        let removed = self.secrets.remove(&self.username);
        self.keys.clear();
        if removed {
            tracing::info!(username = %self.username, "Session ended");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AccountKeyPair, Salt};

    fn wrapped_for(vault: &KeyPairVault, kp: &AccountKeyPair, password: &str) -> WrappedPrivateKey {
        vault
            .wrap_private_key(kp.private_key(), password, &Salt::random().unwrap())
            .unwrap()
    }

    #[test]
    fn test_cache_insert_get_remove() {
        let cache = SecretCache::new();
        let kp = AccountKeyPair::generate().unwrap();

        assert!(matches!(cache.get("alice"), Err(Error::NotAuthenticated)));

        cache.insert("alice", kp.private_key()).unwrap();
        assert!(cache.contains("alice"));
        assert_eq!(cache.get("alice").unwrap().public_key(), *kp.public_key());

        assert!(cache.remove("alice"));
        assert!(!cache.remove("alice"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_clear() {
        let cache = SecretCache::new();
        cache.insert("alice", AccountKeyPair::generate().unwrap().private_key()).unwrap();
        cache.insert("bob", AccountKeyPair::generate().unwrap().private_key()).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_login_and_logout() {
        let vault = KeyPairVault::with_iterations(1_000);
        let kp = AccountKeyPair::generate().unwrap();
        let wrapped = wrapped_for(&vault, &kp, "pw");
        let secrets = Arc::new(SecretCache::new());

        let session = Session::login(secrets.clone(), &vault, "alice", &wrapped, "pw").unwrap();
        assert_eq!(session.username(), "alice");
        assert_eq!(session.private_key().unwrap().public_key(), *kp.public_key());
        session.ensure_active().unwrap();

        session.logout();
        assert!(!secrets.contains("alice"));
        assert!(matches!(session.private_key(), Err(Error::NotAuthenticated)));
        assert!(matches!(session.ensure_active(), Err(Error::NotAuthenticated)));
    }

    #[test]
    fn test_login_wrong_password_leaves_cache_untouched() {
        let vault = KeyPairVault::with_iterations(1_000);
        let kp = AccountKeyPair::generate().unwrap();
        let wrapped = wrapped_for(&vault, &kp, "pw");
        let secrets = Arc::new(SecretCache::new());

        let result = Session::login(secrets.clone(), &vault, "alice", &wrapped, "nope");
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
        assert!(secrets.is_empty());
    }

    #[test]
    fn test_logout_through_clone_ends_all() {
        let secrets = Arc::new(SecretCache::new());
        let kp = AccountKeyPair::generate().unwrap();
        let session = Session::from_private_key(secrets, "alice", kp.private_key()).unwrap();
        let clone = session.clone();

        clone.logout();
        assert!(!session.is_active());
    }

    #[test]
    fn test_sessions_share_cache_independently() {
        let secrets = Arc::new(SecretCache::new());
        let alice = Session::from_private_key(
            secrets.clone(),
            "alice",
            AccountKeyPair::generate().unwrap().private_key(),
        )
        .unwrap();
        let bob = Session::from_private_key(
            secrets.clone(),
            "bob",
            AccountKeyPair::generate().unwrap().private_key(),
        )
        .unwrap();

        alice.logout();
        assert!(!alice.is_active());
        assert!(bob.is_active());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let secrets = Arc::new(SecretCache::new());
        let session = Session::from_private_key(
            secrets.clone(),
            "alice",
            AccountKeyPair::generate().unwrap().private_key(),
        )
        .unwrap();

        let shown = format!("{:?} {:?}", session, secrets);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("PRIVATE"));
    }
}

//! Bounded cache of derived session keys.
//!
//! Disabled by default: every derivation runs ECDH again. When enabled, keys
//! are looked up by the peer's published public key, so a peer that
//! re-enrolls after a password reset misses the cache instead of getting a
//! stale key.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::crypto::SymmetricKey;

/// Insertion-ordered map with a fixed capacity
///
/// Each entry keeps the time its key was derived. The oldest entry is
/// evicted when full.
#[derive(Debug)]
pub struct KeyCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, (SymmetricKey, i64)>,
    order: VecDeque<String>,
}

impl KeyCache {
    /// Cache holding at most `capacity` keys
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Whether caching is on
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Look up the key derived with a peer's public key, and when it was derived
    pub fn get(&self, peer_public_key: &str) -> Option<(SymmetricKey, i64)> {
        if !self.is_enabled() {
            return None;
        }
        self.inner.lock().keys.get(peer_public_key).cloned()
    }

    /// Remember a derived key
    pub fn insert(&self, peer_public_key: &str, key: SymmetricKey, derived_at: i64) {
        if !self.is_enabled() {
            return;
        }

        let mut inner = self.inner.lock();
        let entry = (key, derived_at);
        if inner.keys.insert(peer_public_key.to_string(), entry).is_none() {
            inner.order.push_back(peer_public_key.to_string());
        }

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.keys.remove(&oldest);
            }
        }
    }

    /// Drop every key
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.keys.clear();
        inner.order.clear();
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.inner.lock().keys.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

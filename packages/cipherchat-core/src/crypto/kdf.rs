//! # Key Derivation Functions
//!
//! Password-based derivation of the key that wraps the account private key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    PASSWORD → WRAPPING KEY                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PBKDF2-HMAC-SHA256(                                                   │
//! │    password   = account password (UTF-8),                              │
//! │    salt       = 16 random bytes, fresh for every wrap,                 │
//! │    iterations = 100 000,                                               │
//! │    length     = 32 bytes                                               │
//! │  )                                                                      │
//! │        ↓                                                                │
//! │  AES-256-GCM wrapping key                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Session keys between accounts are NOT stretched: the raw ECDH output is
//! the AES key (see [`AccountPrivateKey::diffie_hellman`]).
//!
//! [`AccountPrivateKey::diffie_hellman`]: super::AccountPrivateKey::diffie_hellman

use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use super::encryption::{Iv, SymmetricKey, KEY_SIZE};
use crate::error::{Error, Result};

/// PBKDF2 iteration count for wrapping keys
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt size in bytes
pub const SALT_SIZE: usize = 16;

/// Per-wrap random salt
///
/// Must be regenerated for every wrap, and in particular whenever the
/// password changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generate a fresh random salt
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::PlatformCryptoError(format!("RNG unavailable: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// The salt doubles as the GCM IV for the wrap
    ///
    /// The wrapping key is derived from this very salt, so the (key, IV)
    /// pair can never repeat across wraps.
    pub(crate) fn as_iv(&self) -> Iv {
        Iv::from_bytes(self.0)
    }
}

/// Derive a 256-bit wrapping key from a password
pub fn derive_password_key(password: &str, salt: &Salt, iterations: u32) -> SymmetricKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt.0, iterations, &mut key);

    let derived = SymmetricKey::from_bytes(key);
    key.zeroize();
    derived
}

// ============================================================================
// TESTS
// ============================================================================

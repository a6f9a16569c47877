//! # Encryption Module
//!
//! AES-256-GCM for message confidentiality and integrity.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Session key (see exchange module)                             │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  ECDH(our P-256 secret, their P-256 public) → 32 raw bytes   │       │
//! │  │  Raw bytes are the AES-256 key                               │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 2: Generate IV (unique per message)                              │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Random 16 bytes from CSPRNG                                 │       │
//! │  │  (Never reuse an IV with the same key!)                      │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 3: Encrypt                                                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(key, iv, plaintext)                             │       │
//! │  │           ↓                                                  │       │
//! │  │  Ciphertext + 16-byte Auth Tag                               │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Output: (iv, ciphertext_with_tag)                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## IV Size
//!
//! The backend and every deployed client exchange 16-byte IVs, so this module
//! instantiates GCM with a 128-bit nonce instead of the usual 96 bits. GCM
//! hashes non-96-bit nonces through GHASH to form the initial counter; the
//! security bound for random IVs is unchanged for our message volumes.

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the AES-GCM IV in bytes (128 bits)
pub const IV_SIZE: usize = 16;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// AES-256-GCM with a 16-byte nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// An initialization vector for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse an IV with the same key!**
///
/// IV reuse under one key leaks the XOR of the plaintexts and lets an
/// attacker recover the GHASH key and forge messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Generate a cryptographically random IV
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; IV_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::PlatformCryptoError(format!("RNG unavailable: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting anything that is not exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM key
///
/// Zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &SymmetricKey) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    fn cipher(&self) -> Result<Aes256Gcm16> {
        Aes256Gcm16::new_from_slice(&self.0)
            .map_err(|e| Error::PlatformCryptoError(format!("Invalid key: {}", e)))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Encrypt with AES-256-GCM under a fresh random IV
///
/// ## Returns
///
/// Tuple of (iv, ciphertext_with_tag)
///
/// ## Example
///
/// ```ignore
/// let key = SymmetricKey::from_bytes([0u8; 32]);
/// let (iv, ciphertext) = encrypt(&key, b"Hello, Bob!")?;
/// ```
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<(Iv, Vec<u8>)> {
    let iv = Iv::random()?;
    let ciphertext = encrypt_with_iv(key, &iv, plaintext)?;
    Ok((iv, ciphertext))
}

/// Encrypt under a caller-chosen IV
///
/// Only for keys that are themselves single-use, like the password-derived
/// wrapping key whose IV is its own salt.
pub(crate) fn encrypt_with_iv(key: &SymmetricKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
    key.cipher()?
        .encrypt(Nonce::<U16>::from_slice(&iv.0), plaintext)
        .map_err(|e| Error::PlatformCryptoError(format!("Encryption failed: {}", e)))
}

/// Decrypt with AES-256-GCM
///
/// ## Errors
///
/// Returns `DecryptionFailure` if:
/// - The ciphertext was tampered with
/// - The key is wrong
/// - The IV is wrong
pub fn decrypt(key: &SymmetricKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::DecryptionFailure(
            "ciphertext shorter than the authentication tag".into(),
        ));
    }

    key.cipher()?
        .decrypt(Nonce::<U16>::from_slice(&iv.0), ciphertext)
        .map_err(|_| Error::DecryptionFailure("authentication tag mismatch".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let plaintext = b"Hello, World!";

        let (iv, ciphertext) = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = SymmetricKey::from_bytes([42u8; 32]);

        let (iv, ciphertext) = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SymmetricKey::from_bytes([42u8; 32]);

        let (iv, mut ciphertext) = encrypt(&key, b"Hello, World!").unwrap();
        ciphertext[0] ^= 0x01;

        let result = decrypt(&key, &iv, &ciphertext);
        assert!(matches!(result, Err(Error::DecryptionFailure(_))));
    }

    #[test]
    fn test_tampered_iv_fails() {
        let key = SymmetricKey::from_bytes([42u8; 32]);

        let (iv, ciphertext) = encrypt(&key, b"Hello, World!").unwrap();
        let mut bytes = *iv.as_bytes();
        bytes[IV_SIZE - 1] ^= 0x80;

        let result = decrypt(&key, &Iv::from_bytes(bytes), &ciphertext);
        assert!(matches!(result, Err(Error::DecryptionFailure(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SymmetricKey::from_bytes([42u8; 32]);
        let key2 = SymmetricKey::from_bytes([99u8; 32]);

        let (iv, ciphertext) = encrypt(&key1, b"secret").unwrap();
        assert!(decrypt(&key2, &iv, &ciphertext).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = SymmetricKey::from_bytes([42u8; 32]);
        let iv = Iv::random().unwrap();

        let result = decrypt(&key, &iv, &[0u8; TAG_SIZE - 1]);
        assert!(matches!(result, Err(Error::DecryptionFailure(_))));
    }

    #[test]
    fn test_different_ivs_produce_different_ciphertext() {
        let key = SymmetricKey::from_bytes([42u8; 32]);

        let (iv1, ct1) = encrypt(&key, b"Hello, World!").unwrap();
        let (iv2, ct2) = encrypt(&key, b"Hello, World!").unwrap();

        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_iv_from_slice_length() {
        assert!(Iv::from_slice(&[0u8; 12]).is_none());
        assert!(Iv::from_slice(&[0u8; 16]).is_some());
    }

    #[test]
    fn test_key_ct_eq() {
        let a = SymmetricKey::from_bytes([1u8; 32]);
        let b = SymmetricKey::from_bytes([1u8; 32]);
        let c = SymmetricKey::from_bytes([2u8; 32]);
        assert!(a.ct_eq(&b));
        assert!(!a.ct_eq(&c));
    }
}

//! # Key Management
//!
//! Account key pairs for the P-256 key exchange.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  AccountPrivateKey (P-256 scalar)                               │   │
//! │  │  ─────────────────────────────────                               │   │
//! │  │                                                                  │   │
//! │  │  Purpose:                                                       │   │
//! │  │  • ECDH with each peer's public key                             │   │
//! │  │                                                                  │   │
//! │  │  Format:                                                        │   │
//! │  │  • Exported as DER PKCS#8 (what gets password-wrapped)          │   │
//! │  │  • Zeroized on drop                                             │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  AccountPublicKey (P-256 point)                                 │   │
//! │  │  ──────────────────────────────                                  │   │
//! │  │                                                                  │   │
//! │  │  Format:                                                        │   │
//! │  │  • DER SubjectPublicKeyInfo, standard base64 on the wire        │   │
//! │  │  • Immutable for the account's lifetime                         │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both encodings are what WebCrypto's `exportKey("pkcs8")` and
//! `exportKey("spki")` produce, so keys move between this crate and browser
//! clients unchanged.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::{
    ecdh,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    PublicKey, SecretKey,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use super::encryption::{SymmetricKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Long-term account key pair
///
/// Generated once at signup (and again on identity recovery). The private
/// half is wrapped under the account password before it leaves the client.
pub struct AccountKeyPair {
    secret: AccountPrivateKey,
    public: AccountPublicKey,
}

impl AccountKeyPair {
    /// Generate a new random key pair from the OS CSPRNG
    pub fn generate() -> Result<Self> {
        let secret = AccountPrivateKey::generate()?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    /// The private half
    pub fn private_key(&self) -> &AccountPrivateKey {
        &self.secret
    }

    /// The public half
    pub fn public_key(&self) -> &AccountPublicKey {
        &self.public
    }

    /// Split into (private, public)
    pub fn into_parts(self) -> (AccountPrivateKey, AccountPublicKey) {
        (self.secret, self.public)
    }
}

/// P-256 private scalar
///
/// `p256::SecretKey` zeroizes itself on drop.
#[derive(Clone)]
pub struct AccountPrivateKey(SecretKey);

impl AccountPrivateKey {
    /// Generate a new random private key
    ///
    /// Draws 32 bytes until they form a valid non-zero scalar; a rejection
    /// happens with probability below 2^-32.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        loop {
            OsRng
                .try_fill_bytes(&mut bytes[..])
                .map_err(|e| Error::PlatformCryptoError(format!("RNG unavailable: {}", e)))?;
            if let Ok(secret) = SecretKey::from_slice(&bytes[..]) {
                return Ok(Self(secret));
            }
        }
    }

    /// Export as DER PKCS#8
    ///
    /// ## Security Warning
    ///
    /// Only for wrapping and the in-memory secret cache. Never log or
    /// transmit these bytes.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = self
            .0
            .to_pkcs8_der()
            .map_err(|e| Error::PlatformCryptoError(format!("PKCS#8 export failed: {}", e)))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Import from DER PKCS#8
    pub fn from_pkcs8_der(bytes: &[u8]) -> Result<Self> {
        SecretKey::from_pkcs8_der(bytes)
            .map(Self)
            .map_err(|e| Error::PlatformCryptoError(format!("PKCS#8 import failed: {}", e)))
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> AccountPublicKey {
        AccountPublicKey(self.0.public_key())
    }

    /// Perform the ECDH key agreement
    ///
    /// Returns the 32-byte x-coordinate of the shared point, used directly
    /// as the AES-256-GCM key. Both parties compute the same value:
    /// - Alice: alice_secret × bob_public
    /// - Bob: bob_secret × alice_public
    pub fn diffie_hellman(&self, their_public: &AccountPublicKey) -> SymmetricKey {
        let shared = ecdh::diffie_hellman(self.0.to_nonzero_scalar(), their_public.0.as_affine());

        let mut raw = [0u8; KEY_SIZE];
        raw.copy_from_slice(shared.raw_secret_bytes());
        let key = SymmetricKey::from_bytes(raw);
        raw.zeroize();
        key
    }
}

impl std::fmt::Debug for AccountPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccountPrivateKey(..)")
    }
}

/// P-256 public key
///
/// Contains only public information; safe to serialize, transmit and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPublicKey(PublicKey);

impl AccountPublicKey {
    /// Export as DER SubjectPublicKeyInfo
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        self.0
            .to_public_key_der()
            .map(|document| document.as_bytes().to_vec())
            .map_err(|e| Error::PlatformCryptoError(format!("SPKI export failed: {}", e)))
    }

    /// Import from DER SubjectPublicKeyInfo
    ///
    /// Fails for other curves and for points not on P-256.
    pub fn from_spki_der(bytes: &[u8]) -> Result<Self> {
        PublicKey::from_public_key_der(bytes)
            .map(Self)
            .map_err(|e| Error::PlatformCryptoError(format!("SPKI import failed: {}", e)))
    }

    /// Encode as base64 SPKI, the form published to the backend
    pub fn to_base64(&self) -> Result<String> {
        Ok(BASE64.encode(self.to_spki_der()?))
    }

    /// Decode from base64 SPKI
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let der = BASE64
            .decode(encoded.trim())
            .map_err(|e| {
                Error::PlatformCryptoError(format!("Invalid public key encoding: {}", e))
            })?;
        Self::from_spki_der(&der)
    }

    /// Short fingerprint for out-of-band comparison (hex, 32 chars)
    pub fn fingerprint(&self) -> Result<String> {
        let digest = Sha256::digest(self.to_spki_der()?);
        Ok(hex::encode(&digest[..16]))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = AccountKeyPair::generate().unwrap();
        let kp2 = AccountKeyPair::generate().unwrap();

        assert_ne!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.private_key().public_key(), *kp1.public_key());
    }

    #[test]
    fn test_diffie_hellman_symmetry() {
        let alice = AccountKeyPair::generate().unwrap();
        let bob = AccountKeyPair::generate().unwrap();

        let alice_shared = alice.private_key().diffie_hellman(bob.public_key());
        let bob_shared = bob.private_key().diffie_hellman(alice.public_key());

        assert!(alice_shared.ct_eq(&bob_shared));
    }

    #[test]
    fn test_different_peers_different_secrets() {
        let alice = AccountKeyPair::generate().unwrap();
        let bob = AccountKeyPair::generate().unwrap();
        let carol = AccountKeyPair::generate().unwrap();

        let with_bob = alice.private_key().diffie_hellman(bob.public_key());
        let with_carol = alice.private_key().diffie_hellman(carol.public_key());

        assert!(!with_bob.ct_eq(&with_carol));
    }

    #[test]
    fn test_pkcs8_round_trip() {
        let kp = AccountKeyPair::generate().unwrap();
        let der = kp.private_key().to_pkcs8_der().unwrap();

        let restored = AccountPrivateKey::from_pkcs8_der(&der).unwrap();
        assert_eq!(restored.public_key(), *kp.public_key());
    }

    #[test]
    fn test_public_key_base64_round_trip() {
        let kp = AccountKeyPair::generate().unwrap();
        let encoded = kp.public_key().to_base64().unwrap();

        let restored = AccountPublicKey::from_base64(&encoded).unwrap();
        assert_eq!(restored, *kp.public_key());
    }

    #[test]
    fn test_garbage_public_key_rejected() {
        let result = AccountPublicKey::from_base64("bm90IGEga2V5");
        assert!(matches!(result, Err(Error::PlatformCryptoError(_))));

        let result = AccountPublicKey::from_base64("%%%");
        assert!(matches!(result, Err(Error::PlatformCryptoError(_))));
    }

    #[test]
    fn test_truncated_spki_rejected() {
        let kp = AccountKeyPair::generate().unwrap();
        let der = kp.public_key().to_spki_der().unwrap();

        let result = AccountPublicKey::from_spki_der(&der[..der.len() - 4]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_stable() {
        let kp = AccountKeyPair::generate().unwrap();
        let f1 = kp.public_key().fingerprint().unwrap();
        let f2 = kp.public_key().fingerprint().unwrap();

        assert_eq!(f1, f2);
        assert_eq!(f1.len(), 32);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let kp = AccountKeyPair::generate().unwrap();
        assert_eq!(format!("{:?}", kp.private_key()), "AccountPrivateKey(..)");
    }
}

//! Password-wrapped storage of the account private key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::crypto::{
    decrypt, derive_password_key, encrypt_with_iv, AccountKeyPair, AccountPrivateKey, Salt,
    PBKDF2_ITERATIONS, SALT_SIZE,
};
use crate::error::{Error, Result};

/// The private key as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedPrivateKey {
    /// Base64 AES-256-GCM ciphertext of the PKCS#8 private key (tag appended)
    pub ciphertext: String,
    /// Base64 16-byte PBKDF2 salt
    pub salt: String,
}

/// What the client publishes at signup and on identity recovery
///
/// Field names match the backend's registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPublication {
    /// Base64 DER SPKI public key
    pub public_key: String,
    /// Base64 wrapped private key
    pub encrypted_private_key: String,
    /// Base64 salt used for the wrap
    pub private_key_salt: String,
}

impl KeyPublication {
    /// The wrapped half, as it comes back from the backend at login
    pub fn wrapped_private_key(&self) -> WrappedPrivateKey {
        WrappedPrivateKey {
            ciphertext: self.encrypted_private_key.clone(),
            salt: self.private_key_salt.clone(),
        }
    }
}

/// Generates account key pairs and wraps them under the account password
#[derive(Debug, Clone, Copy)]
pub struct KeyPairVault {
    iterations: u32,
}

impl Default for KeyPairVault {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPairVault {
    /// Vault with the standard 100 000 PBKDF2 iterations
    pub fn new() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Vault with a custom iteration count
    ///
    /// Every client of one backend must agree on this value, or no one can
    /// unwrap anyone's key. Lower counts are only for tests.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Vault configured from [`CoreConfig::pbkdf2_iterations`]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::with_iterations(config.pbkdf2_iterations)
    }

    /// PBKDF2 iteration count in use
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Generate a new account key pair
    pub fn generate_key_pair(&self) -> Result<AccountKeyPair> {
        AccountKeyPair::generate()
    }

    /// Wrap a private key under a password
    ///
    /// The caller supplies the salt and must draw a fresh one for every
    /// wrap, including every password change.
    pub fn wrap_private_key(
        &self,
        private_key: &AccountPrivateKey,
        password: &str,
        salt: &Salt,
    ) -> Result<WrappedPrivateKey> {
        let wrapping_key = derive_password_key(password, salt, self.iterations);
        let pkcs8 = private_key.to_pkcs8_der()?;

        let ciphertext = encrypt_with_iv(&wrapping_key, &salt.as_iv(), &pkcs8)?;

        Ok(WrappedPrivateKey {
            ciphertext: BASE64.encode(ciphertext),
            salt: BASE64.encode(salt.as_bytes()),
        })
    }

    /// Unwrap a private key previously produced by [`wrap_private_key`]
    ///
    /// Every failure is reported as `AuthenticationFailure`: wrong
    /// password, tampered or undecodable blob, and plaintext that does not
    /// import as a P-256 key all look the same to the caller. The PBKDF2
    /// derivation runs even when the inputs do not decode.
    ///
    /// [`wrap_private_key`]: Self::wrap_private_key
    pub fn unwrap_private_key(
        &self,
        wrapped_ciphertext: &str,
        password: &str,
        salt: &str,
    ) -> Result<AccountPrivateKey> {
        let salt = decode_salt(salt);
        let ciphertext = BASE64.decode(wrapped_ciphertext.trim()).ok();

        let fallback = Salt::from_bytes([0u8; SALT_SIZE]);
        let wrapping_key =
            derive_password_key(password, salt.as_ref().unwrap_or(&fallback), self.iterations);

        let (Some(salt), Some(ciphertext)) = (salt, ciphertext) else {
            tracing::debug!("Wrapped private key did not decode");
            return Err(Error::AuthenticationFailure);
        };

        let pkcs8 = zeroize::Zeroizing::new(
            decrypt(&wrapping_key, &salt.as_iv(), &ciphertext)
                .map_err(|_| Error::AuthenticationFailure)?,
        );

        AccountPrivateKey::from_pkcs8_der(&pkcs8).map_err(|_| Error::AuthenticationFailure)
    }

    /// Unwrap a [`WrappedPrivateKey`]
    pub fn unwrap(&self, wrapped: &WrappedPrivateKey, password: &str) -> Result<AccountPrivateKey> {
        self.unwrap_private_key(&wrapped.ciphertext, password, &wrapped.salt)
    }

    /// Create a fresh key pair and its publication payload
    ///
    /// Used at signup and on identity recovery. Each call yields a new key
    /// pair and a new salt.
    pub fn enroll(&self, password: &str) -> Result<(AccountKeyPair, KeyPublication)> {
        let key_pair = self.generate_key_pair()?;
        let salt = Salt::random()?;
        let wrapped = self.wrap_private_key(key_pair.private_key(), password, &salt)?;

        let publication = KeyPublication {
            public_key: key_pair.public_key().to_base64()?,
            encrypted_private_key: wrapped.ciphertext,
            private_key_salt: wrapped.salt,
        };

        tracing::info!(
            fingerprint = %key_pair.public_key().fingerprint()?,
            "Enrolled new account key pair"
        );

        Ok((key_pair, publication))
    }
}

fn decode_salt(encoded: &str) -> Option<Salt> {
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    let bytes: [u8; SALT_SIZE] = bytes.try_into().ok()?;
    Some(Salt::from_bytes(bytes))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> KeyPairVault {
        KeyPairVault::with_iterations(1_000)
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let vault = test_vault();
        let kp = vault.generate_key_pair().unwrap();
        let salt = Salt::random().unwrap();

        let wrapped = vault.wrap_private_key(kp.private_key(), "correct horse", &salt).unwrap();
        let restored = vault
            .unwrap_private_key(&wrapped.ciphertext, "correct horse", &wrapped.salt)
            .unwrap();

        assert_eq!(restored.public_key(), *kp.public_key());
    }

    #[test]
    fn test_round_trip_at_default_iterations() {
        let vault = KeyPairVault::new();
        assert_eq!(vault.iterations(), 100_000);

        let kp = vault.generate_key_pair().unwrap();
        let wrapped = vault
            .wrap_private_key(kp.private_key(), "pw", &Salt::random().unwrap())
            .unwrap();

        let restored = vault.unwrap(&wrapped, "pw").unwrap();
        assert_eq!(restored.public_key(), *kp.public_key());
    }

    #[test]
    fn test_wrong_password_rejected() {
        let vault = test_vault();
        let kp = vault.generate_key_pair().unwrap();
        let wrapped = vault
            .wrap_private_key(kp.private_key(), "correct horse", &Salt::random().unwrap())
            .unwrap();

        let result = vault.unwrap(&wrapped, "battery staple");
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let vault = test_vault();
        let kp = vault.generate_key_pair().unwrap();
        let mut wrapped = vault
            .wrap_private_key(kp.private_key(), "pw", &Salt::random().unwrap())
            .unwrap();

        let mut raw = BASE64.decode(&wrapped.ciphertext).unwrap();
        raw[10] ^= 0x01;
        wrapped.ciphertext = BASE64.encode(raw);

        assert!(matches!(vault.unwrap(&wrapped, "pw"), Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_undecodable_inputs_rejected() {
        let vault = test_vault();
        let salt = BASE64.encode([1u8; SALT_SIZE]);

        assert!(matches!(
            vault.unwrap_private_key("not base64!", "pw", &salt),
            Err(Error::AuthenticationFailure)
        ));
        assert!(matches!(
            vault.unwrap_private_key("AAAA", "pw", "c2hvcnQ="),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_wrong_salt_rejected() {
        let vault = test_vault();
        let kp = vault.generate_key_pair().unwrap();
        let wrapped = vault
            .wrap_private_key(kp.private_key(), "pw", &Salt::from_bytes([3u8; SALT_SIZE]))
            .unwrap();

        let other_salt = BASE64.encode([4u8; SALT_SIZE]);
        let result = vault.unwrap_private_key(&wrapped.ciphertext, "pw", &other_salt);
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_iteration_mismatch_rejected() {
        let kp = test_vault().generate_key_pair().unwrap();
        let wrapped = test_vault()
            .wrap_private_key(kp.private_key(), "pw", &Salt::random().unwrap())
            .unwrap();

        let result = KeyPairVault::with_iterations(1_001).unwrap(&wrapped, "pw");
        assert!(matches!(result, Err(Error::AuthenticationFailure)));
    }

    #[test]
    fn test_enroll_produces_fresh_material() {
        let vault = test_vault();

        let (kp1, pub1) = vault.enroll("pw").unwrap();
        let (kp2, pub2) = vault.enroll("pw").unwrap();

        assert_ne!(kp1.public_key(), kp2.public_key());
        assert_ne!(pub1.private_key_salt, pub2.private_key_salt);
        assert_eq!(pub1.public_key, kp1.public_key().to_base64().unwrap());

        let restored = vault.unwrap(&pub1.wrapped_private_key(), "pw").unwrap();
        assert_eq!(restored.public_key(), *kp1.public_key());
    }

    #[test]
    fn test_publication_wire_names() {
        let (_, publication) = test_vault().enroll("pw").unwrap();
        let json = serde_json::to_value(&publication).unwrap();

        assert!(json.get("public_key").is_some());
        assert!(json.get("encrypted_private_key").is_some());
        assert!(json.get("private_key_salt").is_some());
    }
}

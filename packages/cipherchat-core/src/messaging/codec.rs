//! Message codec: AES-256-GCM over base64 wire fields.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{self, Iv, SymmetricKey, IV_SIZE};
use crate::error::{Error, Result};

/// Ciphertext and IV as they travel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Base64 ciphertext with the 16-byte tag appended
    pub ciphertext: String,
    /// Base64 16-byte IV
    pub iv: String,
}

/// Encrypt under a fresh random IV
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<EncryptedPayload> {
    let (iv, ciphertext) = crypto::encrypt(key, plaintext)?;
    Ok(EncryptedPayload {
        ciphertext: BASE64.encode(ciphertext),
        iv: BASE64.encode(iv.as_bytes()),
    })
}

/// Decrypt base64 wire fields
///
/// Malformed base64, an IV that is not 16 bytes and a tag mismatch are all
/// `DecryptionFailure`.
pub fn decrypt(key: &SymmetricKey, ciphertext: &str, iv: &str) -> Result<Vec<u8>> {
    let iv_bytes = BASE64
        .decode(iv.trim())
        .map_err(|e| Error::DecryptionFailure(format!("invalid IV encoding: {}", e)))?;
    let iv = Iv::from_slice(&iv_bytes).ok_or_else(|| {
        Error::DecryptionFailure(format!("IV must be {} bytes, got {}", IV_SIZE, iv_bytes.len()))
    })?;

    let ciphertext = BASE64
        .decode(ciphertext.trim())
        .map_err(|e| Error::DecryptionFailure(format!("invalid ciphertext encoding: {}", e)))?;

    crypto::decrypt(key, &iv, &ciphertext)
}

//! # Cryptography Module
//!
//! All cryptographic primitives used by the messaging core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY HIERARCHY                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Account Password                                              │   │
//! │  │          │  PBKDF2-HMAC-SHA256 (100 000 rounds, 16-byte salt)  │   │
//! │  │          ▼                                                      │   │
//! │  │  ┌─────────────────────────────────────────────────────────┐   │   │
//! │  │  │              Wrapping Key (AES-256-GCM)                  │   │   │
//! │  │  └─────────────────────────────────────────────────────────┘   │   │
//! │  │          │  wraps                                               │   │
//! │  │          ▼                                                      │   │
//! │  │  ┌─────────────────────────────────────────────────────────┐   │   │
//! │  │  │         Account Private Key (P-256, PKCS#8)             │   │   │
//! │  │  └─────────────────────────────────────────────────────────┘   │   │
//! │  │          │  ECDH with each peer's public key                   │   │
//! │  │          ▼                                                      │   │
//! │  │  ┌─────────────────────────────────────────────────────────┐   │   │
//! │  │  │    Session Key (raw 32-byte shared x-coordinate)        │   │   │
//! │  │  └─────────────────────────────────────────────────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ENCRYPTION SCHEME                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  AES-256-GCM                                                   │   │
//! │  │  • 256-bit key                                                 │   │
//! │  │  • 128-bit IV (random per message)                             │   │
//! │  │  • 128-bit authentication tag                                  │   │
//! │  │  • No associated data                                          │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Wire Form |
//! |-----------|---------|-----------|
//! | ECDH P-256 | Key Exchange | SPKI DER, base64 |
//! | AES-256-GCM | Encryption | ciphertext‖tag, base64 |
//! | PBKDF2-HMAC-SHA256 | Key Wrapping | salt base64 |
//!
//! These are fixed by the deployed browser clients, which use WebCrypto.
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: Secret keys are zeroized when dropped
//! 2. **Secure Random**: `rand::rngs::OsRng` for IVs, salts and key generation
//! 3. **No IV Reuse**: Every encryption under a session key draws a fresh IV
//! 4. **No Forward Secrecy**: Session keys are static per pair of accounts

mod encryption;
mod kdf;
mod keys;

pub use encryption::{decrypt, encrypt, Iv, SymmetricKey, IV_SIZE, KEY_SIZE, TAG_SIZE};
pub(crate) use encryption::encrypt_with_iv;
pub use kdf::{derive_password_key, Salt, PBKDF2_ITERATIONS, SALT_SIZE};
pub use keys::{AccountKeyPair, AccountPrivateKey, AccountPublicKey};

//! # Identity Module
//!
//! Account key pair lifecycle: generation, password wrapping and unwrapping.
//!
//! ## Key Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY PAIR LIFECYCLE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Signup / Identity Recovery                                            │
//! │  ──────────────────────────                                             │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  1. Generate P-256 key pair (OS CSPRNG)                     │       │
//! │  │  2. Draw a fresh 16-byte salt                               │       │
//! │  │  3. PBKDF2-SHA256(password, salt, 100 000) → wrapping key   │       │
//! │  │  4. AES-256-GCM(wrapping key, PKCS#8 private key)           │       │
//! │  │  5. Publish { public_key, encrypted_private_key,            │       │
//! │  │               private_key_salt }                            │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Login                                                                 │
//! │  ─────                                                                  │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  1. Fetch the wrapped key and salt from the backend         │       │
//! │  │  2. Re-derive the wrapping key from the typed password      │       │
//! │  │  3. Unwrap; a tag mismatch means AuthenticationFailure      │       │
//! │  │  4. Keep the PKCS#8 bytes in the session's SecretCache      │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Password Reset                                                        │
//! │  ──────────────                                                         │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  A brand new key pair is enrolled. Messages encrypted under │       │
//! │  │  the old pair can no longer be decrypted.                   │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The public key never changes for the lifetime of an account; there is no
//! rotation.

mod vault;

pub use vault::{KeyPairVault, KeyPublication, WrappedPrivateKey};

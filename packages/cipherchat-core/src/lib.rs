//! # CipherChat Core
//!
//! End-to-end encrypted messaging core for a web chat backend: account key
//! pairs wrapped under the user's password, P-256 session keys, and
//! AES-256-GCM messages with per-member group fan-out.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CIPHERCHAT CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Identity   │  │   Session   │  │  Exchange   │  │  Messaging   │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Generate  │  │ - Secret    │  │ - ECDH      │  │ - Encrypt    │   │
//! │  │ - Wrap      │──►   cache     │──► - Group     │──► - Fan-out    │   │
//! │  │ - Unwrap    │  │ - Logout    │  │   keys      │  │ - History    │   │
//! │  └─────────────┘  └─────────────┘  └──────┬──────┘  └──────┬───────┘   │
//! │                                           │                │           │
//! │  ┌─────────────┐                   ┌──────┴──────┐  ┌──────┴───────┐   │
//! │  │   Crypto    │                   │  Directory  │  │  Transport   │   │
//! │  │             │                   │             │  │              │   │
//! │  │ - P-256     │                   │ - Public    │  │ - POST       │   │
//! │  │ - PBKDF2    │                   │   keys      │  │ - Push inbox │   │
//! │  │ - AES-GCM   │                   │ - Rosters   │  │ - Outbox     │   │
//! │  └─────────────┘                   └─────────────┘  └──────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Runtime configuration
//! - [`crypto`] - Cryptographic primitives (P-256, PBKDF2, AES-GCM)
//! - [`identity`] - Key pair generation and password wrapping
//! - [`session`] - The logged-in user's unwrapped key
//! - [`directory`] - Public key and group roster lookup
//! - [`exchange`] - Pairwise and group session keys
//! - [`messaging`] - Encrypted messages, files and history
//! - [`transport`] - Backend delivery and push feed
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Transport Security (HTTPS)                                   │
//! │  ───────────────────────────────────                                    │
//! │  Provided by the deployment, not by this crate.                        │
//! │                                                                         │
//! │  Layer 2: Message-Level E2E Encryption (P-256 ECDH + AES-256-GCM)      │
//! │  ─────────────────────────────────────────────────────────────          │
//! │  The backend stores and forwards ciphertext only. It cannot read       │
//! │  messages, but it does see who talks to whom and when.                 │
//! │                                                                         │
//! │  Layer 3: Key Custody (PBKDF2 + AES-256-GCM)                           │
//! │  ─────────────────────────────────────────────                          │
//! │  The private key is stored server-side only in wrapped form. The       │
//! │  password never leaves the client.                                     │
//! │                                                                         │
//! │  Not provided: forward secrecy, key rotation, sender signatures.       │
//! │  The directory is trusted to serve genuine public keys.                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cipherchat_core::{CoreConfig, MessagingService, SecretCache};
//! use cipherchat_core::transport::HttpBackend;
//!
//! let config = CoreConfig::default();
//! let backend = Arc::new(HttpBackend::new(&config)?.with_bearer_token(token));
//! let service = MessagingService::new(config, backend.clone(), backend);
//!
//! let session = service.login(Arc::new(SecretCache::new()), "alice", &wrapped, "password")?;
//! service.send_text(&session, "bob", "hello").await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod messaging;
pub mod session;
/// Platform-aware time utilities for native and WASM targets.
pub mod time;
pub mod transport;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::CoreConfig;
pub use crypto::{AccountKeyPair, AccountPrivateKey, AccountPublicKey, SymmetricKey};
pub use directory::PeerDirectory;
pub use error::{Error, Result, UserFacingError};
pub use exchange::{GroupKeys, KeyScope, SessionKey, SessionKeyDeriver};
pub use identity::{KeyPairVault, KeyPublication, WrappedPrivateKey};
pub use messaging::{
    DecryptedMessage, EncryptedMessage, FileAttachment, MessageBody, MessageContent, MessageEvent,
    MessageState, MessageTarget, MessagingService, SentMessage,
};
pub use session::{SecretCache, Session};
pub use transport::{PushEvent, TransportAdapter};

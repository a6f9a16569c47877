//! # Error Handling
//!
//! Error types for the messaging core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Session Errors                                                    │
//! │  │   ├── NotAuthenticated      - No unwrapped key for this user        │
//! │  │   └── AuthenticationFailure - Wrong password / corrupt wrapped key  │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── DecryptionFailure     - Tag mismatch, wrong key or IV         │
//! │  │   └── PlatformCryptoError   - Malformed key material, RNG failure   │
//! │  │                                                                      │
//! │  ├── Directory Errors                                                  │
//! │  │   ├── PeerKeyUnavailable    - Peer has no published public key      │
//! │  │   └── GroupNotFound         - Unknown group                         │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   ├── TransportError        - Network / HTTP failure                │
//! │  │   ├── Timeout               - Request timed out                     │
//! │  │   ├── DeliveryFailed        - Backend could not take it right now   │
//! │  │   └── DeliveryRejected      - Backend refused the request (4xx)     │
//! │  │                                                                      │
//! │  └── Message Errors                                                    │
//! │      ├── InvalidMessageContent - Size limits, bad UTF-8, empty roster  │
//! │      └── InvalidStateTransition - Message lifecycle violated           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! Every failure is caught where the user-facing action started. Decryption
//! failures become an inline `"[Failed to decrypt]"` placeholder; send and
//! unwrap failures become a blocking message via [`UserFacingError`]. None of
//! them should take down the surrounding conversation view.

use thiserror::Error;

/// Result type alias for messaging core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the messaging core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Session Errors (100-199)
    // ========================================================================

    /// No usable local secret for this user; the caller must force a re-login
    #[error("Not authenticated. Log in again to unlock your messages.")]
    NotAuthenticated,

    /// The password did not unwrap the stored private key
    ///
    /// Also returned for a corrupt wrapped blob so the two cases stay
    /// indistinguishable.
    #[error("Authentication failed. Check your password and try again.")]
    AuthenticationFailure,

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// A message could not be decrypted
    #[error("Message could not be decrypted: {0}")]
    DecryptionFailure(String),

    /// The underlying primitive rejected its input (bad key material, wrong
    /// curve, RNG unavailable)
    #[error("Cryptographic operation failed: {0}")]
    PlatformCryptoError(String),

    // ========================================================================
    // Directory Errors (300-399)
    // ========================================================================

    /// The peer does not exist or has no published public key
    #[error("No public key available for {0}")]
    PeerKeyUnavailable(String),

    /// The group does not exist
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    // ========================================================================
    // Transport Errors (400-499)
    // ========================================================================

    /// Network or HTTP level failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Request timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The backend could not take the message right now (5xx)
    #[error("Failed to deliver message: {0}")]
    DeliveryFailed(String),

    /// The backend refused the request itself; resending it cannot succeed
    #[error("Message rejected by the server: {0}")]
    DeliveryRejected(String),

    // ========================================================================
    // Message Errors (500-599)
    // ========================================================================

    /// Invalid message content
    #[error("Invalid message content: {0}")]
    InvalidMessageContent(String),

    /// A message tried to move to a state its lifecycle does not allow
    #[error("Invalid message state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// State the message was in
        from: &'static str,
        /// State that was requested
        to: &'static str,
    },

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Session
    /// - 200-299: Crypto
    /// - 300-399: Directory
    /// - 400-499: Transport
    /// - 500-599: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::NotAuthenticated => 100,
            Error::AuthenticationFailure => 101,

            Error::DecryptionFailure(_) => 200,
            Error::PlatformCryptoError(_) => 201,

            Error::PeerKeyUnavailable(_) => 300,
            Error::GroupNotFound(_) => 301,

            Error::TransportError(_) => 400,
            Error::Timeout(_) => 401,
            Error::DeliveryFailed(_) => 402,
            Error::DeliveryRejected(_) => 403,

            Error::InvalidMessageContent(_) => 500,
            Error::InvalidStateTransition { .. } => 501,

            Error::InvalidConfig(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can be resolved by the user retrying the action
    /// or logging in again. There is no automatic backoff.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated
                | Error::AuthenticationFailure
                | Error::TransportError(_)
                | Error::Timeout(_)
                | Error::DeliveryFailed(_)
        )
    }

    /// Check if this error requires user action (re-login or re-prompt)
    pub fn requires_user_action(&self) -> bool {
        matches!(self, Error::NotAuthenticated | Error::AuthenticationFailure)
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_decode() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::TransportError(err.to_string())
        }
    }
}

// ============================================================================
// USER-FACING ERROR REPRESENTATION
// ============================================================================

/// What the UI shows when a send or unlock action fails
///
/// Decryption failures are not reported through this type; they render
/// inline as a placeholder instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFacingError {
    /// Numeric error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether retrying (or logging in again) can help
    pub recoverable: bool,
    /// Whether the user must log in again or re-enter a password
    pub requires_user_action: bool,
}

impl From<Error> for UserFacingError {
    fn from(err: Error) -> Self {
        let message = match &err {
            // Internal detail stays out of the dialog
            Error::PlatformCryptoError(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        };
        Self {
            code: err.code(),
            message,
            recoverable: err.is_recoverable(),
            requires_user_action: err.requires_user_action(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

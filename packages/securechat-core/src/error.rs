//! # Error Handling
//!
//! Error types for SecureChat Core.
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
//! │  ├── Identity Errors                                                   │
//! │  │   ├── NoIdentity            - No identity is logged in              │
//! │  │   ├── PrivateKeyUnavailable - Private key not on this device        │
//! │  │   ├── IdentityExists        - Username already has local keys       │
//! │  │   └── InvalidParticipants   - Conversation member list unusable     │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── KeyFormat             - Malformed key serialization           │
//! │  │   ├── KeyExchange           - Wrap/unwrap mismatch                  │
//! │  │   ├── ParticipantKeyMissing - Directory has no key for a user       │
//! │  │   ├── Decryption            - Message authentication failed         │
//! │  │   ├── Encryption            - Cipher rejected the input             │
//! │  │   ├── KeyDerivationFailed   - HKDF expansion failed                 │
//! │  │   └── RngFailed             - Entropy source failed                 │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StorageReadError                                              │
//! │  │   ├── StorageWriteError                                             │
//! │  │   └── DatabaseError                                                 │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   └── Transport             - Collaborator call failed              │
//! │  │                                                                      │
//! │  ├── Message Errors                                                    │
//! │  │   ├── InvalidMessageContent                                         │
//! │  │   ├── InvalidStatusTransition                                       │
//! │  │   └── MessageNotFound                                               │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      └── SerializationError                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in the core retries on its own. [`Error::is_recoverable`] tells
//! the caller which failures are worth retrying later (for example once a
//! contact finishes registration and publishes a public key).

use thiserror::Error;

/// Result type alias for SecureChat Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SecureChat Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity Errors (200-299)
    // ========================================================================

    /// No identity is logged in
    #[error("No identity logged in. Register or log in first.")]
    NoIdentity,

    /// The private key for this identity is not stored on this device
    #[error("Private key for '{0}' is not available on this device.")]
    PrivateKeyUnavailable(String),

    /// Local key material already exists for this username
    #[error("An identity already exists for '{0}'.")]
    IdentityExists(String),

    /// The participant list for a conversation is unusable
    #[error("Invalid participant list: {0}")]
    InvalidParticipants(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Malformed key serialization
    #[error("Invalid key format: {0}")]
    KeyFormat(String),

    /// Session key wrap/unwrap failed
    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    /// The user directory has no public key for a participant
    #[error("No public key on file for participant {0}")]
    ParticipantKeyMissing(String),

    /// Authenticated decryption failed
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================

    /// A transport or directory call failed
    #[error("Transport error: {0}")]
    Transport(String),

    // ========================================================================
    // Message Errors (700-799)
    // ========================================================================

    /// Invalid message content
    #[error("Invalid message content: {0}")]
    InvalidMessageContent(String),

    /// Message status can only move forward
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Message not found
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 200-299: Identity
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Transport
    /// - 700-799: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Identity (200-299)
            Error::NoIdentity => 200,
            Error::PrivateKeyUnavailable(_) => 201,
            Error::IdentityExists(_) => 202,
            Error::InvalidParticipants(_) => 203,

            // Crypto (300-399)
            Error::KeyFormat(_) => 300,
            Error::KeyExchange(_) => 301,
            Error::ParticipantKeyMissing(_) => 302,
            Error::Decryption(_) => 303,
            Error::Encryption(_) => 304,
            Error::KeyDerivationFailed(_) => 305,
            Error::RngFailed => 306,

            // Storage (400-499)
            Error::StorageReadError(_) => 400,
            Error::StorageWriteError(_) => 401,
            Error::DatabaseError(_) => 402,

            // Transport (500-599)
            Error::Transport(_) => 500,

            // Messages (700-799)
            Error::InvalidMessageContent(_) => 700,
            Error::InvalidStatusTransition { .. } => 701,
            Error::MessageNotFound(_) => 702,

            // Internal (900-999)
            Error::SerializationError(_) => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can potentially be resolved by retrying later.
    /// The core never retries them itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ParticipantKeyMissing(_) | Error::Transport(_))
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::NoIdentity | Error::PrivateKeyUnavailable(_) | Error::IdentityExists(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NoIdentity.code(), 200);
        assert_eq!(Error::KeyFormat("test".into()).code(), 300);
        assert_eq!(Error::KeyExchange("test".into()).code(), 301);
        assert_eq!(Error::ParticipantKeyMissing("bob".into()).code(), 302);
        assert_eq!(Error::Decryption("test".into()).code(), 303);
        assert_eq!(Error::StorageReadError("test".into()).code(), 400);
        assert_eq!(Error::Transport("test".into()).code(), 500);
        assert_eq!(Error::InvalidMessageContent("test".into()).code(), 700);
        assert_eq!(Error::SerializationError("test".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::ParticipantKeyMissing("bob".into()).is_recoverable());
        assert!(Error::Transport("timeout".into()).is_recoverable());
        assert!(!Error::KeyExchange("wrong identity".into()).is_recoverable());
        assert!(!Error::Decryption("tag mismatch".into()).is_recoverable());
        assert!(!Error::KeyFormat("bad jwk".into()).is_recoverable());
    }

    #[test]
    fn test_user_action_errors() {
        assert!(Error::NoIdentity.requires_user_action());
        assert!(Error::PrivateKeyUnavailable("alice".into()).requires_user_action());
        assert!(!Error::RngFailed.requires_user_action());
    }

    #[test]
    fn test_status_transition_message() {
        let err = Error::InvalidStatusTransition {
            from: "read".into(),
            to: "sent".into(),
        };
        assert_eq!(err.to_string(), "Invalid status transition from read to sent");
    }
}

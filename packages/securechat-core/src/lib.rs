//! # SecureChat Core
//!
//! Client-side end-to-end encryption for a server-relayed chat service.
//! The server stores and relays ciphertext and wrapped keys; it never sees
//! message plaintext or any private key.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SECURECHAT CORE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SecureChatClient                            │   │
//! │  │  register · login · logout · send_text · load_messages         │   │
//! │  └───────────────┬───────────────────────────┬─────────────────────┘   │
//! │                  │                           │                          │
//! │                  ▼                           ▼                          │
//! │  ┌───────────────────────────┐   ┌───────────────────────────────┐    │
//! │  │       KeyExchange         │   │          Messaging            │    │
//! │  │  ensure / receive session │   │  MessageCipher, history       │    │
//! │  └──────┬─────────────┬──────┘   └───────────────────────────────┘    │
//! │         │             │                                                │
//! │         ▼             ▼                                                │
//! │  ┌─────────────┐ ┌─────────────────────────────────────────────┐      │
//! │  │  KeyStore   │ │               Transport                     │      │
//! │  │ (identity   │ │  UserDirectory · MessageTransport (traits)  │      │
//! │  │  scoped)    │ └─────────────────────────────────────────────┘      │
//! │  └──────┬──────┘                                                       │
//! │         ▼                                                              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   Storage: SecureStore over memory or SQLite                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   Crypto: X25519 identities · sealed-box key wrap · AES-GCM     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Cryptographic primitives (identity keys, session keys, encryption)
//! - [`keystore`] - Identity scoped private and session key storage
//! - [`storage`] - Local secure store (memory or SQLite)
//! - [`transport`] - Directory and message transport traits plus in-memory implementations
//! - [`exchange`] - Session key establishment
//! - [`messaging`] - Message types and history decryption
//! - [`client`] - The application-facing client
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          TRUST BOUNDARY                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Device (trusted)               │   Server (untrusted for content)    │
//! │   ─────────────────               │   ──────────────────────────────    │
//! │   identity private key            │   identity public keys (JWK)       │
//! │   unwrapped session keys          │   wrapped session keys             │
//! │   plaintext                       │   ciphertext + nonce               │
//! │                                   │   message status, timestamps       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Logging goes through `tracing`; the library never installs a
//! subscriber and never logs key material.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod client;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod keystore;
pub mod messaging;
pub mod storage;
/// Millisecond timestamp helpers.
pub mod time;
pub mod transport;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use client::{LoginOutcome, SecureChatClient};
pub use crypto::{CryptoProvider, OsCryptoProvider, SeededCryptoProvider, SessionKey};
pub use error::{Error, Result};
pub use messaging::{DecryptedMessage, MessageBody, MessageStatus};
pub use transport::{
    DirectoryEntry, EncryptedMessage, InMemoryDirectory, InMemoryTransport, MessageQuery,
    MessageTransport, UserDirectory, DEFAULT_PAGE_SIZE,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default prefix for local storage keys
pub const DEFAULT_STORAGE_NAMESPACE: &str = "securechat";

/// Configuration for opening a [`SecureChatClient`]
#[derive(Clone)]
pub struct CoreConfig {
    /// Prefix for every local storage key
    pub storage_namespace: String,
    /// SQLite database path (in-memory storage if None)
    pub database_path: Option<String>,
    /// At-rest encryption key for the local store (unencrypted if None)
    pub storage_key: Option<[u8; 32]>,
    /// Messages per page for [`SecureChatClient::load_recent`]
    pub history_page_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
            database_path: None,
            storage_key: None,
            history_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("storage_namespace", &self.storage_namespace)
            .field("database_path", &self.database_path)
            .field("storage_key", &self.storage_key.map(|_| "<redacted>"))
            .field("history_page_size", &self.history_page_size)
            .finish()
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of SecureChat Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

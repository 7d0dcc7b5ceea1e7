//! # Message Encryption
//!
//! AES-256-GCM authenticated encryption for message content.
//!
//! ## Encryption Process
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Input: "hello" + SessionKey (one per conversation)                    │
//! │                                                                         │
//! │  1. Generate Nonce                                                     │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  nonce = provider.random(12 bytes)                          │       │
//! │  │  (fresh for every call, never reused under one key)         │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  2. Encrypt                                                            │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(key, nonce, utf8("hello"))                    │       │
//! │  │  → ciphertext ‖ 16-byte tag                                │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  3. Transport encoding                                                 │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  content = base64(ciphertext ‖ tag)                        │       │
//! │  │  iv      = base64(nonce)                                   │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decryption fails closed: a wrong key, a flipped bit anywhere in the
//! ciphertext, tag or nonce, or a malformed encoding all produce
//! [`Error::Decryption`]. No partial plaintext is ever returned.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::provider::{random_array, CryptoProvider, SharedProvider};
use super::session::SessionKey;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Maximum plaintext size for a single message (64KB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A nonce (number used once) for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce with the same key!**
///
/// Random 96-bit nonces are safe for up to 2^32 messages per key
/// (birthday bound).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a random nonce
    pub fn random(provider: &dyn CryptoProvider) -> Result<Self> {
        Ok(Self(random_array(provider)?))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 12 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| {
            Error::Decryption(format!(
                "Nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped for security.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Encrypt bytes using AES-256-GCM
///
/// ## Returns
///
/// Tuple of (nonce, ciphertext_with_tag)
pub fn encrypt(
    key: &EncryptionKey,
    plaintext: &[u8],
    aad: &[u8],
    provider: &dyn CryptoProvider,
) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random(provider)?;
    let ciphertext = encrypt_with_nonce(key, &nonce, plaintext, aad)?;
    Ok((nonce, ciphertext))
}

/// Encrypt with a caller-chosen nonce
///
/// Only for callers that guarantee uniqueness themselves (the session key
/// wrap uses a fresh ephemeral key per call).
pub(crate) fn encrypt_with_nonce(
    key: &EncryptionKey,
    nonce: &Nonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::Encryption(format!("Invalid key: {}", e)))?;

    cipher
        .encrypt(AesNonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
        .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))
}

/// Decrypt bytes using AES-256-GCM
///
/// ## Errors
///
/// Returns [`Error::Decryption`] if:
/// - The ciphertext or tag was tampered with
/// - The AAD doesn't match
/// - The key is wrong
/// - The nonce is wrong
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Decryption("Ciphertext shorter than authentication tag".into()));
    }

    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::Decryption(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| Error::Decryption("Authentication tag mismatch".into()))
}

// ============================================================================
// MESSAGE CIPHER
// ============================================================================

/// Ciphertext and nonce of one encrypted message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Ciphertext with the 16-byte authentication tag appended
    pub ciphertext: Vec<u8>,
    /// Nonce used for this message
    pub nonce: Nonce,
}

impl EncryptedPayload {
    /// Encode as the `(content, iv)` base64 pair carried on the wire
    pub fn to_wire(&self) -> (String, String) {
        (
            BASE64.encode(&self.ciphertext),
            BASE64.encode(self.nonce.as_bytes()),
        )
    }

    /// Decode a payload from its base64 wire fields
    ///
    /// Anything that is not valid base64, or a nonce that is not 96 bits,
    /// is rejected as a decryption failure. Content that never went through
    /// [`MessageCipher::encrypt`] cannot be read as plaintext.
    pub fn from_wire(content: &str, iv: &str) -> Result<Self> {
        let ciphertext = BASE64
            .decode(content)
            .map_err(|e| Error::Decryption(format!("Content is not base64: {}", e)))?;
        let nonce_bytes = BASE64
            .decode(iv)
            .map_err(|e| Error::Decryption(format!("IV is not base64: {}", e)))?;
        Ok(Self {
            ciphertext,
            nonce: Nonce::from_slice(&nonce_bytes)?,
        })
    }
}

/// Encrypts and decrypts message text under a conversation session key
#[derive(Clone)]
pub struct MessageCipher {
    provider: SharedProvider,
}

impl MessageCipher {
    /// Create a cipher drawing nonces from `provider`
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }

    /// Encrypt a plaintext message
    ///
    /// A fresh random nonce is generated for every call.
    pub fn encrypt(&self, plaintext: &str, key: &SessionKey) -> Result<EncryptedPayload> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidMessageContent(format!(
                "Message too large: {} bytes (max {})",
                plaintext.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let (nonce, ciphertext) =
            encrypt(key.encryption_key(), plaintext.as_bytes(), &[], self.provider.as_ref())?;
        Ok(EncryptedPayload { ciphertext, nonce })
    }

    /// Decrypt a message payload
    pub fn decrypt(&self, payload: &EncryptedPayload, key: &SessionKey) -> Result<String> {
        let plaintext = decrypt(key.encryption_key(), &payload.nonce, &payload.ciphertext, &[])?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| Error::Decryption("Plaintext is not valid UTF-8".into()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

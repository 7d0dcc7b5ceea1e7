//! # Session Keys
//!
//! One symmetric key per conversation, distributed to each participant
//! wrapped under that participant's identity key.
//!
//! ## Sealed-box Wrapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SESSION KEY WRAP                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (anyone holding the session key)                               │
//! │  ────────────────────────────────────────                               │
//! │  eph_secret = provider.random(32)                                      │
//! │  shared     = X25519(eph_secret, recipient_pub)                        │
//! │  wrap_key   = HKDF(shared, eph_pub ‖ recipient_pub)                    │
//! │  ct         = AES-256-GCM(wrap_key, nonce, session_key ‖ created_at,   │
//! │                           aad = version ‖ eph_pub ‖ recipient_pub ‖    │
//! │                                 conversation_id)                       │
//! │                                                                         │
//! │  Blob (101 bytes, base64 on the wire)                                  │
//! │  ┌────────┬──────────────┬───────────┬────────────────────────┐        │
//! │  │ ver(1) │ eph_pub (32) │ nonce(12) │ ciphertext + tag (56)  │        │
//! │  └────────┴──────────────┴───────────┴────────────────────────┘        │
//! │                                                                         │
//! │  Recipient                                                             │
//! │  ─────────                                                              │
//! │  shared = X25519(recipient_secret, eph_pub)  → same wrap_key           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ephemeral secret is discarded after wrapping, so only the holder of
//! the recipient's private key can recover the session key. The creation
//! time (big-endian Unix millis) is sealed with the key, so every
//! participant records the same `created_at`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use x25519_dalek::PublicKey as X25519PublicKey;
use zeroize::Zeroizing;

use super::encryption::{self, EncryptionKey, Nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use super::kdf::derive_wrap_key;
use super::keys::{PrivateIdentityKey, PublicIdentityKey, IDENTITY_KEY_SIZE};
use super::provider::{random_array, CryptoProvider};
use crate::error::{Error, Result};
use crate::time::now_millis;

/// Current wrapped key format version
pub const WRAP_VERSION: u8 = 1;

/// Size of the sealed creation timestamp
const CREATED_AT_SIZE: usize = 8;

/// Total size of a wrapped key blob in bytes
pub const WRAPPED_KEY_SIZE: usize =
    1 + IDENTITY_KEY_SIZE + NONCE_SIZE + KEY_SIZE + CREATED_AT_SIZE + TAG_SIZE;

/// The symmetric key of one conversation
#[derive(Clone)]
pub struct SessionKey {
    conversation_id: String,
    key: EncryptionKey,
    created_at: i64,
}

impl SessionKey {
    /// Rebuild a session key from persisted bytes
    pub fn from_bytes(conversation_id: impl Into<String>, bytes: [u8; KEY_SIZE], created_at: i64) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            key: EncryptionKey::from_bytes(bytes),
            created_at,
        }
    }

    /// Conversation this key belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Creation timestamp (Unix milliseconds)
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Copy of the raw key bytes
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(*self.key.as_bytes())
    }

    pub(crate) fn encryption_key(&self) -> &EncryptionKey {
        &self.key
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("conversation_id", &self.conversation_id)
            .field("created_at", &self.created_at)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh 256-bit session key for a conversation
pub fn generate_session_key(
    conversation_id: impl Into<String>,
    provider: &dyn CryptoProvider,
) -> Result<SessionKey> {
    let bytes = Zeroizing::new(random_array::<KEY_SIZE>(provider)?);
    Ok(SessionKey::from_bytes(conversation_id, *bytes, now_millis()))
}

/// A session key wrapped to one recipient
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKeyBlob {
    conversation_id: String,
    bytes: Vec<u8>,
}

impl WrappedKeyBlob {
    /// Conversation the wrapped key belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Raw blob bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Standard base64 of the blob, as stored in a wrapped-key record
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Parse a base64 blob received from the transport
    ///
    /// Only the encoding is checked here; structure and authenticity are
    /// verified by [`unwrap_session_key`].
    pub fn from_base64(conversation_id: impl Into<String>, encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::KeyExchange(format!("Wrapped key is not base64: {}", e)))?;
        Ok(Self {
            conversation_id: conversation_id.into(),
            bytes,
        })
    }
}

impl std::fmt::Debug for WrappedKeyBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKeyBlob")
            .field("conversation_id", &self.conversation_id)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn wrap_aad(ephemeral_public: &[u8; 32], recipient_public: &[u8; 32], conversation_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + 64 + conversation_id.len());
    aad.push(WRAP_VERSION);
    aad.extend_from_slice(ephemeral_public);
    aad.extend_from_slice(recipient_public);
    aad.extend_from_slice(conversation_id.as_bytes());
    aad
}

/// Wrap a session key so only `recipient` can unwrap it
pub fn wrap_session_key(
    key: &SessionKey,
    recipient: &PublicIdentityKey,
    provider: &dyn CryptoProvider,
) -> Result<WrappedKeyBlob> {
    let ephemeral_bytes = Zeroizing::new(random_array::<IDENTITY_KEY_SIZE>(provider)?);
    let ephemeral = PrivateIdentityKey::from_bytes(&ephemeral_bytes);
    let ephemeral_public = ephemeral.public_key().to_bytes();
    let recipient_public = recipient.to_bytes();

    let shared = ephemeral.diffie_hellman(recipient.as_x25519())?;
    let wrap_key = derive_wrap_key(&shared, &ephemeral_public, &recipient_public)?;
    let wrap_key = EncryptionKey::from_bytes(*wrap_key);

    let nonce = Nonce::random(provider)?;
    let aad = wrap_aad(&ephemeral_public, &recipient_public, &key.conversation_id);
    let mut sealed = Zeroizing::new([0u8; KEY_SIZE + CREATED_AT_SIZE]);
    sealed[..KEY_SIZE].copy_from_slice(key.key.as_bytes());
    sealed[KEY_SIZE..].copy_from_slice(&key.created_at.to_be_bytes());
    let ciphertext = encryption::encrypt_with_nonce(&wrap_key, &nonce, sealed.as_slice(), &aad)
        .map_err(|e| Error::KeyExchange(format!("Failed to wrap session key: {}", e)))?;

    let mut bytes = Vec::with_capacity(WRAPPED_KEY_SIZE);
    bytes.push(WRAP_VERSION);
    bytes.extend_from_slice(&ephemeral_public);
    bytes.extend_from_slice(nonce.as_bytes());
    bytes.extend_from_slice(&ciphertext);

    Ok(WrappedKeyBlob {
        conversation_id: key.conversation_id.clone(),
        bytes,
    })
}

/// Recover a session key with the recipient's private key
///
/// Any structural or authentication failure is reported as
/// [`Error::KeyExchange`]; a wrong key never yields garbage key bytes.
pub fn unwrap_session_key(blob: &WrappedKeyBlob, own_key: &PrivateIdentityKey) -> Result<SessionKey> {
    let bytes = blob.as_bytes();
    if bytes.len() != WRAPPED_KEY_SIZE {
        return Err(Error::KeyExchange(format!(
            "Wrapped key must be {} bytes, got {}",
            WRAPPED_KEY_SIZE,
            bytes.len()
        )));
    }
    if bytes[0] != WRAP_VERSION {
        return Err(Error::KeyExchange(format!(
            "Unsupported wrapped key version {}",
            bytes[0]
        )));
    }

    let (ephemeral_part, rest) = bytes[1..].split_at(IDENTITY_KEY_SIZE);
    let (nonce_part, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut ephemeral_public = [0u8; IDENTITY_KEY_SIZE];
    ephemeral_public.copy_from_slice(ephemeral_part);
    let nonce = Nonce::from_slice(nonce_part)
        .map_err(|_| Error::KeyExchange("Malformed wrap nonce".into()))?;
    let recipient_public = own_key.public_key().to_bytes();

    let shared = own_key.diffie_hellman(&X25519PublicKey::from(ephemeral_public))?;
    let wrap_key = derive_wrap_key(&shared, &ephemeral_public, &recipient_public)?;
    let wrap_key = EncryptionKey::from_bytes(*wrap_key);

    let aad = wrap_aad(&ephemeral_public, &recipient_public, &blob.conversation_id);
    let plaintext = encryption::decrypt(&wrap_key, &nonce, ciphertext, &aad).map_err(|_| {
        Error::KeyExchange("Wrapped key does not open with this identity".into())
    })?;

    if plaintext.len() != KEY_SIZE + CREATED_AT_SIZE {
        return Err(Error::KeyExchange("Unwrapped key has wrong length".into()));
    }
    let (key_part, created_part) = plaintext.split_at(KEY_SIZE);

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(key_part);
    let mut created_at = [0u8; CREATED_AT_SIZE];
    created_at.copy_from_slice(created_part);

    Ok(SessionKey::from_bytes(
        blob.conversation_id.clone(),
        key_bytes,
        i64::from_be_bytes(created_at),
    ))
}

// ============================================================================
// TESTS
// ============================================================================

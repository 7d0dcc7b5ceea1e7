//! # Key Derivation
//!
//! HKDF-SHA256 derivations with domain separation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY DERIVATION                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Session key wrapping                                                  │
//! │  ─────────────────────                                                  │
//! │  X25519(ephemeral, recipient)                                          │
//! │        │                                                                │
//! │        └──► HKDF(salt = eph_pub ‖ recipient_pub,                        │
//! │                  info = "securechat-session-key-wrap-v1") ──► wrap key │
//! │                                                                         │
//! │  Local storage                                                         │
//! │  ─────────────                                                          │
//! │  passphrase                                                            │
//! │        │                                                                │
//! │        └──► HKDF(salt, info = "securechat-storage-key-v1") ──► at-rest │
//! │                                                                 key     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Domain separation strings for HKDF
///
/// Keys derived for different purposes stay independent even when the
/// input key material is reused.
pub mod domain {
    /// Wrapping a session key to a recipient identity
    pub const SESSION_KEY_WRAP: &[u8] = b"securechat-session-key-wrap-v1";

    /// At-rest encryption of the local secure store
    pub const STORAGE_KEY: &[u8] = b"securechat-storage-key-v1";
}

/// Derive the AES-256-GCM key that wraps a session key for one recipient
///
/// Both public keys go into the salt so a wrap key is bound to the exact
/// (ephemeral, recipient) pair.
pub fn derive_wrap_key(
    dh_output: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), dh_output);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(domain::SESSION_KEY_WRAP, key.as_mut_slice())
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive wrap key".into()))?;

    Ok(key)
}

/// Derive a storage encryption key from a passphrase and salt
///
/// HKDF is not a password hash; the passphrase is expected to be a
/// high-entropy secret (for example one held in the OS keychain).
pub fn derive_storage_key(passphrase: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), passphrase);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(domain::STORAGE_KEY, key.as_mut_slice())
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive storage key".into()))?;
    Ok(key)
}

//! # Cryptography Module
//!
//! This module provides all cryptographic primitives used by SecureChat Core.
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
//! │  │  Identity Key (X25519, one per user)                           │   │
//! │  │  • public half published to the user directory as a JWK       │   │
//! │  │  • private half kept in the local key store only              │   │
//! │  │                          │                                      │   │
//! │  │                          │ wraps                                │   │
//! │  │                          ▼                                      │   │
//! │  │  Session Key (AES-256, one per conversation)                   │   │
//! │  │  • generated once by the first sender                         │   │
//! │  │  • stored on the server once per participant, wrapped         │   │
//! │  │                          │                                      │   │
//! │  │                          │ encrypts                             │   │
//! │  │                          ▼                                      │   │
//! │  │  Message content (AES-256-GCM, random 96-bit nonce)            │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 WRAPPING SCHEME                                 │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  1. Ephemeral X25519 keypair per wrap                          │   │
//! │  │  2. ECDH with the recipient identity key                       │   │
//! │  │  3. HKDF-SHA256 → one-time wrap key                            │   │
//! │  │  4. AES-256-GCM over the session key bytes                     │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Confidentiality | AES-256-GCM encryption |
//! | Integrity | GCM authentication tag |
//! | Recipient binding | ECDH with the recipient identity key |
//! | Key isolation | HKDF domain separation |
//!
//! ## Key Zeroization
//!
//! Private keys, session keys and derived wrap keys are zeroized when
//! dropped via the `zeroize` crate.

mod encryption;
mod kdf;
mod keys;
mod provider;
mod session;

pub use encryption::{
    decrypt, encrypt, EncryptedPayload, EncryptionKey, MessageCipher, Nonce, KEY_SIZE,
    MAX_MESSAGE_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{derive_storage_key, derive_wrap_key};
pub use keys::{
    export_private_key, export_public_key, generate_identity_keypair, import_private_key,
    import_public_key, IdentityKeyPair, Jwk, PrivateIdentityKey, PublicIdentityKey,
    IDENTITY_KEY_SIZE, JWK_CURVE, JWK_KEY_TYPE,
};
pub use provider::{random_array, CryptoProvider, OsCryptoProvider, SeededCryptoProvider, SharedProvider};
pub use session::{
    generate_session_key, unwrap_session_key, wrap_session_key, SessionKey, WrappedKeyBlob,
    WRAPPED_KEY_SIZE, WRAP_VERSION,
};

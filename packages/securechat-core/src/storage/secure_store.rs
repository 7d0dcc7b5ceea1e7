//! # Secure Storage
//!
//! Local storage for key material: identity private keys and unwrapped
//! session keys.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SecureStore                                                    │   │
//! │  │  ───────────                                                     │   │
//! │  │                                                                 │   │
//! │  │  • store(key, value)        - Store (encrypted) data           │   │
//! │  │  • retrieve(key)            - Retrieve and decrypt data        │   │
//! │  │  • delete(key)              - Delete data                      │   │
//! │  │  • exists(key)              - Check if key exists              │   │
//! │  │  • keys_with_prefix(prefix) - Enumerate one namespace          │   │
//! │  │                                                                 │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │ StorageBackend                        │
//! │                 ┌───────────────┴───────────────┐                       │
//! │                 ▼                               ▼                       │
//! │       ┌───────────────────┐           ┌───────────────────┐            │
//! │       │   MemoryBackend   │           │     Database      │            │
//! │       │  (process local)  │           │  (SQLite, file or │            │
//! │       │                   │           │   in-memory)      │            │
//! │       └───────────────────┘           └───────────────────┘            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## At-rest Encryption
//!
//! With a storage key every value is sealed as `nonce(12) ‖ ciphertext+tag`
//! using AES-256-GCM, with the item key as associated data. A value copied
//! under a different item key fails to decrypt.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::crypto::{decrypt, encrypt, EncryptionKey, Nonce, OsCryptoProvider, SharedProvider, NONCE_SIZE};
use crate::error::{Error, Result};

/// Raw byte storage underneath a [`SecureStore`]
pub trait StorageBackend: Send + Sync {
    /// Insert or replace a value
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch a value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a value, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;

    /// Sorted list of keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local backend
#[derive(Default)]
pub struct MemoryBackend {
    items: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.items.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.items.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let items = self.items.read();
        Ok(items
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Secure storage front end
pub struct SecureStore {
    backend: Arc<dyn StorageBackend>,

    /// Optional encryption key for at-rest protection
    encryption_key: Option<EncryptionKey>,

    provider: SharedProvider,
}

impl SecureStore {
    /// Create an unencrypted in-memory store
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Create an unencrypted store over any backend
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            encryption_key: None,
            provider: OsCryptoProvider::shared(),
        }
    }

    /// Enable at-rest encryption
    ///
    /// All data will be encrypted before it reaches the backend. Nonces are
    /// drawn from `provider`.
    pub fn with_encryption(mut self, key: [u8; 32], provider: SharedProvider) -> Self {
        self.encryption_key = Some(EncryptionKey::from_bytes(key));
        self.provider = provider;
        self
    }

    /// Whether values are encrypted at rest
    pub fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// Store data
    ///
    /// The data will be encrypted if an encryption key was provided.
    pub fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let data = if let Some(ref enc_key) = self.encryption_key {
            let (nonce, ciphertext) = encrypt(enc_key, value, key.as_bytes(), self.provider.as_ref())
                .map_err(|e| Error::StorageWriteError(format!("Failed to seal item: {}", e)))?;
            let mut result = nonce.as_bytes().to_vec();
            result.extend_from_slice(&ciphertext);
            result
        } else {
            value.to_vec()
        };

        self.backend.put(key, &data)
    }

    /// Retrieve data
    ///
    /// The data will be decrypted if an encryption key was provided.
    pub fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let data = match self.backend.get(key)? {
            Some(d) => Zeroizing::new(d),
            None => return Ok(None),
        };

        let Some(ref enc_key) = self.encryption_key else {
            return Ok(Some(data));
        };

        if data.len() < NONCE_SIZE {
            return Err(Error::StorageReadError("Stored data too short".into()));
        }

        let nonce = Nonce::from_slice(&data[..NONCE_SIZE])?;
        let plaintext = decrypt(enc_key, &nonce, &data[NONCE_SIZE..], key.as_bytes())
            .map_err(|_| Error::StorageReadError(format!("Stored item '{}' failed authentication", key)))?;

        Ok(Some(plaintext))
    }

    /// Delete data
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.backend.remove(key)
    }

    /// Check if a key exists
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.backend.get(key)?.is_some())
    }

    /// Sorted list of stored keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.backend.keys_with_prefix(prefix)
    }
}

impl Default for SecureStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

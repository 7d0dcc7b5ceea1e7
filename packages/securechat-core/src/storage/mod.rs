//! # Storage Module
//!
//! Local persistence for key material.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  KeyStore                                                       │   │
//! │  │  Identity scoped view: private keys + session keys             │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SecureStore                                                    │   │
//! │  │  Optional AES-256-GCM at rest, item key as AAD                 │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  MemoryBackend  |  Database (SQLite secure_items table)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Message content is never stored locally; the server holds ciphertext
//! and history is decrypted on demand.

mod database;
mod schema;
mod secure_store;

pub use database::Database;
pub use secure_store::{MemoryBackend, SecureStore, StorageBackend};

use std::sync::Arc;

use crate::crypto::SharedProvider;
use crate::error::Result;

/// Open the secure store described by a database path and storage key
///
/// Without a path the store lives in process memory. Without a storage
/// key values are written unencrypted.
pub async fn open_secure_store(
    database_path: Option<&str>,
    storage_key: Option<[u8; 32]>,
    provider: SharedProvider,
) -> Result<SecureStore> {
    let store = match database_path {
        Some(path) => {
            let db = Database::open(Some(path)).await?;
            tracing::info!("Secure store backed by database at {}", path);
            SecureStore::with_backend(Arc::new(db))
        }
        None => {
            tracing::debug!("Secure store backed by memory");
            SecureStore::new()
        }
    };

    Ok(match storage_key {
        Some(key) => store.with_encryption(key, provider),
        None => store,
    })
}

//! # Database
//!
//! SQLite persistence for the secure store.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │   SecureStore   │  Encrypts values before they reach SQLite         │
//! │  └────────┬────────┘                                                   │
//! │           │ StorageBackend                                              │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  Item API                                         │
//! │  │   (this file)   │  - put / get / delete                             │
//! │  │                 │  - prefix listing                                 │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  Storage                                          │
//! │  │   (file or      │  - In-memory for tests                            │
//! │  │    memory)      │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::schema;
use super::secure_store::StorageBackend;
use crate::error::{Error, Result};

/// The database handle
///
/// Wraps a single SQLite connection behind a mutex; rusqlite connections
/// are not `Sync`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // SECURE ITEM OPERATIONS
    // ========================================================================

    /// Insert or replace an item
    pub fn put_item(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO secure_items (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, crate::time::now_millis()],
        )
        .map_err(|e| Error::StorageWriteError(format!("Failed to write item: {}", e)))?;
        Ok(())
    }

    /// Get an item's value
    pub fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM secure_items WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::StorageReadError(format!("Failed to read item: {}", e)))
    }

    /// Delete an item, returning whether it existed
    pub fn delete_item(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM secure_items WHERE key = ?1", params![key])
            .map_err(|e| Error::StorageWriteError(format!("Failed to delete item: {}", e)))?;
        Ok(rows > 0)
    }

    /// List item keys starting with `prefix`, sorted
    pub fn item_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        // substr comparison instead of LIKE so '%' and '_' in keys match literally
        let mut stmt = conn.prepare(
            "SELECT key FROM secure_items WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Number of stored items
    pub fn item_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM secure_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl StorageBackend for Database {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.put_item(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_item(key)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        self.delete_item(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.item_keys_with_prefix(prefix)
    }
}

// ============================================================================
// TESTS
// ============================================================================

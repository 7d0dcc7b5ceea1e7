//! # Database Schema
//!
//! SQL schema definitions for the local key database.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌──────────────────────────────────────┐       │
//! │  │ schema_version  │    │            secure_items              │       │
//! │  ├─────────────────┤    ├──────────────────────────────────────┤       │
//! │  │ version         │    │ key         <ns>_private_<user>      │       │
//! │  └─────────────────┘    │             <ns>_session_<user>_<c>  │       │
//! │                         │ value       opaque bytes (optionally │       │
//! │                         │             AES-GCM sealed)          │       │
//! │                         │ updated_at  unix millis              │       │
//! │                         └──────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Secure items
-- Key material owned by the secure store. Values are opaque to SQLite;
-- when the store has an at-rest key they are nonce || ciphertext.
CREATE TABLE IF NOT EXISTS secure_items (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// SQL to drop all tables (for testing/reset)
#[cfg(test)]
pub const DROP_TABLES: &str = r#"
DROP TABLE IF EXISTS secure_items;
DROP TABLE IF EXISTS schema_version;
"#;

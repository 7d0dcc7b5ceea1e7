//! # Key Store
//!
//! Identity-scoped access to locally held key material.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY STORE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  activate("alice") ──► ScopeToken { username: "alice", epoch: 7 }      │
//! │                                                                         │
//! │  ┌───────────────────────────────┐    ┌──────────────────────────────┐ │
//! │  │  In-memory cache (epoch 7)    │    │  SecureStore                 │ │
//! │  │  conversation → SessionKey    │───►│  <ns>_private_<username>     │ │
//! │  │                               │    │  <ns>_session_<hex(user)>_<c>│ │
//! │  └───────────────────────────────┘    └──────────────────────────────┘ │
//! │                                                                         │
//! │  deactivate() / activate("bob")  ──► epoch 8, cache cleared           │
//! │                                                                         │
//! │  cache_session_key_scoped(token@7, key) after the switch               │
//! │        └──► discarded, nothing written                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usernames are case-insensitive: every storage key uses the lowercase
//! form.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::crypto::{export_private_key, import_private_key, Jwk, PrivateIdentityKey, SessionKey, KEY_SIZE};
use crate::error::{Error, Result};
use crate::storage::SecureStore;

/// Proof that an identity scope was current when an operation started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeToken {
    username: String,
    epoch: u64,
}

impl ScopeToken {
    /// Lowercase username of the scope
    pub fn username(&self) -> &str {
        &self.username
    }
}

struct ActiveIdentity {
    username: String,
    sessions: HashMap<String, Arc<SessionKey>>,
}

#[derive(Default)]
struct ScopeState {
    epoch: u64,
    active: Option<ActiveIdentity>,
}

impl ScopeState {
    fn is_current(&self, token: &ScopeToken) -> bool {
        self.epoch == token.epoch
            && self.active.as_ref().map(|a| a.username.as_str()) == Some(token.username.as_str())
    }
}

/// Persisted form of an unwrapped session key
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSessionKey {
    key: String,
    created_at: i64,
}

/// Local store of identity private keys and conversation session keys
pub struct KeyStore {
    namespace: String,
    store: Arc<SecureStore>,
    scope: RwLock<ScopeState>,
}

impl KeyStore {
    /// Create a key store over `store`, prefixing every item with `namespace`
    pub fn new(namespace: impl Into<String>, store: Arc<SecureStore>) -> Self {
        Self {
            namespace: namespace.into(),
            store,
            scope: RwLock::new(ScopeState::default()),
        }
    }

    fn private_key_name(&self, username: &str) -> String {
        format!("{}_private_{}", self.namespace, username.to_lowercase())
    }

    fn session_prefix(&self, username: &str) -> String {
        // hex keeps the username segment free of '_' so prefixes never overlap
        format!(
            "{}_session_{}_",
            self.namespace,
            hex::encode(username.to_lowercase())
        )
    }

    fn session_key_name(&self, username: &str, conversation_id: &str) -> String {
        format!("{}{}", self.session_prefix(username), conversation_id)
    }

    // ========================================================================
    // PRIVATE KEYS
    // ========================================================================

    /// Persist an identity private key as JWK JSON
    pub fn put_private_key(&self, username: &str, key: &PrivateIdentityKey) -> Result<()> {
        let json = Zeroizing::new(export_private_key(key).to_json()?);
        self.store.store(&self.private_key_name(username), json.as_bytes())?;
        tracing::debug!("Stored private key for {}", username.to_lowercase());
        Ok(())
    }

    /// Load an identity private key
    pub fn get_private_key(&self, username: &str) -> Result<Option<PrivateIdentityKey>> {
        let Some(bytes) = self.store.retrieve(&self.private_key_name(username))? else {
            return Ok(None);
        };
        let json = std::str::from_utf8(&bytes)
            .map_err(|_| Error::StorageReadError("Stored private key is not UTF-8".into()))?;
        let jwk = Jwk::from_json(json)?;
        Ok(Some(import_private_key(&jwk)?))
    }

    /// Whether a private key is stored for `username`
    pub fn has_private_key(&self, username: &str) -> Result<bool> {
        self.store.exists(&self.private_key_name(username))
    }

    /// Remove an identity's private key and every session key persisted for it
    ///
    /// If the identity is active its scope is closed as well.
    pub fn delete_identity(&self, username: &str) -> Result<()> {
        let lower = username.to_lowercase();
        {
            let mut scope = self.scope.write();
            if scope.active.as_ref().map(|a| a.username.as_str()) == Some(lower.as_str()) {
                scope.epoch += 1;
                scope.active = None;
            }
        }

        self.store.delete(&self.private_key_name(&lower))?;
        let sessions = self.store.keys_with_prefix(&self.session_prefix(&lower))?;
        for name in &sessions {
            self.store.delete(name)?;
        }

        tracing::info!("Deleted identity {} ({} session keys)", lower, sessions.len());
        Ok(())
    }

    // ========================================================================
    // IDENTITY SCOPE
    // ========================================================================

    /// Make `username` the active identity
    ///
    /// Any previous scope ends: its cache is dropped and its tokens go stale.
    pub fn activate(&self, username: &str) -> ScopeToken {
        let lower = username.to_lowercase();
        let mut scope = self.scope.write();
        scope.epoch += 1;
        scope.active = Some(ActiveIdentity {
            username: lower.clone(),
            sessions: HashMap::new(),
        });
        tracing::debug!("Key store scope {} active for {}", scope.epoch, lower);
        ScopeToken {
            username: lower,
            epoch: scope.epoch,
        }
    }

    /// End the active scope
    pub fn deactivate(&self) {
        let mut scope = self.scope.write();
        scope.epoch += 1;
        scope.active = None;
    }

    /// Token for the active scope
    pub fn current_scope(&self) -> Result<ScopeToken> {
        let scope = self.scope.read();
        let active = scope.active.as_ref().ok_or(Error::NoIdentity)?;
        Ok(ScopeToken {
            username: active.username.clone(),
            epoch: scope.epoch,
        })
    }

    /// Whether `token` still names the active scope
    pub fn is_current(&self, token: &ScopeToken) -> bool {
        self.scope.read().is_current(token)
    }

    // ========================================================================
    // SESSION KEYS
    // ========================================================================

    /// Cache a session key for the active identity
    pub fn cache_session_key(&self, key: SessionKey) -> Result<Arc<SessionKey>> {
        let token = self.current_scope()?;
        self.cache_session_key_scoped(&token, key)?
            .ok_or(Error::NoIdentity)
    }

    /// Cache a session key only if `token` is still current
    ///
    /// Returns `None` when the scope has ended; nothing is written then.
    /// The epoch check and the write happen under one lock.
    pub fn cache_session_key_scoped(
        &self,
        token: &ScopeToken,
        key: SessionKey,
    ) -> Result<Option<Arc<SessionKey>>> {
        let mut scope = self.scope.write();
        if !scope.is_current(token) {
            tracing::debug!(
                "Discarding session key for {}: scope ended",
                key.conversation_id()
            );
            return Ok(None);
        }

        let stored = StoredSessionKey {
            key: BASE64.encode(key.secret_bytes().as_slice()),
            created_at: key.created_at(),
        };
        let json = Zeroizing::new(serde_json::to_vec(&stored)?);
        drop(Zeroizing::new(stored.key));
        self.store.store(
            &self.session_key_name(&token.username, key.conversation_id()),
            &json,
        )?;

        let key = Arc::new(key);
        if let Some(active) = scope.active.as_mut() {
            active
                .sessions
                .insert(key.conversation_id().to_string(), key.clone());
        }
        Ok(Some(key))
    }

    /// Session key of the active identity for a conversation
    ///
    /// Checks the in-memory cache first, then the persisted copy.
    pub fn get_session_key(&self, conversation_id: &str) -> Result<Option<Arc<SessionKey>>> {
        let token = self.current_scope()?;
        self.get_session_key_scoped(&token, conversation_id)
    }

    /// Session key for a conversation, only while `token` is still current
    ///
    /// Fails with [`Error::NoIdentity`] once the scope has ended, so an
    /// operation started by one identity never sees another's keys.
    pub fn get_session_key_scoped(
        &self,
        token: &ScopeToken,
        conversation_id: &str,
    ) -> Result<Option<Arc<SessionKey>>> {
        {
            let scope = self.scope.read();
            if !scope.is_current(token) {
                return Err(Error::NoIdentity);
            }
            if let Some(key) = scope
                .active
                .as_ref()
                .and_then(|active| active.sessions.get(conversation_id))
            {
                return Ok(Some(key.clone()));
            }
        }

        let Some(bytes) = self
            .store
            .retrieve(&self.session_key_name(&token.username, conversation_id))?
        else {
            return Ok(None);
        };

        let stored: StoredSessionKey = serde_json::from_slice(&bytes)?;
        let raw = Zeroizing::new(
            BASE64
                .decode(&stored.key)
                .map_err(|e| Error::StorageReadError(format!("Corrupt session key: {}", e)))?,
        );
        let raw: [u8; KEY_SIZE] = raw
            .as_slice()
            .try_into()
            .map_err(|_| Error::StorageReadError("Corrupt session key length".into()))?;
        let key = Arc::new(SessionKey::from_bytes(conversation_id, raw, stored.created_at));

        let mut scope = self.scope.write();
        if !scope.is_current(token) {
            return Err(Error::NoIdentity);
        }
        if let Some(active) = scope.active.as_mut() {
            // A concurrent writer may have cached first; last write wins
            let entry = active
                .sessions
                .entry(conversation_id.to_string())
                .or_insert_with(|| key.clone());
            return Ok(Some(entry.clone()));
        }
        Ok(Some(key))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_identity_keypair, generate_session_key, OsCryptoProvider};
    use crate::storage::Database;

    fn keystore() -> KeyStore {
        KeyStore::new("securechat", Arc::new(SecureStore::new()))
    }

    #[test]
    fn test_private_key_round_trip() {
        let ks = keystore();
        let kp = generate_identity_keypair(&OsCryptoProvider).unwrap();

        ks.put_private_key("Alice", &kp.private).unwrap();

        // Case-insensitive lookup
        let loaded = ks.get_private_key("alice").unwrap().unwrap();
        assert_eq!(loaded.public_key(), kp.public);
        assert!(ks.has_private_key("ALICE").unwrap());
        assert!(ks.get_private_key("bob").unwrap().is_none());
    }

    #[test]
    fn test_private_key_stored_as_jwk() {
        let store = Arc::new(SecureStore::new());
        let ks = KeyStore::new("securechat", store.clone());
        let kp = generate_identity_keypair(&OsCryptoProvider).unwrap();
        ks.put_private_key("Alice", &kp.private).unwrap();

        let raw = store.retrieve("securechat_private_alice").unwrap().unwrap();
        let jwk = Jwk::from_json(std::str::from_utf8(&raw).unwrap()).unwrap();
        assert!(jwk.is_private());
    }

    #[test]
    fn test_no_identity() {
        let ks = keystore();
        let key = generate_session_key("c1", &OsCryptoProvider).unwrap();
        assert!(matches!(ks.cache_session_key(key), Err(Error::NoIdentity)));
        assert!(matches!(ks.get_session_key("c1"), Err(Error::NoIdentity)));
    }

    #[test]
    fn test_session_cache_and_persist() {
        let ks = keystore();
        ks.activate("alice");

        let key = generate_session_key("c1", &OsCryptoProvider).unwrap();
        let expected = *key.secret_bytes();
        ks.cache_session_key(key).unwrap();

        let cached = ks.get_session_key("c1").unwrap().unwrap();
        assert_eq!(*cached.secret_bytes(), expected);

        // Survives a logout/login through the persisted copy
        ks.deactivate();
        ks.activate("alice");
        let reloaded = ks.get_session_key("c1").unwrap().unwrap();
        assert_eq!(*reloaded.secret_bytes(), expected);
    }

    #[test]
    fn test_identities_are_isolated() {
        let ks = keystore();
        ks.activate("alice");
        ks.cache_session_key(generate_session_key("c1", &OsCryptoProvider).unwrap())
            .unwrap();

        ks.activate("bob");
        assert!(ks.get_session_key("c1").unwrap().is_none());
    }

    #[test]
    fn test_stale_token_discarded() {
        let ks = keystore();
        let token = ks.activate("alice");
        ks.deactivate();

        let key = generate_session_key("c1", &OsCryptoProvider).unwrap();
        assert!(ks.cache_session_key_scoped(&token, key).unwrap().is_none());

        // Nothing was persisted either
        ks.activate("alice");
        assert!(ks.get_session_key("c1").unwrap().is_none());
    }

    #[test]
    fn test_scoped_read_rejects_stale_token() {
        let store = Arc::new(SecureStore::new());
        let ks = KeyStore::new("securechat", store);
        let alice = ks.activate("alice");
        ks.cache_session_key(generate_session_key("c1", &OsCryptoProvider).unwrap())
            .unwrap();
        assert!(ks.get_session_key_scoped(&alice, "c1").unwrap().is_some());

        let bob = ks.activate("bob");
        ks.cache_session_key(generate_session_key("c1", &OsCryptoProvider).unwrap())
            .unwrap();

        // Neither the cache nor the persisted copy is reachable with alice's token
        assert!(matches!(ks.get_session_key_scoped(&alice, "c1"), Err(Error::NoIdentity)));
        assert!(ks.get_session_key_scoped(&bob, "c1").unwrap().is_some());

        ks.deactivate();
        assert!(matches!(ks.get_session_key_scoped(&bob, "c1"), Err(Error::NoIdentity)));
    }

    #[test]
    fn test_token_from_previous_login_is_stale() {
        let ks = keystore();
        let old = ks.activate("alice");
        let new = ks.activate("alice");
        assert!(!ks.is_current(&old));
        assert!(ks.is_current(&new));
    }

    #[test]
    fn test_last_write_wins() {
        let ks = keystore();
        ks.activate("alice");
        ks.cache_session_key(generate_session_key("c1", &OsCryptoProvider).unwrap())
            .unwrap();
        let second = generate_session_key("c1", &OsCryptoProvider).unwrap();
        let expected = *second.secret_bytes();
        ks.cache_session_key(second).unwrap();

        assert_eq!(*ks.get_session_key("c1").unwrap().unwrap().secret_bytes(), expected);
    }

    #[test]
    fn test_delete_identity() {
        let store = Arc::new(SecureStore::new());
        let ks = KeyStore::new("securechat", store.clone());
        let kp = generate_identity_keypair(&OsCryptoProvider).unwrap();
        ks.put_private_key("alice", &kp.private).unwrap();
        ks.activate("alice");
        ks.cache_session_key(generate_session_key("c1", &OsCryptoProvider).unwrap())
            .unwrap();

        // Another identity whose name extends alice's
        ks.activate("alice_2");
        ks.cache_session_key(generate_session_key("c1", &OsCryptoProvider).unwrap())
            .unwrap();

        ks.delete_identity("alice").unwrap();
        assert!(!ks.has_private_key("alice").unwrap());
        assert!(ks.get_session_key("c1").unwrap().is_some());

        ks.activate("alice");
        assert!(ks.get_session_key("c1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_durable_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        let path = path.to_str().unwrap();
        let kp = generate_identity_keypair(&OsCryptoProvider).unwrap();

        {
            let db = Database::open(Some(path)).await.unwrap();
            let ks = KeyStore::new("securechat", Arc::new(SecureStore::with_backend(Arc::new(db))));
            ks.put_private_key("alice", &kp.private).unwrap();
        }

        let db = Database::open(Some(path)).await.unwrap();
        let ks = KeyStore::new("securechat", Arc::new(SecureStore::with_backend(Arc::new(db))));
        assert_eq!(ks.get_private_key("alice").unwrap().unwrap().public_key(), kp.public);
    }
}

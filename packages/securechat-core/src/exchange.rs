//! # Key Exchange
//!
//! Establishes and distributes the session key of a conversation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SESSION ESTABLISHMENT                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ensure_session(conversation, participants)                            │
//! │        │                                                                │
//! │        ├─► 1. KeyStore cache / persisted copy ─────────────► done      │
//! │        │                                                                │
//! │        ├─► (per-conversation lock)                                     │
//! │        │                                                                │
//! │        ├─► 2. transport.fetch_wrapped_key(own id)                      │
//! │        │        └─► unwrap with own private key ───────────► done      │
//! │        │                                                                │
//! │        └─► 3. generate session key                                     │
//! │                 fetch every participant's public key                   │
//! │                 wrap once per participant (self included)              │
//! │                 publish_wrapped_keys                                   │
//! │                   ├─ Accepted ──────────────────────────────► done     │
//! │                   └─ AlreadyEstablished                                │
//! │                        └─► discard ours, go to step 2                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport accepts one wrapped-key set per conversation, so two
//! clients racing on the first message converge on a single key. Inside
//! one client the per-conversation lock keeps the race from starting.

use futures::future::try_join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{
    generate_session_key, import_public_key, unwrap_session_key, wrap_session_key,
    PrivateIdentityKey, SessionKey, SharedProvider, WrappedKeyBlob,
};
use crate::error::{Error, Result};
use crate::keystore::{KeyStore, ScopeToken};
use crate::transport::{KeyPublication, MessageTransport, UserDirectory, WrappedKeyRecord};

/// The logged-in identity an exchange acts for
pub struct SessionIdentity {
    /// Server user id
    pub user_id: String,
    /// Identity private key
    pub private_key: PrivateIdentityKey,
    /// Key store scope opened at login
    pub scope: ScopeToken,
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("user_id", &self.user_id)
            .field("public_key", &self.private_key.public_key())
            .finish()
    }
}

/// Session key establishment and retrieval
pub struct KeyExchange {
    directory: Arc<dyn UserDirectory>,
    transport: Arc<dyn MessageTransport>,
    keystore: Arc<KeyStore>,
    provider: SharedProvider,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyExchange {
    /// Create a key exchange over the given collaborators
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        transport: Arc<dyn MessageTransport>,
        keystore: Arc<KeyStore>,
        provider: SharedProvider,
    ) -> Self {
        Self {
            directory,
            transport,
            keystore,
            provider,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn conversation_lock(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    fn release_lock(&self, conversation_id: &str) {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(conversation_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(conversation_id);
            }
        }
    }

    /// The session key of a conversation, establishing it if nobody has
    ///
    /// `participants` is the full member list, including `identity`.
    pub async fn ensure_session(
        &self,
        identity: &SessionIdentity,
        conversation_id: &str,
        participants: &[String],
    ) -> Result<Arc<SessionKey>> {
        let participants = normalize_participants(&identity.user_id, participants)?;

        if let Some(key) = self
            .keystore
            .get_session_key_scoped(&identity.scope, conversation_id)?
        {
            tracing::debug!("Session key for {} served from key store", conversation_id);
            return Ok(key);
        }

        let lock = self.conversation_lock(conversation_id);
        let result = {
            let _guard = lock.lock().await;
            self.establish_locked(identity, conversation_id, &participants)
                .await
        };
        drop(lock);
        self.release_lock(conversation_id);
        result
    }

    async fn establish_locked(
        &self,
        identity: &SessionIdentity,
        conversation_id: &str,
        participants: &[String],
    ) -> Result<Arc<SessionKey>> {
        // Another task may have finished while we waited for the lock
        if let Some(key) = self
            .keystore
            .get_session_key_scoped(&identity.scope, conversation_id)?
        {
            return Ok(key);
        }

        if let Some(key) = self.fetch_and_unwrap(identity, conversation_id).await? {
            return Ok(key);
        }

        let session_key = generate_session_key(conversation_id, self.provider.as_ref())?;
        let records = self
            .wrap_for_participants(&session_key, conversation_id, participants)
            .await?;

        match self
            .transport
            .publish_wrapped_keys(conversation_id, records)
            .await?
        {
            KeyPublication::Accepted => {
                tracing::info!(
                    "Established session key for {} ({} participants)",
                    conversation_id,
                    participants.len()
                );
                self.cache(identity, session_key)
            }
            KeyPublication::AlreadyEstablished => {
                tracing::warn!(
                    "Session for {} was established concurrently; adopting the published key",
                    conversation_id
                );
                drop(session_key);
                self.fetch_and_unwrap(identity, conversation_id)
                    .await?
                    .ok_or_else(|| {
                        Error::KeyExchange(format!(
                            "Conversation {} is established but holds no key for {}",
                            conversation_id, identity.user_id
                        ))
                    })
            }
        }
    }

    /// The session key of a conversation someone else established
    ///
    /// Never generates a key. Fails with [`Error::KeyExchange`] when no
    /// wrapped key exists for this identity.
    pub async fn receive_session(
        &self,
        identity: &SessionIdentity,
        conversation_id: &str,
    ) -> Result<Arc<SessionKey>> {
        if let Some(key) = self
            .keystore
            .get_session_key_scoped(&identity.scope, conversation_id)?
        {
            return Ok(key);
        }

        self.fetch_and_unwrap(identity, conversation_id)
            .await?
            .ok_or_else(|| {
                Error::KeyExchange(format!(
                    "No wrapped key for {} in conversation {}",
                    identity.user_id, conversation_id
                ))
            })
    }

    async fn fetch_and_unwrap(
        &self,
        identity: &SessionIdentity,
        conversation_id: &str,
    ) -> Result<Option<Arc<SessionKey>>> {
        let Some(record) = self
            .transport
            .fetch_wrapped_key(conversation_id, &identity.user_id)
            .await?
        else {
            return Ok(None);
        };

        let blob = WrappedKeyBlob::from_base64(conversation_id, &record.wrapped_key)?;
        let key = unwrap_session_key(&blob, &identity.private_key)?;
        tracing::debug!("Unwrapped session key for {}", conversation_id);

        self.cache(identity, key).map(Some)
    }

    fn cache(&self, identity: &SessionIdentity, key: SessionKey) -> Result<Arc<SessionKey>> {
        self.keystore
            .cache_session_key_scoped(&identity.scope, key)?
            .ok_or(Error::NoIdentity)
    }

    async fn wrap_for_participants(
        &self,
        key: &SessionKey,
        conversation_id: &str,
        participants: &[String],
    ) -> Result<Vec<WrappedKeyRecord>> {
        let entries = try_join_all(participants.iter().map(|user_id| async move {
            self.directory
                .fetch_public_key(user_id)
                .await?
                .ok_or_else(|| Error::ParticipantKeyMissing(user_id.clone()))
        }))
        .await?;

        let mut records = Vec::with_capacity(entries.len());
        for (user_id, entry) in participants.iter().zip(entries) {
            let public_key = import_public_key(&entry.public_key)?;
            let blob = wrap_session_key(key, &public_key, self.provider.as_ref())?;
            records.push(WrappedKeyRecord {
                conversation_id: conversation_id.to_string(),
                recipient_user_id: user_id.clone(),
                wrapped_key: blob.to_base64(),
            });
        }
        Ok(records)
    }
}

/// Deduplicate the participant list and check it contains `own_user_id`
fn normalize_participants(own_user_id: &str, participants: &[String]) -> Result<Vec<String>> {
    if participants.is_empty() {
        return Err(Error::InvalidParticipants("Participant list is empty".into()));
    }

    let mut unique: Vec<String> = Vec::with_capacity(participants.len());
    for p in participants {
        if !unique.contains(p) {
            unique.push(p.clone());
        }
    }

    if !unique.iter().any(|p| p == own_user_id) {
        return Err(Error::InvalidParticipants(format!(
            "Participant list does not include {}",
            own_user_id
        )));
    }
    Ok(unique)
}

// ============================================================================
// TESTS
// ============================================================================

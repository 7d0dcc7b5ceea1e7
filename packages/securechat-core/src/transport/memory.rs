//! In-process directory and transport.
//!
//! Complete implementations of the transport traits backed by memory.
//! They enforce the same rules as the server: one wrapped-key set per
//! conversation, server-assigned ids and timestamps, and forward-only
//! status changes.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

use super::{
    DirectoryEntry, EncryptedMessage, KeyPublication, MessageQuery, MessageTransport,
    OutgoingMessage, UserDirectory, WrappedKeyRecord,
};
use crate::error::{Error, Result};
use crate::messaging::MessageStatus;
use crate::time::now_millis;

// ============================================================================
// DIRECTORY
// ============================================================================

/// In-memory user directory
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish or replace a user's entry
    pub fn publish(&self, entry: DirectoryEntry) {
        self.entries.write().insert(entry.user_id.clone(), entry);
    }

    /// Remove a user's entry
    pub fn remove(&self, user_id: &str) -> bool {
        self.entries.write().remove(user_id).is_some()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn fetch_public_key(&self, user_id: &str) -> Result<Option<DirectoryEntry>> {
        Ok(self.entries.read().get(user_id).cloned())
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Default)]
struct TransportState {
    /// conversation → recipient → record
    wrapped_keys: HashMap<String, HashMap<String, WrappedKeyRecord>>,
    /// Insertion ordered; `created_at` is strictly increasing
    messages: Vec<EncryptedMessage>,
    last_created_at: i64,
}

/// In-memory message transport
#[derive(Default)]
pub struct InMemoryTransport {
    state: RwLock<TransportState>,
    latency: Option<Duration>,
}

impl InMemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to widen race windows in tests
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: RwLock::default(),
            latency: Some(latency),
        }
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Store a message exactly as given, bypassing validation
    ///
    /// Models records written by other clients, including malformed ones.
    pub fn inject_message(&self, message: EncryptedMessage) {
        let mut state = self.state.write();
        state.last_created_at = state.last_created_at.max(message.created_at);
        state.messages.push(message);
    }

    /// Number of wrapped keys stored for a conversation
    pub fn wrapped_key_count(&self, conversation_id: &str) -> usize {
        self.state
            .read()
            .wrapped_keys
            .get(conversation_id)
            .map_or(0, HashMap::len)
    }

    /// Number of messages stored for a conversation
    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.state
            .read()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .count()
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn publish_wrapped_keys(
        &self,
        conversation_id: &str,
        keys: Vec<WrappedKeyRecord>,
    ) -> Result<KeyPublication> {
        self.delay().await;

        if let Some(record) = keys.iter().find(|k| k.conversation_id != conversation_id) {
            return Err(Error::Transport(format!(
                "Wrapped key for conversation {} published under {}",
                record.conversation_id, conversation_id
            )));
        }

        let mut state = self.state.write();
        if state.wrapped_keys.contains_key(conversation_id) {
            return Ok(KeyPublication::AlreadyEstablished);
        }

        let set = keys
            .into_iter()
            .map(|k| (k.recipient_user_id.clone(), k))
            .collect();
        state.wrapped_keys.insert(conversation_id.to_string(), set);
        Ok(KeyPublication::Accepted)
    }

    async fn fetch_wrapped_key(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<WrappedKeyRecord>> {
        self.delay().await;
        Ok(self
            .state
            .read()
            .wrapped_keys
            .get(conversation_id)
            .and_then(|set| set.get(user_id))
            .cloned())
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<EncryptedMessage> {
        self.delay().await;

        if message.content.is_empty() {
            return Err(Error::Transport("Conversation ID and content required".into()));
        }

        let mut state = self.state.write();
        let created_at = now_millis().max(state.last_created_at + 1);
        state.last_created_at = created_at;

        let stored = EncryptedMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            iv: message.iv,
            content_type: message.content_type,
            status: MessageStatus::Sent,
            created_at,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<EncryptedMessage>> {
        self.delay().await;
        let state = self.state.read();

        let mut history: Vec<&EncryptedMessage> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        history.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let end = match &query.before {
            Some(before) => history
                .iter()
                .position(|m| &m.id == before)
                .ok_or_else(|| Error::MessageNotFound(before.clone()))?,
            None => history.len(),
        };
        let start = end.saturating_sub(query.limit);

        Ok(history[start..end].iter().map(|m| (*m).clone()).collect())
    }

    async fn update_status(&self, message_id: &str, status: MessageStatus) -> Result<EncryptedMessage> {
        self.delay().await;
        let mut state = self.state.write();

        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::MessageNotFound(message_id.to_string()))?;

        if message.status == status {
            return Ok(message.clone());
        }
        if !message.status.can_transition_to(status) {
            return Err(Error::InvalidStatusTransition {
                from: message.status.to_string(),
                to: status.to_string(),
            });
        }

        message.status = status;
        Ok(message.clone())
    }

    async fn mark_conversation_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize> {
        self.delay().await;
        let mut state = self.state.write();

        let mut changed = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader_id)
        {
            if message.status.can_transition_to(MessageStatus::Read) {
                message.status = MessageStatus::Read;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

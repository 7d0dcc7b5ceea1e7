//! # Transport Module
//!
//! The server-facing seams of the core: the user directory that publishes
//! identity public keys, and the message transport that stores wrapped
//! session keys and encrypted messages.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     TRANSPORT BOUNDARY                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   SecureChatClient                                                     │
//! │        │                                                                │
//! │        ├──► UserDirectory                                              │
//! │        │      fetch_public_key(user_id) → { userId, publicKey: JWK }   │
//! │        │                                                                │
//! │        └──► MessageTransport                                           │
//! │               publish_wrapped_keys   (first write wins)                │
//! │               fetch_wrapped_key                                        │
//! │               send_message           (server assigns id, createdAt)    │
//! │               fetch_messages         (ascending, paged)                │
//! │               update_status          (forward only)                    │
//! │               mark_conversation_read                                   │
//! │                                                                         │
//! │   Only ciphertext and wrapped keys cross this boundary.                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every record serializes in camelCase to match the server's JSON.

mod memory;

pub use memory::{InMemoryDirectory, InMemoryTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::Jwk;
use crate::error::Result;
use crate::messaging::{ContentType, MessageStatus};

/// Default number of messages per history page
pub const DEFAULT_PAGE_SIZE: usize = 50;

// ============================================================================
// WIRE RECORDS
// ============================================================================

/// A user's published identity key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Server user id
    pub user_id: String,
    /// Public identity key
    pub public_key: Jwk,
    /// Login name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Name shown to contacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A session key wrapped for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyRecord {
    /// Conversation the key belongs to
    pub conversation_id: String,
    /// Participant who can unwrap it
    pub recipient_user_id: String,
    /// Base64 wrapped key blob
    pub wrapped_key: String,
}

/// An encrypted message as stored by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    /// Server-assigned message id
    pub id: String,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Base64 ciphertext
    pub content: String,
    /// Base64 nonce
    pub iv: String,
    /// Kind of content
    #[serde(default)]
    pub content_type: ContentType,
    /// Delivery status
    pub status: MessageStatus,
    /// Server timestamp (Unix milliseconds)
    pub created_at: i64,
}

/// A message ready to be sent; the server fills in the rest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Target conversation
    pub conversation_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Base64 ciphertext
    pub content: String,
    /// Base64 nonce
    pub iv: String,
    /// Kind of content
    #[serde(default)]
    pub content_type: ContentType,
}

/// Outcome of publishing a conversation's wrapped keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPublication {
    /// This set of wrapped keys is now the conversation's key
    Accepted,
    /// Another client established the conversation first; nothing was stored
    AlreadyEstablished,
}

/// History page selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    /// Only messages older than this message id
    pub before: Option<String>,
    /// Maximum number of messages
    pub limit: usize,
}

impl MessageQuery {
    /// Latest page of `limit` messages
    pub fn latest(limit: usize) -> Self {
        Self {
            before: None,
            limit,
        }
    }

    /// The page preceding `message_id`
    pub fn before(message_id: impl Into<String>, limit: usize) -> Self {
        Self {
            before: Some(message_id.into()),
            limit,
        }
    }
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self::latest(DEFAULT_PAGE_SIZE)
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// Lookup of published identity keys
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Public key entry for a user, or `None` if they never published one
    async fn fetch_public_key(&self, user_id: &str) -> Result<Option<DirectoryEntry>>;
}

/// Server storage for wrapped keys and encrypted messages
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish the wrapped keys of a conversation
    ///
    /// Implementations must accept at most one set per conversation.
    async fn publish_wrapped_keys(
        &self,
        conversation_id: &str,
        keys: Vec<WrappedKeyRecord>,
    ) -> Result<KeyPublication>;

    /// The wrapped key stored for `user_id` in a conversation
    async fn fetch_wrapped_key(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<WrappedKeyRecord>>;

    /// Store a message; returns it with id, timestamp and status `sent`
    async fn send_message(&self, message: OutgoingMessage) -> Result<EncryptedMessage>;

    /// One page of a conversation's history in ascending order
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<EncryptedMessage>>;

    /// Move a message's status forward
    async fn update_status(&self, message_id: &str, status: MessageStatus) -> Result<EncryptedMessage>;

    /// Mark every message from other senders in a conversation as read
    ///
    /// Returns how many messages changed.
    async fn mark_conversation_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{export_public_key, generate_identity_keypair, OsCryptoProvider};

    #[test]
    fn test_encrypted_message_wire_shape() {
        let msg = EncryptedMessage {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            content: "Y2lwaGVy".into(),
            iv: "AAAAAAAAAAAAAAAA".into(),
            content_type: ContentType::Text,
            status: MessageStatus::Delivered,
            created_at: 1_700_000_000_000,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["contentType"], "text");
        assert_eq!(json["status"], "delivered");
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);

        let back: EncryptedMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_wrapped_key_wire_shape() {
        let record = WrappedKeyRecord {
            conversation_id: "c1".into(),
            recipient_user_id: "u2".into(),
            wrapped_key: "AQID".into(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"conversationId":"c1","recipientUserId":"u2","wrappedKey":"AQID"}"#
        );
    }

    #[test]
    fn test_directory_entry_wire_shape() {
        let kp = generate_identity_keypair(&OsCryptoProvider).unwrap();
        let entry = DirectoryEntry {
            user_id: "u1".into(),
            public_key: export_public_key(&kp.public),
            username: None,
            display_name: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["publicKey"]["kty"], "OKP");
        assert!(json.get("displayName").is_none());
    }

    #[test]
    fn test_content_type_defaults_to_text() {
        let json = r#"{"conversationId":"c","senderId":"s","content":"","iv":""}"#;
        let msg: OutgoingMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.content_type, ContentType::Text);
    }

    #[test]
    fn test_default_query() {
        let q = MessageQuery::default();
        assert_eq!(q.limit, DEFAULT_PAGE_SIZE);
        assert!(q.before.is_none());
    }
}

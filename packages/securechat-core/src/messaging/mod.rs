//! # Messaging Module
//!
//! Message types and history decryption.
//!
//! ## Message Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         MESSAGE FLOW                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Alice                          Server                          Bob    │
//! │  ─────                          ──────                          ───    │
//! │                                                                         │
//! │  ensure_session(conv)                                                  │
//! │  encrypt("hi") ─────────► EncryptedMessage ◄─────── fetch_messages     │
//! │                           { content, iv,            receive_session    │
//! │                             status: sent }          decrypt_history    │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                  sent ──► delivered ──► read    (forward only)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! History is decrypted concurrently, then put back into server order.
//! A message that fails authentication is reported as
//! [`MessageBody::Undecryptable`] and the rest of the page still loads.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptedPayload, MessageCipher, SessionKey};
use crate::error::Result;
use crate::transport::EncryptedMessage;

/// Message delivery status
///
/// Moves only forward: `Sent → Delivered → Read`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Stored by the server
    Sent,
    /// Delivered to the recipient's device
    Delivered,
    /// Recipient has read the message
    Read,
}

impl MessageStatus {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        next > self
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kind of message content
///
/// Serialized as a bare string; unknown kinds are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    /// UTF-8 text
    #[default]
    Text,
    /// Any other kind the server reports
    Other(String),
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        if value == "text" {
            ContentType::Text
        } else {
            ContentType::Other(value)
        }
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Text => "text".to_string(),
            ContentType::Other(other) => other,
        }
    }
}

/// Decrypted content of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plaintext
    Text(String),
    /// Failed authentication or was malformed
    Undecryptable,
}

/// A message after decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Server message id
    pub id: String,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Decrypted body
    pub body: MessageBody,
    /// Kind of content
    pub content_type: ContentType,
    /// Delivery status
    pub status: MessageStatus,
    /// Server timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl DecryptedMessage {
    /// Plaintext, if the message decrypted
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Undecryptable => None,
        }
    }

    /// Check if this message is from us
    pub fn is_outgoing(&self, own_user_id: &str) -> bool {
        self.sender_id == own_user_id
    }
}

/// Decrypt a single stored message
///
/// Malformed base64 in `content` or `iv` fails like a bad tag would;
/// there is no plaintext fallback.
pub fn decrypt_record(
    record: &EncryptedMessage,
    key: &SessionKey,
    cipher: &MessageCipher,
) -> Result<String> {
    let payload = EncryptedPayload::from_wire(&record.content, &record.iv)?;
    cipher.decrypt(&payload, key)
}

/// Decrypt a page of history
///
/// Every record is decrypted independently. The result is ordered by
/// `(created_at, id)` regardless of completion order.
pub async fn decrypt_history(
    records: Vec<EncryptedMessage>,
    key: &SessionKey,
    cipher: &MessageCipher,
) -> Vec<DecryptedMessage> {
    let tasks = records.into_iter().map(|record| async move {
        let body = match decrypt_record(&record, key, cipher) {
            Ok(text) => MessageBody::Text(text),
            Err(e) => {
                tracing::warn!(
                    "Message {} in conversation {} is undecryptable: {}",
                    record.id,
                    record.conversation_id,
                    e
                );
                MessageBody::Undecryptable
            }
        };

        DecryptedMessage {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            body,
            content_type: record.content_type,
            status: record.status,
            created_at: record.created_at,
        }
    });

    let mut messages = join_all(tasks).await;
    messages.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    messages
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_session_key, OsCryptoProvider};

    fn cipher() -> MessageCipher {
        MessageCipher::new(OsCryptoProvider::shared())
    }

    fn record(id: &str, created_at: i64, text: &str, key: &SessionKey) -> EncryptedMessage {
        let (content, iv) = cipher().encrypt(text, key).unwrap().to_wire();
        EncryptedMessage {
            id: id.into(),
            conversation_id: key.conversation_id().into(),
            sender_id: "alice".into(),
            content,
            iv,
            content_type: ContentType::Text,
            status: MessageStatus::Sent,
            created_at,
        }
    }

    #[test]
    fn test_status_transitions() {
        use MessageStatus::*;
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Read));
        assert!(Delivered.can_transition_to(Read));
        assert!(!Read.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&MessageStatus::Delivered).unwrap(), "\"delivered\"");
        let parsed: MessageStatus = serde_json::from_str("\"read\"").unwrap();
        assert_eq!(parsed, MessageStatus::Read);
        assert_eq!(MessageStatus::Sent.to_string(), "sent");
    }

    #[test]
    fn test_content_type_serialization() {
        assert_eq!(serde_json::to_string(&ContentType::Text).unwrap(), "\"text\"");
        let other: ContentType = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(other, ContentType::Other("image".into()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"image\"");
    }

    #[tokio::test]
    async fn test_decrypt_history_orders_by_server_key() {
        let key = generate_session_key("c1", &OsCryptoProvider).unwrap();
        let records = vec![
            record("m3", 300, "third", &key),
            record("m1", 100, "first", &key),
            record("m2b", 200, "second-b", &key),
            record("m2a", 200, "second-a", &key),
        ];

        let history = decrypt_history(records, &key, &cipher()).await;
        let texts: Vec<_> = history.iter().map(|m| m.text().unwrap()).collect();
        assert_eq!(texts, vec!["first", "second-a", "second-b", "third"]);
    }

    #[tokio::test]
    async fn test_undecryptable_does_not_fail_page() {
        let key = generate_session_key("c1", &OsCryptoProvider).unwrap();
        let other_key = generate_session_key("c1", &OsCryptoProvider).unwrap();

        let mut plaintext = record("m3", 3, "x", &key);
        plaintext.content = "hello in the clear".into();

        let records = vec![
            record("m1", 1, "good", &key),
            record("m2", 2, "wrong key", &other_key),
            plaintext,
        ];

        let history = decrypt_history(records, &key, &cipher()).await;
        assert_eq!(history[0].text(), Some("good"));
        assert_eq!(history[1].body, MessageBody::Undecryptable);
        assert_eq!(history[2].body, MessageBody::Undecryptable);
    }

    #[test]
    fn test_decrypt_record_strict() {
        let key = generate_session_key("c1", &OsCryptoProvider).unwrap();
        let mut r = record("m1", 1, "hi", &key);
        assert_eq!(decrypt_record(&r, &key, &cipher()).unwrap(), "hi");

        r.iv = "not-base64".into();
        assert!(matches!(
            decrypt_record(&r, &key, &cipher()),
            Err(crate::error::Error::Decryption(_))
        ));
    }

    #[test]
    fn test_is_outgoing() {
        let msg = DecryptedMessage {
            id: "m".into(),
            conversation_id: "c".into(),
            sender_id: "alice".into(),
            body: MessageBody::Text("hi".into()),
            content_type: ContentType::Text,
            status: MessageStatus::Sent,
            created_at: 0,
        };
        assert!(msg.is_outgoing("alice"));
        assert!(!msg.is_outgoing("bob"));
    }
}

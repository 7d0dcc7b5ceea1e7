//! # Secure Chat Client
//!
//! The entry point applications use: identity lifecycle plus encrypted
//! send and receive for one logged-in user.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CLIENT LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  open(config, directory, transport, provider)                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────┐   register()   ┌─────────────┐                        │
//! │  │  LoggedOut  │───────────────►│   Active    │◄─┐                     │
//! │  │             │   login()      │             │  │ send_text           │
//! │  │             │───────────────►│             │──┘ load_messages       │
//! │  └─────────────┘  key found     └──────┬──────┘    mark_read           │
//! │        ▲   │                           │                                │
//! │        │   │ login()                   │ logout()                       │
//! │        │   │ key missing               │                                │
//! │        │   ▼                           │                                │
//! │  ┌─────────────┐                       │                                │
//! │  │  Degraded   │ crypto calls fail     │                                │
//! │  │             │ PrivateKeyUnavailable │                                │
//! │  └─────────────┘                       │                                │
//! │        │ logout()                      │                                │
//! │        └───────────────────────────────┴──────► LoggedOut               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use parking_lot::RwLock;
use std::sync::Arc;

use crate::crypto::{
    export_public_key, generate_identity_keypair, MessageCipher, SharedProvider,
};
use crate::error::{Error, Result};
use crate::exchange::{KeyExchange, SessionIdentity};
use crate::keystore::KeyStore;
use crate::messaging::{decrypt_history, decrypt_record, ContentType, DecryptedMessage, MessageStatus};
use crate::storage::open_secure_store;
use crate::transport::{
    DirectoryEntry, EncryptedMessage, MessageQuery, MessageTransport, OutgoingMessage,
    UserDirectory,
};
use crate::CoreConfig;

/// Result of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Private key loaded; encryption is available
    Ready,
    /// No private key on this device; messages cannot be encrypted or read
    Degraded,
}

enum ClientSession {
    LoggedOut,
    Active(Arc<SessionIdentity>),
    Degraded { username: String },
}

/// End-to-end encrypted messaging client for one device
pub struct SecureChatClient {
    config: CoreConfig,
    keystore: Arc<KeyStore>,
    exchange: KeyExchange,
    transport: Arc<dyn MessageTransport>,
    cipher: MessageCipher,
    provider: SharedProvider,
    session: RwLock<ClientSession>,
}

impl SecureChatClient {
    /// Open a client over the configured local storage
    pub async fn open(
        config: CoreConfig,
        directory: Arc<dyn UserDirectory>,
        transport: Arc<dyn MessageTransport>,
        provider: SharedProvider,
    ) -> Result<Self> {
        tracing::info!("Opening SecureChat Core v{}", crate::version());

        let store = open_secure_store(
            config.database_path.as_deref(),
            config.storage_key,
            provider.clone(),
        )
        .await?;
        let keystore = Arc::new(KeyStore::new(config.storage_namespace.clone(), Arc::new(store)));
        let exchange = KeyExchange::new(directory, transport.clone(), keystore.clone(), provider.clone());

        Ok(Self {
            config,
            keystore,
            exchange,
            transport,
            cipher: MessageCipher::new(provider.clone()),
            provider,
            session: RwLock::new(ClientSession::LoggedOut),
        })
    }

    /// Configuration the client was opened with
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ========================================================================
    // IDENTITY LIFECYCLE
    // ========================================================================

    /// Create an identity for a new account
    ///
    /// The private key is stored on this device and the user is logged in.
    /// The returned entry must be published to the user directory.
    pub fn register(
        &self,
        user_id: &str,
        username: &str,
        display_name: &str,
    ) -> Result<DirectoryEntry> {
        if self.keystore.has_private_key(username)? {
            return Err(Error::IdentityExists(username.to_string()));
        }

        let keypair = generate_identity_keypair(self.provider.as_ref())?;
        self.keystore.put_private_key(username, &keypair.private)?;
        let scope = self.keystore.activate(username);

        tracing::info!(
            "Registered identity for {} (fingerprint {})",
            user_id,
            keypair.public.fingerprint()
        );

        *self.session.write() = ClientSession::Active(Arc::new(SessionIdentity {
            user_id: user_id.to_string(),
            private_key: keypair.private,
            scope,
        }));

        Ok(DirectoryEntry {
            user_id: user_id.to_string(),
            public_key: export_public_key(&keypair.public),
            username: Some(username.to_string()),
            display_name: Some(display_name.to_string()),
        })
    }

    /// Log in an existing account on this device
    ///
    /// Without a stored private key the client is degraded: login succeeds
    /// but every encrypt or decrypt fails with
    /// [`Error::PrivateKeyUnavailable`].
    pub fn login(&self, user_id: &str, username: &str) -> Result<LoginOutcome> {
        match self.keystore.get_private_key(username)? {
            Some(private_key) => {
                let scope = self.keystore.activate(username);
                tracing::info!(
                    "Logged in {} (fingerprint {})",
                    user_id,
                    private_key.public_key().fingerprint()
                );
                *self.session.write() = ClientSession::Active(Arc::new(SessionIdentity {
                    user_id: user_id.to_string(),
                    private_key,
                    scope,
                }));
                Ok(LoginOutcome::Ready)
            }
            None => {
                self.keystore.deactivate();
                tracing::warn!(
                    "No private key for {} on this device; encryption unavailable",
                    username
                );
                *self.session.write() = ClientSession::Degraded {
                    username: username.to_string(),
                };
                Ok(LoginOutcome::Degraded)
            }
        }
    }

    /// Log out and drop identity material from memory
    ///
    /// Key exchanges still in flight finish without caching anything.
    pub fn logout(&self) {
        self.keystore.deactivate();
        *self.session.write() = ClientSession::LoggedOut;
        tracing::info!("Logged out");
    }

    /// Whether the current login lacks a private key
    pub fn is_degraded(&self) -> bool {
        matches!(*self.session.read(), ClientSession::Degraded { .. })
    }

    /// User id of the active identity
    pub fn user_id(&self) -> Option<String> {
        match &*self.session.read() {
            ClientSession::Active(identity) => Some(identity.user_id.clone()),
            _ => None,
        }
    }

    /// Fingerprint of the active identity's public key
    pub fn fingerprint(&self) -> Result<String> {
        Ok(self.identity()?.private_key.public_key().fingerprint())
    }

    fn identity(&self) -> Result<Arc<SessionIdentity>> {
        match &*self.session.read() {
            ClientSession::Active(identity) => Ok(identity.clone()),
            ClientSession::Degraded { username } => {
                Err(Error::PrivateKeyUnavailable(username.clone()))
            }
            ClientSession::LoggedOut => Err(Error::NoIdentity),
        }
    }

    // ========================================================================
    // MESSAGING
    // ========================================================================

    /// Encrypt and send a text message
    ///
    /// Establishes the conversation's session key on first use.
    pub async fn send_text(
        &self,
        conversation_id: &str,
        participants: &[String],
        text: &str,
    ) -> Result<EncryptedMessage> {
        let identity = self.identity()?;
        let key = self
            .exchange
            .ensure_session(&identity, conversation_id, participants)
            .await?;

        let (content, iv) = self.cipher.encrypt(text, &key)?.to_wire();
        let message = self
            .transport
            .send_message(OutgoingMessage {
                conversation_id: conversation_id.to_string(),
                sender_id: identity.user_id.clone(),
                content,
                iv,
                content_type: ContentType::Text,
            })
            .await?;

        tracing::debug!("Sent message {} to {}", message.id, conversation_id);
        Ok(message)
    }

    /// Load and decrypt one page of history
    ///
    /// Messages that fail authentication come back as
    /// [`MessageBody::Undecryptable`](crate::messaging::MessageBody::Undecryptable).
    pub async fn load_messages(
        &self,
        conversation_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<DecryptedMessage>> {
        let identity = self.identity()?;
        let records = self.transport.fetch_messages(conversation_id, query).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let key = self
            .exchange
            .receive_session(&identity, conversation_id)
            .await?;
        Ok(decrypt_history(records, &key, &self.cipher).await)
    }

    /// Load the latest page using the configured page size
    pub async fn load_recent(&self, conversation_id: &str) -> Result<Vec<DecryptedMessage>> {
        self.load_messages(conversation_id, MessageQuery::latest(self.config.history_page_size))
            .await
    }

    /// Decrypt a single message, propagating any failure
    pub async fn decrypt_message(&self, message: &EncryptedMessage) -> Result<String> {
        let identity = self.identity()?;
        let key = self
            .exchange
            .receive_session(&identity, &message.conversation_id)
            .await?;
        decrypt_record(message, &key, &self.cipher)
    }

    /// Mark a message delivered
    pub async fn mark_delivered(&self, message_id: &str) -> Result<EncryptedMessage> {
        self.identity()?;
        self.transport
            .update_status(message_id, MessageStatus::Delivered)
            .await
    }

    /// Mark a message read
    pub async fn mark_read(&self, message_id: &str) -> Result<EncryptedMessage> {
        self.identity()?;
        self.transport.update_status(message_id, MessageStatus::Read).await
    }

    /// Mark every incoming message in a conversation read
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<usize> {
        let identity = self.identity()?;
        self.transport
            .mark_conversation_read(conversation_id, &identity.user_id)
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! End-to-end workflows across several clients sharing one directory and
//! one transport.

use std::sync::Arc;
use std::time::Duration;

use securechat_core::crypto::derive_storage_key;
use securechat_core::{
    CoreConfig, EncryptedMessage, Error, InMemoryDirectory, InMemoryTransport, LoginOutcome,
    MessageBody, MessageQuery, MessageStatus, OsCryptoProvider, SecureChatClient,
};

struct Network {
    directory: Arc<InMemoryDirectory>,
    transport: Arc<InMemoryTransport>,
}

impl Network {
    fn new() -> Self {
        Self::with_transport(InMemoryTransport::new())
    }

    fn with_transport(transport: InMemoryTransport) -> Self {
        Self {
            directory: Arc::new(InMemoryDirectory::new()),
            transport: Arc::new(transport),
        }
    }

    async fn device(&self, config: CoreConfig) -> SecureChatClient {
        SecureChatClient::open(
            config,
            self.directory.clone(),
            self.transport.clone(),
            OsCryptoProvider::shared(),
        )
        .await
        .unwrap()
    }

    async fn user(&self, user_id: &str, username: &str) -> SecureChatClient {
        let client = self.device(CoreConfig::default()).await;
        let entry = client.register(user_id, username, username).unwrap();
        self.directory.publish(entry);
        client
    }
}

fn members(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn alice_sends_bob_reads() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;

    let sent = alice
        .send_text("dm", &members(&["1", "2"]), "hello")
        .await
        .unwrap();

    // One session key, wrapped once per participant
    assert_eq!(net.transport.wrapped_key_count("dm"), 2);
    // The server only ever sees ciphertext
    assert_ne!(sent.content, "hello");
    assert!(!sent.content.contains("hello"));

    let history = bob.load_messages("dm", MessageQuery::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text(), Some("hello"));
    assert_eq!(history[0].sender_id, "1");
}

#[tokio::test]
async fn conversation_replies_share_one_key() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;
    let dm = members(&["1", "2"]);

    alice.send_text("dm", &dm, "ping").await.unwrap();
    bob.send_text("dm", &dm, "pong").await.unwrap();
    alice.send_text("dm", &dm, "ping again").await.unwrap();

    assert_eq!(net.transport.wrapped_key_count("dm"), 2);

    for client in [&alice, &bob] {
        let texts: Vec<_> = client
            .load_recent("dm")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["ping", "pong", "ping again"]);
    }
}

#[tokio::test]
async fn history_survives_logout_and_login() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;

    alice.send_text("dm", &members(&["1", "2"]), "before logout").await.unwrap();
    assert_eq!(bob.load_recent("dm").await.unwrap()[0].text(), Some("before logout"));

    bob.logout();
    assert!(matches!(bob.load_recent("dm").await, Err(Error::NoIdentity)));

    assert_eq!(bob.login("2", "bob").unwrap(), LoginOutcome::Ready);
    assert_eq!(bob.load_recent("dm").await.unwrap()[0].text(), Some("before logout"));
}

#[tokio::test]
async fn outsider_cannot_read_conversation() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let _bob = net.user("2", "bob").await;
    let eve = net.user("3", "eve").await;

    let sent = alice.send_text("dm", &members(&["1", "2"]), "secret").await.unwrap();

    assert!(matches!(eve.decrypt_message(&sent).await, Err(Error::KeyExchange(_))));
    assert!(matches!(
        eve.load_messages("dm", MessageQuery::default()).await,
        Err(Error::KeyExchange(_))
    ));
}

#[tokio::test]
async fn missing_participant_is_retryable() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;

    let result = alice.send_text("dm", &members(&["1", "2"]), "early").await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::ParticipantKeyMissing(ref id) if id == "2"));
    assert!(err.is_recoverable());
    assert_eq!(net.transport.message_count("dm"), 0);

    // Bob registers; the same call now goes through
    let bob = net.user("2", "bob").await;
    alice.send_text("dm", &members(&["1", "2"]), "now").await.unwrap();
    assert_eq!(bob.load_recent("dm").await.unwrap()[0].text(), Some("now"));
}

#[tokio::test]
async fn first_message_race_converges() {
    let net = Network::with_transport(InMemoryTransport::with_latency(Duration::from_millis(15)));
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;
    let dm = members(&["1", "2"]);

    let (a, b) = tokio::join!(
        alice.send_text("dm", &dm, "from alice"),
        bob.send_text("dm", &dm, "from bob"),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(net.transport.wrapped_key_count("dm"), 2);
    for client in [&alice, &bob] {
        let history = client.load_recent("dm").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.text().is_some()));
    }
}

#[tokio::test]
async fn new_device_cannot_decrypt() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let _bob = net.user("2", "bob").await;
    let sent = alice.send_text("dm", &members(&["1", "2"]), "hi").await.unwrap();

    let new_phone = net.device(CoreConfig::default()).await;
    assert_eq!(new_phone.login("2", "bob").unwrap(), LoginOutcome::Degraded);

    let err = new_phone.decrypt_message(&sent).await.unwrap_err();
    assert!(matches!(err, Error::PrivateKeyUnavailable(_)));
    assert!(err.requires_user_action());
}

#[tokio::test]
async fn switching_identity_on_shared_device_isolates_keys() {
    let net = Network::new();
    let shared = net.device(CoreConfig::default()).await;
    net.directory.publish(shared.register("1", "alice", "Alice").unwrap());
    shared.logout();
    net.directory.publish(shared.register("2", "bob", "Bob").unwrap());
    let carol = net.user("3", "carol").await;

    shared.logout();
    shared.login("1", "alice").unwrap();
    shared.send_text("ac", &members(&["1", "3"]), "alice and carol only").await.unwrap();
    assert_eq!(carol.load_recent("ac").await.unwrap().len(), 1);

    // Bob on the same device must not see Alice's cached session key
    shared.logout();
    shared.login("2", "bob").unwrap();
    assert!(matches!(shared.load_recent("ac").await, Err(Error::KeyExchange(_))));
}

#[tokio::test]
async fn logout_during_unwrap_caches_nothing() {
    let net = Network::with_transport(InMemoryTransport::with_latency(Duration::from_millis(20)));
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;
    alice.send_text("dm", &members(&["1", "2"]), "hi").await.unwrap();

    let (result, _) = tokio::join!(bob.load_recent("dm"), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        bob.logout();
    });
    assert!(matches!(result, Err(Error::NoIdentity)));

    // Still works from a clean login
    bob.login("2", "bob").unwrap();
    assert_eq!(bob.load_recent("dm").await.unwrap()[0].text(), Some("hi"));
}

#[tokio::test]
async fn identity_switch_during_load_leaks_nothing() {
    let net = Network::with_transport(InMemoryTransport::with_latency(Duration::from_millis(20)));
    let shared = net.device(CoreConfig::default()).await;
    net.directory.publish(shared.register("1", "alice", "Alice").unwrap());
    shared.logout();
    net.directory.publish(shared.register("2", "bob", "Bob").unwrap());
    let _carol = net.user("3", "carol").await;

    // Bob's key for his conversation with Carol is now cached on this device
    shared.send_text("bc", &members(&["2", "3"]), "bob and carol only").await.unwrap();
    shared.logout();
    shared.login("1", "alice").unwrap();

    let (result, _) = tokio::join!(shared.load_recent("bc"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        shared.logout();
        shared.login("2", "bob").unwrap();
    });
    assert!(matches!(result, Err(Error::NoIdentity)));

    // Bob himself still reads it
    assert_eq!(shared.load_recent("bc").await.unwrap()[0].text(), Some("bob and carol only"));
}

#[tokio::test]
async fn plaintext_on_the_wire_is_never_displayed() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;
    let real = alice.send_text("dm", &members(&["1", "2"]), "real").await.unwrap();

    net.transport.inject_message(EncryptedMessage {
        id: "legacy".into(),
        content: "plaintext from an old client".into(),
        iv: String::new(),
        created_at: real.created_at + 1,
        ..real.clone()
    });

    let history = bob.load_recent("dm").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text(), Some("real"));
    assert_eq!(history[1].body, MessageBody::Undecryptable);

    let strict = bob
        .decrypt_message(&EncryptedMessage {
            id: "legacy".into(),
            content: "plaintext from an old client".into(),
            iv: String::new(),
            ..real
        })
        .await;
    assert!(matches!(strict, Err(Error::Decryption(_))));
}

#[tokio::test]
async fn pagination_walks_history_backwards() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;
    let dm = members(&["1", "2"]);

    for i in 0..7 {
        alice.send_text("dm", &dm, &format!("msg {}", i)).await.unwrap();
    }

    let page = bob.load_messages("dm", MessageQuery::latest(3)).await.unwrap();
    let texts: Vec<_> = page.iter().map(|m| m.text().unwrap()).collect();
    assert_eq!(texts, vec!["msg 4", "msg 5", "msg 6"]);

    let older = bob
        .load_messages("dm", MessageQuery::before(page[0].id.clone(), 3))
        .await
        .unwrap();
    let texts: Vec<_> = older.iter().map(|m| m.text().unwrap()).collect();
    assert_eq!(texts, vec!["msg 1", "msg 2", "msg 3"]);
}

#[tokio::test]
async fn read_receipts_move_forward() {
    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let bob = net.user("2", "bob").await;
    let sent = alice.send_text("dm", &members(&["1", "2"]), "hi").await.unwrap();

    bob.mark_delivered(&sent.id).await.unwrap();
    assert_eq!(bob.mark_conversation_read("dm").await.unwrap(), 1);

    let seen = alice.load_recent("dm").await.unwrap();
    assert_eq!(seen[0].status, MessageStatus::Read);
    assert!(matches!(
        alice.mark_delivered(&sent.id).await,
        Err(Error::InvalidStatusTransition { .. })
    ));
}

#[tokio::test]
async fn durable_encrypted_keystore_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("securechat.db").to_str().unwrap().to_string();
    let storage_key = *derive_storage_key(b"device secret from the OS keychain", b"install-salt").unwrap();

    let config = CoreConfig {
        database_path: Some(db_path),
        storage_key: Some(storage_key),
        ..CoreConfig::default()
    };

    let net = Network::new();
    let alice = net.user("1", "alice").await;
    let sent;
    {
        let bob = net.device(config.clone()).await;
        net.directory.publish(bob.register("2", "bob", "Bob").unwrap());
        sent = alice.send_text("dm", &members(&["1", "2"]), "persisted").await.unwrap();
        assert_eq!(bob.decrypt_message(&sent).await.unwrap(), "persisted");
    }

    // Process restart: same database, same storage key
    let bob = net.device(config.clone()).await;
    assert_eq!(bob.login("2", "bob").unwrap(), LoginOutcome::Ready);
    assert_eq!(bob.decrypt_message(&sent).await.unwrap(), "persisted");

    // Wrong storage key cannot read the private key
    let wrong = CoreConfig {
        storage_key: Some([0u8; 32]),
        ..config
    };
    let bob = net.device(wrong).await;
    assert!(matches!(bob.login("2", "bob"), Err(Error::StorageReadError(_))));
}

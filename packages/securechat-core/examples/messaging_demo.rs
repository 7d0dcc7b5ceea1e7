//! # Messaging Demo
//!
//! Two clients exchanging encrypted messages through the in-memory
//! directory and transport.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=securechat_core=debug cargo run --example messaging_demo
//! ```

use std::sync::Arc;

use securechat_core::{
    CoreConfig, InMemoryDirectory, InMemoryTransport, MessageBody, MessageQuery,
    OsCryptoProvider, SecureChatClient,
};
use securechat_core::time;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> securechat_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("securechat_core=info")),
        )
        .init();

    println!("=== SecureChat Core: Messaging Demo ===\n");

    let directory = Arc::new(InMemoryDirectory::new());
    let transport = Arc::new(InMemoryTransport::new());

    let open = || {
        SecureChatClient::open(
            CoreConfig::default(),
            directory.clone(),
            transport.clone(),
            OsCryptoProvider::shared(),
        )
    };

    // Register both users and publish their keys
    let alice = open().await?;
    let bob = open().await?;
    directory.publish(alice.register("u-1", "alice", "Alice")?);
    directory.publish(bob.register("u-2", "bob", "Bob")?);
    println!("Alice fingerprint: {}", alice.fingerprint()?);
    println!("Bob fingerprint:   {}\n", bob.fingerprint()?);

    let participants = vec!["u-1".to_string(), "u-2".to_string()];

    // First message establishes the conversation key
    let first = alice.send_text("dm-1", &participants, "Hi Bob!").await?;
    println!("Alice sent {} (server sees: {}...)", first.id, &first.content[..16.min(first.content.len())]);

    bob.send_text("dm-1", &participants, "Hey Alice, got it.").await?;
    alice.send_text("dm-1", &participants, "Great, talk soon.").await?;

    bob.mark_delivered(&first.id).await?;
    bob.mark_conversation_read("dm-1").await?;

    println!("\nBob's view of dm-1:");
    for message in bob.load_messages("dm-1", MessageQuery::default()).await? {
        let who = if message.is_outgoing("u-2") { "me" } else { "alice" };
        let at = time::to_datetime(message.created_at)
            .map(|t| t.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_default();
        match &message.body {
            MessageBody::Text(text) => println!("  {} [{:>9}] {}: {}", at, message.status, who, text),
            MessageBody::Undecryptable => println!("  {} [{:>9}] {}: <undecryptable>", at, message.status, who),
        }
    }

    // Logging out and back in keeps history readable
    bob.logout();
    bob.login("u-2", "bob")?;
    println!("\nAfter re-login Bob still reads {} messages", bob.load_recent("dm-1").await?.len());

    println!("\n=== Demo Complete ===");
    Ok(())
}

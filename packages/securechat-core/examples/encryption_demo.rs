//! # Encryption Demo
//!
//! Demonstrates session key wrapping and message encryption between two
//! parties without any server.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example encryption_demo
//! ```

use securechat_core::crypto::{
    export_public_key, generate_identity_keypair, generate_session_key, import_public_key,
    unwrap_session_key, wrap_session_key, EncryptedPayload, MessageCipher, OsCryptoProvider,
};

fn main() {
    println!("=== SecureChat Core: End-to-End Encryption Demo ===\n");

    let provider = OsCryptoProvider::shared();

    // Step 1: Create identities for Alice and Bob
    println!("Step 1: Creating identity keys for Alice and Bob...");

    let alice = generate_identity_keypair(provider.as_ref()).expect("Failed to create Alice's identity");
    let bob = generate_identity_keypair(provider.as_ref()).expect("Failed to create Bob's identity");

    println!("  Alice's fingerprint: {}...", &alice.public.fingerprint()[..16]);
    println!("  Bob's fingerprint:   {}...", &bob.public.fingerprint()[..16]);
    println!();

    // Step 2: Bob's public key travels as a JWK
    println!("Step 2: Publishing Bob's public key as a JWK...");
    let bob_jwk = export_public_key(&bob.public);
    println!("  {}", bob_jwk.to_json().expect("Failed to serialize JWK"));
    let bob_public = import_public_key(&bob_jwk).expect("Failed to import Bob's key");
    println!();

    // Step 3: Alice creates the conversation key and wraps it for both
    println!("Step 3: Alice generates a session key and wraps it...");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                    KEY DISTRIBUTION                         │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │   Session Key ──► wrap(Alice pub) ──► server ──► Alice      │");
    println!("  │        │                                                    │");
    println!("  │        └────────► wrap(Bob pub)   ──► server ──► Bob        │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    let session = generate_session_key("demo-conversation", provider.as_ref())
        .expect("Failed to generate session key");
    let for_alice = wrap_session_key(&session, &alice.public, provider.as_ref()).expect("Wrap failed");
    let for_bob = wrap_session_key(&session, &bob_public, provider.as_ref()).expect("Wrap failed");

    println!("  Wrapped for Alice: {}", for_alice.to_base64());
    println!("  Wrapped for Bob:   {}", for_bob.to_base64());
    println!();

    // Step 4: Each side unwraps its own copy
    println!("Step 4: Unwrapping...");
    let alice_session = unwrap_session_key(&for_alice, &alice.private).expect("Alice unwrap failed");
    let bob_session = unwrap_session_key(&for_bob, &bob.private).expect("Bob unwrap failed");
    assert_eq!(*alice_session.secret_bytes(), *bob_session.secret_bytes());
    println!("  ✓ Both parties hold the same session key");

    let wrong = unwrap_session_key(&for_bob, &alice.private);
    println!("  ✓ Alice cannot open Bob's copy: {}", wrong.is_err());
    println!();

    // Step 5: Encrypt and decrypt a message
    println!("Step 5: Encrypting a message...");
    let cipher = MessageCipher::new(provider.clone());
    let message = "Hello Bob! This message is end-to-end encrypted.";

    let payload = cipher.encrypt(message, &alice_session).expect("Encryption failed");
    let (content, iv) = payload.to_wire();
    println!("  Plaintext:  \"{}\"", message);
    println!("  content:    {}", content);
    println!("  iv:         {}", iv);
    println!();

    println!("Step 6: Bob decrypts...");
    let received = EncryptedPayload::from_wire(&content, &iv).expect("Malformed payload");
    let decrypted = cipher.decrypt(&received, &bob_session).expect("Decryption failed");
    println!("  Decrypted: \"{}\"", decrypted);
    assert_eq!(decrypted, message);
    println!();

    // Step 7: Tampering is detected
    println!("Step 7: Tampering with the ciphertext...");
    let mut tampered = received.clone();
    tampered.ciphertext[0] ^= 0xFF;
    match cipher.decrypt(&tampered, &bob_session) {
        Ok(_) => println!("  ✗ Tampering went unnoticed"),
        Err(e) => println!("  ✓ Rejected: {}", e),
    }

    println!("\n=== Demo Complete ===");
}

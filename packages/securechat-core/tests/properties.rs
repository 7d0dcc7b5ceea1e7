//! Property-style tests for the message and key-wrap primitives.
//!
//! Inputs are generated from a seeded RNG so failures reproduce.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use securechat_core::crypto::{
    generate_identity_keypair, generate_session_key, unwrap_session_key, wrap_session_key,
    EncryptedPayload, MessageCipher, OsCryptoProvider, SeededCryptoProvider, WrappedKeyBlob,
};
use securechat_core::Error;

fn random_text(rng: &mut StdRng, max_chars: usize) -> String {
    const ALPHABET: &[char] = &['a', 'Z', '0', ' ', '\n', 'é', 'ß', 'ж', '中', '🔐', '\u{0}'];
    let len = rng.gen_range(0..max_chars);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

/// Property: decrypt(encrypt(m)) == m for arbitrary text
#[test]
fn property_message_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0x5ec0);
    let cipher = MessageCipher::new(OsCryptoProvider::shared());
    let key = generate_session_key("conv", &OsCryptoProvider).unwrap();

    for _ in 0..200 {
        let text = random_text(&mut rng, 500);
        let (content, iv) = cipher.encrypt(&text, &key).unwrap().to_wire();

        let payload = EncryptedPayload::from_wire(&content, &iv).unwrap();
        assert_eq!(cipher.decrypt(&payload, &key).unwrap(), text);
    }
}

/// Property: flipping any bit of ciphertext, tag or nonce is detected
#[test]
fn property_tamper_detection_every_position() {
    let cipher = MessageCipher::new(OsCryptoProvider::shared());
    let key = generate_session_key("conv", &OsCryptoProvider).unwrap();
    let payload = cipher.encrypt("attack at dawn", &key).unwrap();

    for i in 0..payload.ciphertext.len() {
        for bit in 0..8 {
            let mut tampered = payload.clone();
            tampered.ciphertext[i] ^= 1 << bit;
            assert!(
                matches!(cipher.decrypt(&tampered, &key), Err(Error::Decryption(_))),
                "ciphertext byte {} bit {} flip accepted",
                i,
                bit
            );
        }
    }

    for i in 0..payload.nonce.0.len() {
        let mut tampered = payload.clone();
        tampered.nonce.0[i] ^= 0x01;
        assert!(
            matches!(cipher.decrypt(&tampered, &key), Err(Error::Decryption(_))),
            "nonce byte {} flip accepted",
            i
        );
    }
}

/// Property: nonces never repeat under one key
#[test]
fn property_nonce_uniqueness() {
    let cipher = MessageCipher::new(OsCryptoProvider::shared());
    let key = generate_session_key("conv", &OsCryptoProvider).unwrap();

    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let payload = cipher.encrypt("same plaintext", &key).unwrap();
        assert!(seen.insert(payload.nonce.0), "nonce reused");
    }
}

/// Property: a key wrapped to one identity never opens with another
#[test]
fn property_wrap_is_recipient_bound() {
    let provider = SeededCryptoProvider::new(99);

    for i in 0..25 {
        let recipient = generate_identity_keypair(&provider).unwrap();
        let stranger = generate_identity_keypair(&provider).unwrap();
        let session = generate_session_key(format!("conv-{}", i), &provider).unwrap();

        let blob = wrap_session_key(&session, &recipient.public, &provider).unwrap();
        let opened = unwrap_session_key(&blob, &recipient.private).unwrap();
        assert_eq!(*opened.secret_bytes(), *session.secret_bytes());

        assert!(matches!(
            unwrap_session_key(&blob, &stranger.private),
            Err(Error::KeyExchange(_))
        ));
    }
}

/// Property: random bytes never unwrap into a key
#[test]
fn property_random_blobs_rejected() {
    let mut rng = StdRng::seed_from_u64(7);
    let identity = generate_identity_keypair(&OsCryptoProvider).unwrap();

    for _ in 0..200 {
        let len = rng.gen_range(0..200);
        let mut bytes = vec![0u8; len];
        rng.fill(&mut bytes[..]);
        if let Some(first) = bytes.first_mut() {
            *first = 1;
        }

        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let blob = WrappedKeyBlob::from_base64("conv", &encoded).unwrap();
        assert!(matches!(
            unwrap_session_key(&blob, &identity.private),
            Err(Error::KeyExchange(_))
        ));
    }
}

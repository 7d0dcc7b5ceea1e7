//! Benchmarks for identity, key wrapping and message encryption.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use securechat_core::crypto::{
    generate_identity_keypair, generate_session_key, unwrap_session_key, wrap_session_key,
    MessageCipher, OsCryptoProvider,
};

fn bench_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");
    group.bench_function("generate_x25519", |b| {
        b.iter(|| generate_identity_keypair(&OsCryptoProvider))
    });
    group.finish();
}

fn bench_key_wrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_key");

    let recipient = generate_identity_keypair(&OsCryptoProvider).unwrap();
    let session = generate_session_key("bench", &OsCryptoProvider).unwrap();
    let blob = wrap_session_key(&session, &recipient.public, &OsCryptoProvider).unwrap();

    group.bench_function("wrap", |b| {
        b.iter(|| wrap_session_key(black_box(&session), black_box(&recipient.public), &OsCryptoProvider))
    });
    group.bench_function("unwrap", |b| {
        b.iter(|| unwrap_session_key(black_box(&blob), black_box(&recipient.private)))
    });

    group.finish();
}

fn bench_message_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_cipher");

    let cipher = MessageCipher::new(OsCryptoProvider::shared());
    let session = generate_session_key("bench", &OsCryptoProvider).unwrap();

    for size in [64usize, 1024, 64 * 1024] {
        let text = "x".repeat(size);
        let payload = cipher.encrypt(&text, &session).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encrypt_{}b", size), |b| {
            b.iter(|| cipher.encrypt(black_box(&text), black_box(&session)))
        });
        group.bench_function(format!("decrypt_{}b", size), |b| {
            b.iter(|| cipher.decrypt(black_box(&payload), black_box(&session)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_identity, bench_key_wrap, bench_message_cipher);
criterion_main!(benches);

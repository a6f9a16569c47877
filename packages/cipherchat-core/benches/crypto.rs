//! Benchmark the cryptographic hot paths.
//!
//! Password unwrapping runs once per login, key agreement once per peer (per message when the key
//! cache is off) and AES-GCM once per message, so each is measured on its own.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cipherchat_core::messaging;
use cipherchat_core::transport::InMemoryBackend;
use cipherchat_core::{AccountKeyPair, KeyPairVault, SecretCache, Session, SessionKeyDeriver};

fn unwrap_private_key(c: &mut Criterion) {
    let vault = KeyPairVault::default();
    let (_, publication) = vault.enroll("benchmark password").unwrap();
    let wrapped = publication.wrapped_private_key();

    let mut group = c.benchmark_group("vault");
    group.sample_size(10);
    group.bench_function("unwrap (100k iterations)", |b| {
        b.iter(|| vault.unwrap(&wrapped, "benchmark password").unwrap())
    });
    group.finish();
}

fn derive_pairwise_key(c: &mut Criterion) {
    let alice = AccountKeyPair::generate().unwrap();
    let bob = AccountKeyPair::generate().unwrap();
    let bob_public = bob.public_key().to_base64().unwrap();

    let deriver = SessionKeyDeriver::new(Arc::new(InMemoryBackend::new()));
    let secrets = Arc::new(SecretCache::new());
    let session = Session::from_private_key(secrets, "alice", alice.private_key()).unwrap();

    c.bench_function("ecdh derive", |b| {
        b.iter(|| deriver.derive_pairwise_key(&session, &bob_public).unwrap())
    });
}

fn encrypt_decrypt(c: &mut Criterion) {
    let alice = AccountKeyPair::generate().unwrap();
    let bob = AccountKeyPair::generate().unwrap();
    let key = alice.private_key().diffie_hellman(bob.public_key());

    let mut group = c.benchmark_group("aes-gcm");
    for size in [64usize, 1024, 64 * 1024, 1024 * 1024] {
        let plaintext = vec![0x42u8; size];
        let payload = messaging::encrypt(&key, &plaintext).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, plaintext| {
            b.iter(|| messaging::encrypt(&key, plaintext).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &payload, |b, payload| {
            b.iter(|| messaging::decrypt(&key, &payload.ciphertext, &payload.iv).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, unwrap_private_key, derive_pairwise_key, encrypt_decrypt);
criterion_main!(benches);

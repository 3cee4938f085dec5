use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::HashSet;

use crate::crypto::keys::{KeyPair, Nonce, NONCE_LEN};
use crate::crypto::sealed_box::{decrypt_message, encrypt_message};
use crate::crypto::shared_secret::create_shared_secret;
use crate::errors::MessengerError;
use crate::secure_message::EncryptedMessage;

fn key_pairs(seed: u64) -> (KeyPair, KeyPair) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let sender = KeyPair::generate_with(&mut rng).expect("Should generate sender");
    let recipient = KeyPair::generate_with(&mut rng).expect("Should generate recipient");
    (sender, recipient)
}

/// Shannon entropy in bits per byte.
fn estimate_entropy(samples: &[u8]) -> f64 {
    let mut byte_counts = [0u32; 256];
    for &byte in samples {
        byte_counts[byte as usize] += 1;
    }

    let total = samples.len() as f64;
    byte_counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let probability = count as f64 / total;
            -probability * probability.log2()
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip_any_text(plaintext in any::<String>(), seed in any::<u64>()) {
        let (sender, recipient) = key_pairs(seed);

        let envelope = encrypt_message(&plaintext, recipient.public_key(), sender.private_key())
            .expect("Should encrypt");
        let decrypted = decrypt_message(&envelope, recipient.private_key()).expect("Should decrypt");

        prop_assert_eq!(decrypted, plaintext);
        prop_assert_eq!(envelope.sender_public_key(), sender.public_key());
    }

    #[test]
    fn prop_ciphertext_bit_flip_detected(
        plaintext in ".{0,64}",
        seed in any::<u64>(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let (sender, recipient) = key_pairs(seed);
        let envelope = encrypt_message(&plaintext, recipient.public_key(), sender.private_key())
            .expect("Should encrypt");

        let mut ciphertext = envelope.ciphertext().to_vec();
        let position = index.index(ciphertext.len());
        ciphertext[position] ^= 1 << bit;
        let tampered = EncryptedMessage::from_parts(
            ciphertext,
            *envelope.nonce(),
            *envelope.sender_public_key(),
        );

        prop_assert!(matches!(
            decrypt_message(&tampered, recipient.private_key()),
            Err(MessengerError::DecryptionError)
        ));
    }

    #[test]
    fn prop_nonce_bit_flip_detected(
        plaintext in ".{0,64}",
        seed in any::<u64>(),
        position in 0..NONCE_LEN,
        bit in 0u8..8,
    ) {
        let (sender, recipient) = key_pairs(seed);
        let envelope = encrypt_message(&plaintext, recipient.public_key(), sender.private_key())
            .expect("Should encrypt");

        let mut nonce = *envelope.nonce().as_bytes();
        nonce[position] ^= 1 << bit;
        let tampered = EncryptedMessage::from_parts(
            envelope.ciphertext().to_vec(),
            Nonce::from_bytes(nonce),
            *envelope.sender_public_key(),
        );

        prop_assert!(decrypt_message(&tampered, recipient.private_key()).is_err());
    }

    #[test]
    fn prop_wrong_recipient_rejected(plaintext in ".{0,64}", seed in any::<u64>()) {
        let (sender, recipient) = key_pairs(seed);
        let (outsider, _) = key_pairs(seed.wrapping_add(1));

        let envelope = encrypt_message(&plaintext, recipient.public_key(), sender.private_key())
            .expect("Should encrypt");

        prop_assert!(matches!(
            decrypt_message(&envelope, outsider.private_key()),
            Err(MessengerError::DecryptionError)
        ));
    }

    #[test]
    fn prop_shared_secret_is_symmetric(seed in any::<u64>()) {
        let (a, b) = key_pairs(seed);

        let ab = create_shared_secret(b.public_key(), a.private_key()).expect("Should agree");
        let ba = create_shared_secret(a.public_key(), b.private_key()).expect("Should agree");
        prop_assert_eq!(ab.expose_bytes(), ba.expose_bytes());
    }
}

#[test]
fn test_same_plaintext_never_repeats() {
    let (sender, recipient) = key_pairs(42);

    let mut nonces = HashSet::new();
    let mut ciphertexts = HashSet::new();
    for _ in 0..256 {
        let envelope = encrypt_message("same words", recipient.public_key(), sender.private_key())
            .expect("Should encrypt");
        assert!(nonces.insert(*envelope.nonce().as_bytes()), "nonce reused");
        assert!(ciphertexts.insert(envelope.ciphertext().to_vec()), "ciphertext repeated");
    }
}

#[test]
fn test_nonce_entropy() {
    let mut samples = Vec::with_capacity(256 * NONCE_LEN);
    for _ in 0..256 {
        let nonce = Nonce::random().expect("Should draw nonce");
        samples.extend_from_slice(nonce.as_bytes());
    }

    let entropy = estimate_entropy(&samples);
    assert!(entropy > 7.5, "nonce entropy too low: {entropy}");
}

#[test]
fn test_entropy_estimation() {
    let uniform: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    assert!(estimate_entropy(&uniform) > 7.99);

    let constant = vec![0x42u8; 4096];
    assert_eq!(estimate_entropy(&constant), 0.0);
}

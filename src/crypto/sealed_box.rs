//! One-shot authenticated public-key encryption of chat messages.
//!
//! Encryption agrees on a box key from the recipient's public key and the
//! sender's private key, then seals the UTF-8 plaintext with
//! XChaCha20-Poly1305 under a fresh random nonce. Decryption repeats the
//! agreement from the other side. A successful decryption proves both that
//! the ciphertext is intact and that it was produced by the holder of the
//! private key matching the embedded sender key; there is no separate
//! verification step.

use tracing::{debug, error};

use crate::crypto::keys::{Nonce, PrivateKey, PublicKey};
use crate::crypto::shared_secret::agree;
use crate::errors::{MessengerError, Result};
use crate::secure_message::EncryptedMessage;

/// Encrypt `plaintext` for `recipient_public_key`.
///
/// The embedded sender key is derived from `sender_private_key`, never taken
/// from the caller, so an envelope always names the key that produced it.
pub fn encrypt_message(
    plaintext: &str,
    recipient_public_key: &PublicKey,
    sender_private_key: &PrivateKey,
) -> Result<EncryptedMessage> {
    let nonce = Nonce::random()?;
    seal_with_nonce(plaintext, recipient_public_key, sender_private_key, nonce)
}

pub(crate) fn seal_with_nonce(
    plaintext: &str,
    recipient_public_key: &PublicKey,
    sender_private_key: &PrivateKey,
    nonce: Nonce,
) -> Result<EncryptedMessage> {
    let secret = agree(recipient_public_key, sender_private_key).ok_or_else(|| {
        error!(
            recipient = %recipient_public_key.fingerprint(),
            "refusing to encrypt to a low-order public key"
        );
        MessengerError::EncryptionError("non-contributory key agreement".to_string())
    })?;

    let ciphertext = secret.seal(plaintext.as_bytes(), &nonce).map_err(|e| {
        error!("message encryption failed");
        e
    })?;

    Ok(EncryptedMessage::from_parts(
        ciphertext,
        nonce,
        sender_private_key.public_key(),
    ))
}

/// Decrypt and authenticate an envelope addressed to `recipient_private_key`.
///
/// Every failure (wrong key, tampering, corruption, non-UTF-8 payload) is
/// reported as the same [`MessengerError::DecryptionError`].
pub fn decrypt_message(envelope: &EncryptedMessage, recipient_private_key: &PrivateKey) -> Result<String> {
    let result = agree(envelope.sender_public_key(), recipient_private_key)
        .ok_or(MessengerError::DecryptionError)
        .and_then(|secret| secret.open(envelope.ciphertext(), envelope.nonce()))
        .and_then(|plaintext| {
            std::str::from_utf8(&plaintext)
                .map(str::to_owned)
                .map_err(|_| MessengerError::DecryptionError)
        });

    if result.is_err() {
        debug!("envelope rejected");
    }
    result
}

/// Advisory check that the envelope names `expected_sender_public_key`.
///
/// This compares the embedded key only; it proves nothing about who produced
/// the ciphertext. Use it to notice that a contact's key changed before
/// attempting decryption. Whether [`decrypt_message`] succeeds remains the
/// only authenticity signal.
pub fn verify_message_authenticity(envelope: &EncryptedMessage, expected_sender_public_key: &PublicKey) -> bool {
    envelope.sender_public_key() == expected_sender_public_key
}

/// [`encrypt_message`] over untyped key buffers. Wrong-length keys are an
/// [`MessengerError::EncryptionError`].
pub fn encrypt_message_raw(
    plaintext: &str,
    recipient_public_key: &[u8],
    sender_private_key: &[u8],
) -> Result<EncryptedMessage> {
    let recipient = PublicKey::from_slice(recipient_public_key)
        .map_err(|e| MessengerError::EncryptionError(format!("recipient key: {e}")))?;
    let sender = PrivateKey::from_slice(sender_private_key)
        .map_err(|e| MessengerError::EncryptionError(format!("sender key: {e}")))?;
    encrypt_message(plaintext, &recipient, &sender)
}

/// [`decrypt_message`] over an untyped private key buffer.
pub fn decrypt_message_raw(envelope: &EncryptedMessage, recipient_private_key: &[u8]) -> Result<String> {
    let recipient = PrivateKey::from_slice(recipient_private_key).map_err(|_| MessengerError::DecryptionError)?;
    decrypt_message(envelope, &recipient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::secure_message::TAG_LEN;
    use rstest::rstest;

    fn pair() -> KeyPair {
        KeyPair::generate().expect("Should generate key pair")
    }

    #[rstest]
    #[case::empty(String::new())]
    #[case::ascii("hello".to_string())]
    #[case::multibyte("héllo wörld, こんにちは 👋".to_string())]
    #[case::long("supporter session notes ".repeat(2048))]
    fn test_encrypt_decrypt_roundtrip(#[case] plaintext: String) {
        let alice = pair();
        let bob = pair();

        let envelope = encrypt_message(&plaintext, alice.public_key(), bob.private_key())
            .expect("Should encrypt");
        let decrypted = decrypt_message(&envelope, alice.private_key()).expect("Should decrypt");

        assert_eq!(decrypted, plaintext);
        assert_eq!(envelope.ciphertext().len(), plaintext.len() + TAG_LEN);
    }

    #[test]
    fn test_sender_key_is_derived() {
        let alice = pair();
        let bob = pair();

        let envelope = encrypt_message("hi", alice.public_key(), bob.private_key()).expect("Should encrypt");
        assert_eq!(envelope.sender_public_key(), bob.public_key());
    }

    #[test]
    fn test_fresh_nonce_per_message() {
        let alice = pair();
        let bob = pair();

        let first = encrypt_message("same", alice.public_key(), bob.private_key()).expect("Should encrypt");
        let second = encrypt_message("same", alice.public_key(), bob.private_key()).expect("Should encrypt");

        assert_ne!(first.nonce(), second.nonce());
        assert_ne!(first.ciphertext(), second.ciphertext());
    }

    #[test]
    fn test_fixed_nonce_is_deterministic() {
        let alice = pair();
        let bob = pair();
        let nonce = Nonce::from_bytes([9u8; 24]);

        let first = seal_with_nonce("same", alice.public_key(), bob.private_key(), nonce).expect("Should encrypt");
        let second = seal_with_nonce("same", alice.public_key(), bob.private_key(), nonce).expect("Should encrypt");

        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let alice = pair();
        let bob = pair();
        let eve = pair();

        let envelope = encrypt_message("secret", alice.public_key(), bob.private_key()).expect("Should encrypt");
        let result = decrypt_message(&envelope, eve.private_key());

        assert!(matches!(result, Err(MessengerError::DecryptionError)));
    }

    #[test]
    fn test_corrupted_byte_fails() {
        let alice = pair();
        let bob = pair();

        let envelope = encrypt_message("hello", alice.public_key(), bob.private_key()).expect("Should encrypt");
        let mut ciphertext = envelope.ciphertext().to_vec();
        ciphertext[0] ^= 0x01;
        let tampered = EncryptedMessage::from_parts(ciphertext, *envelope.nonce(), *envelope.sender_public_key());

        let result = decrypt_message(&tampered, alice.private_key());
        assert!(matches!(result, Err(MessengerError::DecryptionError)));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let alice = pair();
        let bob = pair();

        let envelope = encrypt_message("hello", alice.public_key(), bob.private_key()).expect("Should encrypt");
        let truncated = EncryptedMessage::from_parts(
            envelope.ciphertext()[..4].to_vec(),
            *envelope.nonce(),
            *envelope.sender_public_key(),
        );

        assert!(matches!(
            decrypt_message(&truncated, alice.private_key()),
            Err(MessengerError::DecryptionError)
        ));
    }

    #[test]
    fn test_substituted_sender_key_fails() {
        let alice = pair();
        let bob = pair();
        let mallory = pair();

        let envelope = encrypt_message("from bob", alice.public_key(), bob.private_key()).expect("Should encrypt");
        let relabelled = EncryptedMessage::from_parts(
            envelope.ciphertext().to_vec(),
            *envelope.nonce(),
            *mallory.public_key(),
        );

        // Label check passes
        assert!(verify_message_authenticity(&relabelled, mallory.public_key()));
        // Decryption does not
        assert!(matches!(
            decrypt_message(&relabelled, alice.private_key()),
            Err(MessengerError::DecryptionError)
        ));
    }

    #[test]
    fn test_verify_message_authenticity_compares_embedded_key() {
        let alice = pair();
        let bob = pair();
        let carol = pair();

        let envelope = encrypt_message("hi", alice.public_key(), bob.private_key()).expect("Should encrypt");

        assert!(verify_message_authenticity(&envelope, bob.public_key()));
        assert!(!verify_message_authenticity(&envelope, carol.public_key()));
    }

    #[test]
    fn test_low_order_recipient_rejected() {
        let bob = pair();
        let result = encrypt_message("hi", &PublicKey::from_bytes([0u8; 32]), bob.private_key());
        assert!(matches!(result, Err(MessengerError::EncryptionError(_))));
    }

    #[test]
    fn test_raw_entry_points() {
        let alice = pair();
        let bob = pair();

        let envelope = encrypt_message_raw(
            "raw",
            alice.public_key().as_bytes(),
            bob.private_key().expose_bytes(),
        )
        .expect("Should encrypt");
        let decrypted = decrypt_message_raw(&envelope, alice.private_key().expose_bytes()).expect("Should decrypt");
        assert_eq!(decrypted, "raw");

        assert!(matches!(
            encrypt_message_raw("raw", &[1u8; 31], bob.private_key().expose_bytes()),
            Err(MessengerError::EncryptionError(_))
        ));
        assert!(matches!(
            decrypt_message_raw(&envelope, &[1u8; 16]),
            Err(MessengerError::DecryptionError)
        ));
    }

    #[test]
    fn test_non_utf8_payload_fails_closed() {
        let alice = pair();
        let bob = pair();
        let secret = agree(alice.public_key(), bob.private_key()).expect("Should agree");
        let nonce = Nonce::random().expect("Should generate nonce");
        let ciphertext = secret.seal(&[0xff, 0xfe, 0xfd], &nonce).expect("Should seal");
        let envelope = EncryptedMessage::from_parts(ciphertext, nonce, *bob.public_key());

        assert!(matches!(
            decrypt_message(&envelope, alice.private_key()),
            Err(MessengerError::DecryptionError)
        ));
    }
}

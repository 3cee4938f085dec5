//! Key agreement and the symmetric half of the box.
//!
//! A box key is HKDF-SHA256 over the X25519 agreement of one party's private
//! key and the other party's public key. The agreement is symmetric, so both
//! ends of a conversation arrive at the same [`SharedSecret`]. Callers that
//! exchange many messages with one counterpart can keep the secret (or a
//! [`ConversationCipher`]) around and skip the scalar multiplication on every
//! message.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::keys::{KeyPair, Nonce, PrivateKey, PublicKey};
use crate::errors::{MessengerError, Result};
use crate::secure_message::EncryptedMessage;

/// HKDF info label binding derived keys to this construction.
const BOX_KEY_INFO: &[u8] = b"haven-box-v1";

/// Length of a derived box key.
pub const SHARED_SECRET_LEN: usize = 32;

/// Symmetric key shared by two identities. Zeroized on drop; never persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    /// Raw key bytes. Handle with the same care as a private key.
    pub fn expose_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }

    /// Encrypt and authenticate `plaintext` under this key.
    pub fn seal(&self, plaintext: &[u8], nonce: &Nonce) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|e| MessengerError::EncryptionError(e.to_string()))
    }

    /// Verify and decrypt `ciphertext`. The returned buffer is zeroized when
    /// dropped.
    pub fn open(&self, ciphertext: &[u8], nonce: &Nonce) -> Result<Zeroizing<Vec<u8>>> {
        self.cipher()
            .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| MessengerError::DecryptionError)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

/// Agree on a box key, or `None` when the agreement is non-contributory
/// (the peer sent a low-order point).
pub(crate) fn agree(their_public: &PublicKey, my_private: &PrivateKey) -> Option<SharedSecret> {
    let dh = my_private.to_dalek().diffie_hellman(&their_public.to_dalek());
    if !dh.was_contributory() {
        return None;
    }

    let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
    let mut key = [0u8; SHARED_SECRET_LEN];
    hk.expand(BOX_KEY_INFO, &mut key).ok()?;
    let secret = SharedSecret(key);
    key.zeroize();
    Some(secret)
}

/// Derive the box key for `(their_public, my_private)` without encrypting
/// anything. Deterministic and symmetric across the two parties.
pub fn create_shared_secret(their_public: &PublicKey, my_private: &PrivateKey) -> Result<SharedSecret> {
    agree(their_public, my_private).ok_or_else(|| {
        MessengerError::EncryptionError("non-contributory key agreement".to_string())
    })
}

/// A precomputed box between the local identity and one counterpart.
///
/// Produces and consumes the same envelopes as
/// [`encrypt_message`](crate::crypto::sealed_box::encrypt_message) and
/// [`decrypt_message`](crate::crypto::sealed_box::decrypt_message), so either
/// side may use either path.
pub struct ConversationCipher {
    secret: SharedSecret,
    local_public: PublicKey,
    peer_public: PublicKey,
}

impl ConversationCipher {
    pub fn new(local: &KeyPair, peer_public: PublicKey) -> Result<Self> {
        let secret = create_shared_secret(&peer_public, local.private_key())?;
        debug!(peer = %peer_public.fingerprint(), "precomputed conversation key");
        Ok(ConversationCipher {
            secret,
            local_public: *local.public_key(),
            peer_public,
        })
    }

    pub fn peer_public_key(&self) -> &PublicKey {
        &self.peer_public
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedMessage> {
        let nonce = Nonce::random()?;
        let ciphertext = self.secret.seal(plaintext.as_bytes(), &nonce)?;
        Ok(EncryptedMessage::from_parts(ciphertext, nonce, self.local_public))
    }

    /// Decrypt an envelope from the counterpart. An envelope claiming any
    /// other sender is rejected with the same error as a forged one.
    pub fn decrypt(&self, envelope: &EncryptedMessage) -> Result<String> {
        if *envelope.sender_public_key() != self.peer_public {
            return Err(MessengerError::DecryptionError);
        }
        let plaintext = self.secret.open(envelope.ciphertext(), envelope.nonce())?;
        std::str::from_utf8(&plaintext)
            .map(str::to_owned)
            .map_err(|_| MessengerError::DecryptionError)
    }
}

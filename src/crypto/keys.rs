//! Fixed-size key and nonce types.
//!
//! Every piece of key material has its own type so that passing a nonce where
//! a public key is expected, or a 31-byte slice where 32 are required, fails
//! to compile rather than at runtime.

use std::fmt;
use std::hash::{Hash, Hasher};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::errors::{MessengerError, Result};
use crate::security::secure_rng;

/// Length of an X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of an X25519 private key.
pub const PRIVATE_KEY_LEN: usize = 32;
/// Length of an XChaCha20 nonce.
pub const NONCE_LEN: usize = 24;

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| MessengerError::InvalidKeyLength {
            expected: N,
            actual: bytes.len(),
        })
}

/// Public half of an identity, safe to publish.
#[derive(Clone, Copy, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        PublicKey(bytes)
    }

    /// Parse a public key from an untyped buffer.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        fixed(bytes).map(PublicKey)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Standard base64, the form published to the key directory.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| MessengerError::MalformedEnvelope(format!("public key: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Short hex digest for logs and key-change notices.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }

    pub(crate) fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

/// Private half of an identity. Zeroized on drop and never printed.
pub struct PrivateKey(Secret<[u8; PRIVATE_KEY_LEN]>);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_LEN]) -> Self {
        PrivateKey(Secret::new(bytes))
    }

    /// Parse a private key from an untyped buffer. The caller still owns
    /// (and should zeroize) the source slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array = Zeroizing::new(fixed::<PRIVATE_KEY_LEN>(bytes)?);
        Ok(Self::from_bytes(*array))
    }

    pub fn expose_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        self.0.expose_secret()
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        let secret = self.to_dalek();
        PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes())
    }

    pub(crate) fn to_dalek(&self) -> StaticSecret {
        StaticSecret::from(*self.0.expose_secret())
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        PrivateKey::from_bytes(*self.0.expose_secret())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// A per-message XChaCha20 nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Nonce(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        fixed(bytes).map(Nonce)
    }

    /// Draw a fresh nonce from the operating system generator.
    pub fn random() -> Result<Self> {
        secure_rng::random::array::<NONCE_LEN>().map(Nonce)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// An identity key pair. The public half always corresponds to the private
/// half; there is no way to build one that does not.
#[derive(Clone)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Generate a key pair from the operating system generator.
    pub fn generate() -> Result<Self> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a key pair from a caller-supplied secure generator.
    pub fn generate_with<R>(rng: &mut R) -> Result<Self>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let mut seed = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        secure_rng::fill_from(rng, &mut seed[..])?;
        Ok(Self::from_private(PrivateKey::from_bytes(*seed)))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        KeyPair {
            public: private.public_key(),
            private,
        }
    }

    /// Reassemble a pair from its halves, rejecting a mismatch.
    pub fn from_parts(public: PublicKey, private: PrivateKey) -> Result<Self> {
        if private.public_key() != public {
            return Err(MessengerError::KeyPairMismatch);
        }
        Ok(KeyPair { public, private })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        let private_eq: bool = self
            .private
            .expose_bytes()
            .ct_eq(other.private.expose_bytes())
            .into();
        self.public == other.public && private_eq
    }
}

impl Eq for KeyPair {}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &self.private)
            .finish()
    }
}

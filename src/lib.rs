//! End-to-end encryption core for one-to-one chat.
//!
//! A device holds one long-lived X25519 identity, kept in secure local
//! storage by [`identity::KeyManager`]. Messages are sealed to the
//! recipient's public key with [`crypto::encrypt_message`] and opened with
//! [`crypto::decrypt_message`]; the relay only ever sees an
//! [`EncryptedMessage`].

pub mod config;
pub mod crypto;
pub mod errors;
pub mod identity;
pub mod logging;
pub mod secure_message;
pub mod security;

#[cfg(test)]
mod testing;

pub use crate::config::AppConfig;
pub use crate::crypto::{
    create_shared_secret, decrypt_message, encrypt_message, verify_message_authenticity,
    ConversationCipher, KeyPair, Nonce, PrivateKey, PublicKey, SharedSecret,
};
pub use crate::errors::{MessengerError, Result, StorageError};
pub use crate::identity::KeyManager;
pub use crate::secure_message::EncryptedMessage;
pub use crate::security::{open_storage, SecureStorage};

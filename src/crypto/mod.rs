pub mod keys;
pub mod shared_secret;
pub mod sealed_box;

pub use keys::{KeyPair, Nonce, PrivateKey, PublicKey, NONCE_LEN, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
pub use shared_secret::{create_shared_secret, ConversationCipher, SharedSecret};
pub use sealed_box::{
    decrypt_message, decrypt_message_raw, encrypt_message, encrypt_message_raw,
    verify_message_authenticity,
};

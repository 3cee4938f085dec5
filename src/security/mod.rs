pub mod secure_rng;
pub mod secure_keystore;
pub mod memory_store;
pub mod file_store;
#[cfg(feature = "keyring-storage")]
pub mod keyring_store;

pub use secure_keystore::{open_storage, SecureStorage, PRIVATE_KEY_SLOT, PUBLIC_KEY_SLOT};
pub use memory_store::MemoryStorage;
pub use file_store::FileStorage;
#[cfg(feature = "keyring-storage")]
pub use keyring_store::KeyringStorage;

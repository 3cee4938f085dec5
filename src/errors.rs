use thiserror::Error;

/// The one message every decryption failure carries. Wrong key, corrupted
/// ciphertext and tampering are deliberately indistinguishable.
pub const DECRYPTION_FAILURE: &str = "message may be tampered or wrong key";

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Secure random number generator unavailable: {0}")]
    RngUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {}", DECRYPTION_FAILURE)]
    DecryptionError,

    #[error("Public key does not correspond to private key")]
    KeyPairMismatch,

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Failures of the secure key store. Never used to signal "no key stored";
/// an absent identity is `Ok(None)`.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored identity is corrupt: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Credential store error: {0}")]
    Backend(String),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

pub type Result<T, E = MessengerError> = std::result::Result<T, E>;

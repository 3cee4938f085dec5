use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use zeroize::Zeroizing;

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::StorageError;
use crate::security::file_store::FileStorage;
use crate::security::memory_store::MemoryStorage;

/// Slot holding the identity private key.
pub const PRIVATE_KEY_SLOT: &str = "haven.identity.private_key";
/// Slot holding the identity public key.
pub const PUBLIC_KEY_SLOT: &str = "haven.identity.public_key";

/// Device-local secure storage of opaque blobs addressed by fixed slot names.
///
/// Implementations perform I/O and may suspend the caller. A missing slot is
/// `Ok(None)`; `Err` always means the store itself failed.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read a slot
    async fn get(&self, slot: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError>;

    /// Write a slot, replacing any previous value
    async fn set(&self, slot: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove a slot. Removing an empty slot succeeds.
    async fn delete(&self, slot: &str) -> Result<(), StorageError>;

    /// Write several slots. Backends that can commit them as one unit
    /// override this. The default clears every listed slot before writing
    /// any of them, so a failure part way leaves some slots empty and never
    /// mixes old and new values.
    async fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StorageError> {
        for (slot, _) in entries {
            self.delete(slot).await?;
        }
        for (slot, value) in entries {
            self.set(slot, value).await?;
        }
        Ok(())
    }

    /// Write `entries` unless every one of the slots already holds a value.
    /// Returns `true` when this call wrote them.
    ///
    /// Backends override this with a check and write that other handles on
    /// the same store cannot interleave with. The default only checks then
    /// writes.
    async fn set_many_if_absent(&self, entries: &[(&str, &[u8])]) -> Result<bool, StorageError> {
        for (slot, _) in entries {
            if self.get(slot).await?.is_none() {
                self.set_many(entries).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove several slots
    async fn delete_many(&self, slots: &[&str]) -> Result<(), StorageError> {
        for slot in slots {
            self.delete(slot).await?;
        }
        Ok(())
    }
}

/// Build the backend selected in `config`.
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn SecureStorage>, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory key storage; identity will not survive restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::File => {
            let path = config.resolved_path();
            info!(path = %path.display(), "using file key storage");
            Ok(Arc::new(FileStorage::new(path)))
        }
        #[cfg(feature = "keyring-storage")]
        StorageBackend::Keyring => {
            info!(service = %config.keyring_service, "using OS keyring key storage");
            Ok(Arc::new(crate::security::keyring_store::KeyringStorage::new(
                &config.keyring_service,
            )))
        }
        #[cfg(not(feature = "keyring-storage"))]
        StorageBackend::Keyring => Err(StorageError::Backend(
            "keyring support was not compiled in".to_string(),
        )),
    }
}

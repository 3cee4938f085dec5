//! Secure storage in the operating system credential store.
//!
//! Each slot becomes one keyring entry under the configured service name.
//! Values are base64 encoded since most platform stores only take strings.
//!
//! The platform stores cannot commit several entries at once. Multi-slot
//! writes run as one blocking task that clears every slot before writing,
//! so a failure or a dropped caller leaves slots empty rather than holding a
//! mix of old and new values.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyring::Entry;
use tracing::debug;
use zeroize::Zeroizing;

use crate::errors::StorageError;
use crate::security::secure_keystore::SecureStorage;

pub struct KeyringStorage {
    service: String,
}

fn backend_error(err: keyring::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

impl KeyringStorage {
    pub fn new(service: &str) -> Self {
        KeyringStorage {
            service: service.to_string(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(service: &str, slot: &str) -> Result<Entry, StorageError> {
        Entry::new(service, slot).map_err(backend_error)
    }

    fn owned(entries: &[(&str, &[u8])]) -> Vec<(String, Zeroizing<String>)> {
        entries
            .iter()
            .map(|(slot, value)| (slot.to_string(), Zeroizing::new(STANDARD.encode(value))))
            .collect()
    }
}

fn read_entry(service: &str, slot: &str) -> Result<Option<Zeroizing<String>>, StorageError> {
    match KeyringStorage::entry(service, slot)?.get_password() {
        Ok(encoded) => Ok(Some(Zeroizing::new(encoded))),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(backend_error(e)),
    }
}

fn delete_entry(service: &str, slot: &str) -> Result<(), StorageError> {
    match KeyringStorage::entry(service, slot)?.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(backend_error(e)),
    }
}

fn write_entries(service: &str, entries: &[(String, Zeroizing<String>)]) -> Result<(), StorageError> {
    for (slot, _) in entries {
        delete_entry(service, slot)?;
    }
    for (slot, encoded) in entries {
        KeyringStorage::entry(service, slot)?
            .set_password(encoded)
            .map_err(backend_error)?;
        debug!(slot = %slot, "keyring entry written");
    }
    Ok(())
}

#[async_trait]
impl SecureStorage for KeyringStorage {
    async fn get(&self, slot: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        let service = self.service.clone();
        let slot = slot.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
            let Some(encoded) = read_entry(&service, &slot)? else {
                return Ok(None);
            };
            let value = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| StorageError::Corrupt(format!("keyring entry {slot}: {e}")))?;
            Ok(Some(Zeroizing::new(value)))
        })
        .await?
    }

    async fn set(&self, slot: &str, value: &[u8]) -> Result<(), StorageError> {
        self.set_many(&[(slot, value)]).await
    }

    async fn delete(&self, slot: &str) -> Result<(), StorageError> {
        let service = self.service.clone();
        let slot = slot.to_string();

        tokio::task::spawn_blocking(move || delete_entry(&service, &slot)).await?
    }

    async fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let service = self.service.clone();
        let entries = Self::owned(entries);

        tokio::task::spawn_blocking(move || write_entries(&service, &entries)).await?
    }

    /// Checked and written in one blocking task. Other processes using the
    /// same service are not excluded.
    async fn set_many_if_absent(&self, entries: &[(&str, &[u8])]) -> Result<bool, StorageError> {
        let service = self.service.clone();
        let entries = Self::owned(entries);

        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            for (slot, _) in &entries {
                if read_entry(&service, slot)?.is_none() {
                    write_entries(&service, &entries)?;
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await?
    }
}

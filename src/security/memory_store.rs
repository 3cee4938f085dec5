//! In-memory secure storage, for tests and ephemeral sessions

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::errors::StorageError;
use crate::security::secure_keystore::SecureStorage;

fn poisoned<T>(_err: PoisonError<T>) -> StorageError {
    StorageError::Poisoned
}

/// Clones share the same slots.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<RwLock<HashMap<String, Zeroizing<Vec<u8>>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn get(&self, slot: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        Ok(self.slots.read().map_err(poisoned)?.get(slot).cloned())
    }

    async fn set(&self, slot: &str, value: &[u8]) -> Result<(), StorageError> {
        self.slots
            .write()
            .map_err(poisoned)?
            .insert(slot.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    async fn delete(&self, slot: &str) -> Result<(), StorageError> {
        self.slots.write().map_err(poisoned)?.remove(slot);
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        for (slot, value) in entries {
            slots.insert(slot.to_string(), Zeroizing::new(value.to_vec()));
        }
        Ok(())
    }

    async fn set_many_if_absent(&self, entries: &[(&str, &[u8])]) -> Result<bool, StorageError> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        if entries.iter().all(|(slot, _)| slots.contains_key(*slot)) {
            return Ok(false);
        }
        for (slot, value) in entries {
            slots.insert(slot.to_string(), Zeroizing::new(value.to_vec()));
        }
        Ok(true)
    }

    async fn delete_many(&self, slots: &[&str]) -> Result<(), StorageError> {
        let mut stored = self.slots.write().map_err(poisoned)?;
        for slot in slots {
            stored.remove(*slot);
        }
        Ok(())
    }
}

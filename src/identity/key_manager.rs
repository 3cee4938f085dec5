use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::crypto::keys::{KeyPair, PrivateKey, PublicKey};
use crate::errors::{Result, StorageError};
use crate::security::secure_keystore::{SecureStorage, PRIVATE_KEY_SLOT, PUBLIC_KEY_SLOT};

/// Attempts at creating an identity before giving up on a store that keeps
/// changing underneath.
const CREATE_ATTEMPTS: usize = 3;

/// Owns the device identity key pair and its persistence.
///
/// Every storage operation runs behind one async mutex, so a write is never
/// observed half done by another caller of the same manager. Creation goes
/// through [`SecureStorage::set_many_if_absent`], so managers sharing one
/// store also agree on a single identity.
pub struct KeyManager {
    storage: Arc<dyn SecureStorage>,
    lock: Mutex<()>,
}

impl KeyManager {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        KeyManager {
            storage,
            lock: Mutex::new(()),
        }
    }

    /// Generate a fresh key pair without persisting it.
    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        KeyPair::generate()
    }

    /// Persist both halves, replacing any previous identity.
    pub async fn store_key_pair(&self, key_pair: &KeyPair) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.write(key_pair).await
    }

    /// The stored identity, or `None` when either half is missing.
    pub async fn get_stored_key_pair(&self) -> Result<Option<KeyPair>, StorageError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Return the stored identity, creating and persisting one on first use.
    ///
    /// When another writer creates an identity first, that one is returned.
    pub async fn get_or_create_key_pair(&self) -> Result<KeyPair> {
        let _guard = self.lock.lock().await;

        for _ in 0..CREATE_ATTEMPTS {
            if let Some(existing) = self.read().await? {
                debug!(fingerprint = %existing.public_key().fingerprint(), "loaded identity");
                return Ok(existing);
            }

            let key_pair = KeyPair::generate()?;
            if self.storage.set_many_if_absent(&slots(&key_pair)).await? {
                info!(fingerprint = %key_pair.public_key().fingerprint(), "created identity");
                return Ok(key_pair);
            }
            debug!("identity was created by another writer");
        }

        Err(StorageError::Backend("identity kept changing while being created".to_string()).into())
    }

    /// Remove both halves of the stored identity.
    pub async fn delete_stored_keys(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.storage
            .delete_many(&[PRIVATE_KEY_SLOT, PUBLIC_KEY_SLOT])
            .await?;
        info!("deleted stored identity");
        Ok(())
    }

    async fn write(&self, key_pair: &KeyPair) -> Result<(), StorageError> {
        self.storage.set_many(&slots(key_pair)).await?;
        debug!(fingerprint = %key_pair.public_key().fingerprint(), "stored identity");
        Ok(())
    }

    async fn read(&self) -> Result<Option<KeyPair>, StorageError> {
        let private = self.storage.get(PRIVATE_KEY_SLOT).await?;
        let public = self.storage.get(PUBLIC_KEY_SLOT).await?;

        let (private, public) = match (private, public) {
            (Some(private), Some(public)) => (private, public),
            (None, None) => return Ok(None),
            _ => {
                warn!("stored identity is incomplete; treating it as absent");
                return Ok(None);
            }
        };

        let private = PrivateKey::from_slice(&private)
            .map_err(|_| StorageError::Corrupt("private key has the wrong length".to_string()))?;
        let public = PublicKey::from_slice(&public)
            .map_err(|_| StorageError::Corrupt("public key has the wrong length".to_string()))?;

        KeyPair::from_parts(public, private).map(Some).map_err(|_| {
            StorageError::Corrupt("public key does not match private key".to_string())
        })
    }
}

fn slots(key_pair: &KeyPair) -> [(&'static str, &[u8]); 2] {
    [
        (PRIVATE_KEY_SLOT, key_pair.private_key().expose_bytes().as_slice()),
        (PUBLIC_KEY_SLOT, key_pair.public_key().as_bytes().as_slice()),
    ]
}

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::StorageError;
use crate::security::secure_keystore::SecureStorage;

const FORMAT_VERSION: u8 = 1;

/// Secure storage backed by a single file.
///
/// Every write replaces the whole file through a temporary file and an atomic
/// rename, so readers (and a crashed writer) see either the old slot set or
/// the new one. On unix the file is created owner-read/write only.
///
/// Handles opened on the same path within one process share a lock. Creating
/// the file uses a no-clobber rename, so of several processes racing to
/// create it only one succeeds.
pub struct FileStorage {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

#[derive(Serialize, Deserialize, Zeroize)]
struct SlotEntry {
    name: String,
    value: Vec<u8>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SlotFile {
    #[zeroize(skip)]
    version: u8,
    entries: Vec<SlotEntry>,
}

impl Default for SlotFile {
    fn default() -> Self {
        SlotFile {
            version: FORMAT_VERSION,
            entries: Vec::new(),
        }
    }
}

impl SlotFile {
    fn get(&self, name: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| Zeroizing::new(entry.value.clone()))
    }

    fn set(&mut self, name: &str, value: &[u8]) {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                entry.value.zeroize();
                entry.value = value.to_vec();
            }
            None => self.entries.push(SlotEntry {
                name: name.to_string(),
                value: value.to_vec(),
            }),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain_mut(|entry| {
            if entry.name == name {
                entry.zeroize();
                false
            } else {
                true
            }
        });
        before != self.entries.len()
    }
}

/// One lock per key file path, shared by every handle in the process.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Replace,
    CreateNew,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        FileStorage {
            lock: path_lock(&path),
            path,
        }
    }

    /// Run `op` against the slot file on the blocking pool. When `op` reports
    /// a change the file is rewritten before the lock is released.
    async fn with_slots<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SlotFile) -> (T, bool) + Send + 'static,
    {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);

        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let _guard = lock.lock().map_err(|_| StorageError::Poisoned)?;
            let mut slots = load(&path)?.unwrap_or_default();
            let (out, changed) = op(&mut slots);
            if changed {
                persist(&path, &slots, WriteMode::Replace)?;
            }
            Ok(out)
        })
        .await?
    }
}

/// `None` when the file does not exist yet.
fn load(path: &Path) -> Result<Option<SlotFile>, StorageError> {
    let data = match fs::read(path) {
        Ok(data) => Zeroizing::new(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if data.is_empty() {
        return Ok(Some(SlotFile::default()));
    }

    let slots: SlotFile = bincode::deserialize(&data)?;
    if slots.version != FORMAT_VERSION {
        return Err(StorageError::Corrupt(format!(
            "unsupported key file version {}",
            slots.version
        )));
    }
    Ok(Some(slots))
}

fn persist(path: &Path, slots: &SlotFile, mode: WriteMode) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let data = Zeroizing::new(bincode::serialize(slots)?);
    let mut tmp = NamedTempFile::new_in(&dir)?;
    restrict_permissions(tmp.as_file())?;
    tmp.write_all(&data)?;
    tmp.as_file().sync_all()?;
    let persisted = match mode {
        WriteMode::Replace => tmp.persist(path),
        WriteMode::CreateNew => tmp.persist_noclobber(path),
    };
    persisted.map_err(|e| StorageError::Io(e.error))?;

    debug!(path = %path.display(), "key file written");
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> Result<(), StorageError> {
    Ok(())
}

#[async_trait]
impl SecureStorage for FileStorage {
    async fn get(&self, slot: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        let slot = slot.to_string();
        self.with_slots(move |slots| (slots.get(&slot), false)).await
    }

    async fn set(&self, slot: &str, value: &[u8]) -> Result<(), StorageError> {
        self.set_many(&[(slot, value)]).await
    }

    async fn delete(&self, slot: &str) -> Result<(), StorageError> {
        self.delete_many(&[slot]).await
    }

    async fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let entries: Vec<(String, Zeroizing<Vec<u8>>)> = entries
            .iter()
            .map(|(slot, value)| (slot.to_string(), Zeroizing::new(value.to_vec())))
            .collect();

        self.with_slots(move |slots| {
            for (slot, value) in &entries {
                slots.set(slot, value);
            }
            ((), true)
        })
        .await
    }

    async fn set_many_if_absent(&self, entries: &[(&str, &[u8])]) -> Result<bool, StorageError> {
        let entries: Vec<(String, Zeroizing<Vec<u8>>)> = entries
            .iter()
            .map(|(slot, value)| (slot.to_string(), Zeroizing::new(value.to_vec())))
            .collect();
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);

        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let _guard = lock.lock().map_err(|_| StorageError::Poisoned)?;
            loop {
                let existing = load(&path)?;
                let mode = if existing.is_some() {
                    WriteMode::Replace
                } else {
                    WriteMode::CreateNew
                };
                let mut slots = existing.unwrap_or_default();

                if entries.iter().all(|(slot, _)| slots.contains(slot)) {
                    return Ok(false);
                }
                for (slot, value) in &entries {
                    slots.set(slot, value);
                }

                match persist(&path, &slots, mode) {
                    Ok(()) => return Ok(true),
                    // Another process created the file first; look again
                    Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        debug!(path = %path.display(), "key file appeared while creating it");
                    }
                    Err(e) => return Err(e),
                }
            }
        })
        .await?
    }

    async fn delete_many(&self, slots: &[&str]) -> Result<(), StorageError> {
        let names: Vec<String> = slots.iter().map(|slot| slot.to_string()).collect();

        self.with_slots(move |stored| {
            let mut changed = false;
            for name in &names {
                changed |= stored.remove(name);
            }
            ((), changed)
        })
        .await
    }
}

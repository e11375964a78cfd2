//! Durable key-value storage the favorites slot is written to.
//!
//! [`KeyValueStore`] is the narrow string-to-string contract the favorites
//! adapter needs, the same shape as a browser's `localStorage`. Two backends
//! implement it:
//!
//! - [`LmdbStore`]: an LMDB environment on disk, used by real sessions.
//! - [`MemoryStore`]: an in-process map with an optional byte quota and a
//!   disable switch, used by tests and by hosts that do not want disk state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// Name of the LMDB sub-database holding the slots.
const SLOTS_DB: &str = "slots";

/// String key-value storage.
///
/// Every `set` is all-or-nothing: after an error the previous value of the
/// key is still in place.
pub trait KeyValueStore {
    /// Returns the value stored under `key`, or `None` if the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Overwrites the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Returns whether it existed.
    fn remove(&self, key: &str) -> StoreResult<bool>;
}

/// LMDB-backed storage.
///
/// The environment lives in a `<name>.lmdb` directory which is created if
/// missing. Each write runs in its own transaction and is committed before
/// `set` returns.
pub struct LmdbStore {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl LmdbStore {
    /// Opens (or creates) the environment for `name` with the given map size.
    ///
    /// The map size is the hard upper bound of stored data; a write that
    /// does not fit fails with [`StoreError::StorageUnavailable`].
    pub fn open(name: &str, map_size: usize) -> StoreResult<Self> {
        let path = PathBuf::from(format!("{name}.lmdb"));
        std::fs::create_dir_all(&path)?;

        info!("Opening LMDB environment at: {}", path.display());

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(map_size)
            .open(&path)?;
        let db = env.create_db(Some(SLOTS_DB), DatabaseFlags::empty())?;

        Ok(Self { env, db, path })
    }

    /// Directory of the LMDB environment.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces buffered data to disk.
    pub fn sync(&self) -> StoreResult<()> {
        self.env.sync(true)?;
        Ok(())
    }

    /// Closes the environment and deletes its directory.
    pub fn destroy(self) -> StoreResult<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_dir_all(&path)?;
        info!("Removed LMDB environment at: {}", path.display());
        Ok(())
    }
}

impl KeyValueStore for LmdbStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let txn = self.env.begin_ro_txn()?;

        let value = match txn.get(self.db, &key) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StoreError::CorruptState(format!("slot '{key}' is not UTF-8: {e}"))
                })?;
                Some(text)
            }
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        txn.abort();
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut txn = self.env.begin_rw_txn()?;

        if let Err(e) = txn.put(self.db, &key, &value, WriteFlags::empty()) {
            warn!("LMDB write to '{key}' failed: {e}");
            txn.abort();
            return Err(e.into());
        }

        txn.commit()?;
        debug!("LMDB slot '{key}' written ({} bytes)", value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut txn = self.env.begin_rw_txn()?;

        match txn.del(self.db, &key, None) {
            Ok(()) => {
                txn.commit()?;
                Ok(true)
            }
            Err(lmdb::Error::NotFound) => {
                txn.abort();
                Ok(false)
            }
            Err(e) => {
                txn.abort();
                Err(e.into())
            }
        }
    }
}

#[derive(Default)]
struct MemoryInner {
    slots: HashMap<String, String>,
    quota: Option<usize>,
    disabled: bool,
}

impl MemoryInner {
    fn used_bytes_with(&self, key: &str, value: &str) -> usize {
        let others: usize = self
            .slots
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        others + key.len() + value.len()
    }
}

/// In-process storage.
///
/// Clones share the same map, the way two views of one origin share a
/// `localStorage`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once keys plus values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        let store = Self::new();
        store.inner.borrow_mut().quota = Some(bytes);
        store
    }

    /// Makes every subsequent access fail, like storage disabled by the user.
    pub fn disable(&self) {
        self.inner.borrow_mut().disabled = true;
    }

    pub fn enable(&self) {
        self.inner.borrow_mut().disabled = false;
    }

    pub fn set_quota(&self, bytes: Option<usize>) {
        self.inner.borrow_mut().quota = bytes;
    }

    fn check_enabled(&self) -> StoreResult<()> {
        if self.inner.borrow().disabled {
            return Err(StoreError::StorageUnavailable("storage is disabled".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_enabled()?;
        Ok(self.inner.borrow().slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_enabled()?;
        let mut inner = self.inner.borrow_mut();

        if let Some(quota) = inner.quota {
            let needed = inner.used_bytes_with(key, value);
            if needed > quota {
                return Err(StoreError::StorageUnavailable(format!(
                    "quota exceeded ({needed} > {quota} bytes)"
                )));
            }
        }

        inner.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        self.check_enabled()?;
        Ok(self.inner.borrow_mut().slots.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_memory_store_clones_share_slots() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_memory_store_quota_keeps_previous_value() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();
        let err = store.set("k", "1234567890").unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn test_memory_store_disabled() {
        let store = MemoryStore::new();
        store.disable();
        assert!(matches!(store.get("k"), Err(StoreError::StorageUnavailable(_))));
        assert!(matches!(store.set("k", "v"), Err(StoreError::StorageUnavailable(_))));
        store.enable();
        assert!(store.set("k", "v").is_ok());
    }

    #[test]
    fn test_memory_store_quota_can_be_lifted() {
        let store = MemoryStore::with_quota(4);
        assert!(matches!(store.set("k", "value"), Err(StoreError::StorageUnavailable(_))));

        store.set_quota(None);
        store.set("k", "value").unwrap();

        store.set_quota(Some(6));
        assert!(store.set("k", "longer value").is_err());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("value"));
    }
}

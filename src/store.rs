// Key-value record store
//
// Each collection is an in-memory map guarded by an async RwLock. When the
// store is opened on a directory, the collection is loaded from and written
// through to `<name>.json` (a JSON array of records). A write holds the
// collection while it persists; reads that must not hang wait at most
// `READ_TIMEOUT` for it.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

/// How long `try_list` waits for a writer before giving up
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised while loading or persisting a collection
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on collection '{collection}': {source}")]
    Io {
        collection: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt data in collection '{collection}': {source}")]
    Corrupt {
        collection: String,
        #[source]
        source: serde_json::Error,
    },

    /// The collection could not be read within the read timeout
    #[error("Collection '{0}' is unavailable")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A record that can live in a `JsonStore`
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique key of the record within its collection
    fn key(&self) -> String;
}

/// A named collection of records keyed by `Record::key`
pub struct JsonStore<T: Record> {
    name: String,
    path: Option<PathBuf>,
    records: RwLock<BTreeMap<String, T>>,
    read_timeout: Duration,
}

impl<T: Record> JsonStore<T> {
    /// Create an empty collection that lives only in memory
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            records: RwLock::new(BTreeMap::new()),
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Open a collection backed by `<dir>/<name>.json`
    ///
    /// A missing file is an empty collection. A file that does not parse is
    /// an error, never silently discarded.
    pub async fn open(dir: &Path, name: &str) -> StoreResult<Self> {
        let path = dir.join(format!("{}.json", name));

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<T> =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                        collection: name.to_string(),
                        source,
                    })?;
                list.into_iter().map(|r| (r.key(), r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    collection: name.to_string(),
                    source,
                })
            }
        };

        tracing::debug!(collection = name, count = records.len(), "Loaded collection");

        Ok(Self {
            name: name.to_string(),
            path: Some(path),
            records: RwLock::new(records),
            read_timeout: READ_TIMEOUT,
        })
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.records.read().await.get(key).cloned()
    }

    pub async fn list(&self) -> Vec<T> {
        self.records.read().await.values().cloned().collect()
    }

    /// Like `list`, but fails with `Unavailable` instead of waiting on a
    /// stuck writer
    pub async fn try_list(&self) -> StoreResult<Vec<T>> {
        match tokio::time::timeout(self.read_timeout, self.records.read()).await {
            Ok(records) => Ok(records.values().cloned().collect()),
            Err(_) => {
                tracing::warn!(
                    collection = %self.name,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Timed out waiting to read collection"
                );
                Err(StoreError::Unavailable(self.name.clone()))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Hold the collection as a writer would, for tests of the read timeout
    #[cfg(test)]
    pub(crate) async fn hold_write(&self) -> tokio::sync::RwLockWriteGuard<'_, BTreeMap<String, T>> {
        self.records.write().await
    }

    /// Insert or replace a record, persisting the collection
    pub async fn put(&self, record: T) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let key = record.key();
        let previous = records.insert(key.clone(), record);

        if let Err(e) = self.persist(&records).await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => records.insert(key, old),
                None => records.remove(&key),
            };
            return Err(e);
        }

        Ok(())
    }

    /// Remove a record, returning it if it existed
    pub async fn remove(&self, key: &str) -> StoreResult<Option<T>> {
        let mut records = self.records.write().await;
        let removed = records.remove(key);

        if let Some(ref record) = removed {
            if let Err(e) = self.persist(&records).await {
                records.insert(key.to_string(), record.clone());
                return Err(e);
            }
        }

        Ok(removed)
    }

    async fn persist(&self, records: &BTreeMap<String, T>) -> StoreResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let list: Vec<&T> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(|source| StoreError::Corrupt {
            collection: self.name.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        let io_err = |source: std::io::Error| StoreError::Io {
            collection: self.name.clone(),
            source,
        };
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;

        Ok(())
    }
}

/// Per-key async mutual exclusion
///
/// Serialises check-then-act sequences (availability check then booking
/// write, balance check then redemption write) for the same key while
/// leaving other keys unblocked. An entry is dropped from the map once its
/// last guard is released and nobody is waiting on it.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn lock(&self, key: &str) -> KeyedLockGuard {
        let entry = {
            let mut locks = lock_map(&self.locks);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        KeyedLockGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(entry.lock_owned().await),
        }
    }
}

/// Exclusive access to one key of a `KeyedLocks`
pub struct KeyedLockGuard {
    key: String,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        // Release before counting, so only the map and any waiters still hold the mutex
        self.guard.take();

        let mut locks = lock_map(&self.locks);
        let idle = locks
            .get(&self.key)
            .map_or(false, |entry| Arc::strong_count(entry) == 1);
        if idle {
            locks.remove(&self.key);
        }
    }
}

fn lock_map<V>(map: &Mutex<V>) -> MutexGuard<'_, V> {
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

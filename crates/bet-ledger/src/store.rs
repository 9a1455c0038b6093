//! Key/value store backends behind the betting ledger.
//!
//! The ledger speaks to storage through [`KvStore`]: string-named tables
//! of byte keys. Two backends are provided, an in-memory store on DashMap
//! for tests and mempool views, and a sled store with one tree per table
//! for the durable chainstate.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Storage backend failure. Consensus code treats any of these as fatal.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Table-oriented byte key/value storage.
pub trait KvStore: Send + Sync {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    /// Returns whether the key was present.
    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError>;
    fn contains(&self, table: &str, key: &[u8]) -> Result<bool, StoreError>;
    /// Key-ordered scan of every pair whose key starts with `prefix`.
    fn scan_prefix(&self, table: &str, prefix: &[u8])
        -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// In-memory store: a DashMap of table name to ordered key map.
///
/// DashMap gives fine-grained per-table locking; the inner map is ordered
/// so prefix scans come back in key order like the sled backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .tables
            .get(table)
            .and_then(|t| t.get(key).cloned()))
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .get_mut(table)
            .map(|mut t| t.remove(key).is_some())
            .unwrap_or(false))
    }

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.contains_key(key))
            .unwrap_or(false))
    }

    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let Some(t) = self.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(t.range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Durable store on sled, one tree per table.
pub struct SledStore {
    db: sled::Db,
    trees: DashMap<String, sled::Tree>,
}

impl SledStore {
    /// Open or create the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        tracing::info!("Opened betting ledger store at {:?}", path.as_ref());
        Ok(Self {
            db,
            trees: DashMap::new(),
        })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, StoreError> {
        if let Some(tree) = self.trees.get(name) {
            return Ok(tree.clone());
        }
        let tree = self.db.open_tree(name)?;
        self.trees.insert(name.to_string(), tree.clone());
        Ok(tree)
    }

    /// Flush sled to disk. Called on shutdown.
    pub fn sync(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree(table)?.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.tree(table)?.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.tree(table)?.remove(key)?.is_some())
    }

    fn contains(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.tree(table)?.contains_key(key)?)
    }

    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        for item in self.tree(table)?.scan_prefix(prefix) {
            let (k, v) = item?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store(store: &dyn KvStore) {
        assert!(store.get("events", b"k1").unwrap().is_none());
        store.put("events", b"k1", b"v1").unwrap();
        store.put("events", b"k2", b"v2").unwrap();
        assert_eq!(store.get("events", b"k1").unwrap(), Some(b"v1".to_vec()));
        assert!(store.contains("events", b"k2").unwrap());

        // Tables are independent namespaces.
        assert!(!store.contains("results", b"k1").unwrap());

        assert!(store.delete("events", b"k1").unwrap());
        assert!(!store.delete("events", b"k1").unwrap());
        assert!(store.get("events", b"k1").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_basics() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_prefix_scan_is_ordered() {
        let store = MemoryStore::new();
        store.put("bets", &[0, 0, 0, 2, 9], b"b").unwrap();
        store.put("bets", &[0, 0, 0, 1, 7], b"a").unwrap();
        store.put("bets", &[0, 0, 0, 1, 3], b"c").unwrap();
        store.put("bets", &[0, 0, 0, 9, 0], b"d").unwrap();

        let hits = store.scan_prefix("bets", &[0, 0, 0, 1]).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, vec![0, 0, 0, 1, 3]);
        assert_eq!(hits[1].0, vec![0, 0, 0, 1, 7]);
    }

    #[test]
    fn test_sled_store_basics_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            exercise_store(&store);
            store.put("events", b"persisted", b"yes").unwrap();
            store.sync().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("events", b"persisted").unwrap(),
            Some(b"yes".to_vec())
        );
    }

    #[test]
    fn test_sled_store_prefix_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.put("payouts", &[0, 5, 1], b"x").unwrap();
        store.put("payouts", &[0, 5, 2], b"y").unwrap();
        store.put("payouts", &[0, 6, 1], b"z").unwrap();
        let hits = store.scan_prefix("payouts", &[0, 5]).unwrap();
        assert_eq!(hits.len(), 2);
    }
}

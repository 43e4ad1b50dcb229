//! In-process state store

use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::core::error::{FleetError, Result};
use crate::store::{resolve_range, StateStore, StoreBatch};

#[derive(Debug, Default)]
struct Keyspace {
    records: AHashMap<String, String>,
    lists: AHashMap<String, Vec<String>>,
}

impl Keyspace {
    fn apply(&mut self, batch: StoreBatch) {
        self.records.extend(batch.records);
        self.lists.extend(batch.lists);
        for (key, value) in batch.appends {
            self.lists.entry(key).or_default().push(value);
        }
    }
}

/// `RwLock`-guarded maps; readers never wait on each other
#[derive(Debug)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the backing connection
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FleetError::StoreUnavailable("memory store offline".into()))
        }
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.keyspace.read().records.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.check()?;
        self.keyspace.write().records.insert(key.to_string(), value);
        Ok(())
    }

    fn push(&self, key: &str, value: String) -> Result<()> {
        self.check()?;
        self.keyspace
            .write()
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.check()?;
        let keyspace = self.keyspace.read();
        let Some(list) = keyspace.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((lo, hi)) => list[lo..=hi].to_vec(),
            None => Vec::new(),
        })
    }

    fn len(&self, key: &str) -> Result<usize> {
        self.check()?;
        Ok(self.keyspace.read().lists.get(key).map_or(0, Vec::len))
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.check()?;
        let mut keys: Vec<String> = self
            .keyspace
            .read()
            .records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn commit(&self, batch: StoreBatch) -> Result<()> {
        self.check()?;
        self.keyspace.write().apply(batch);
        Ok(())
    }

    fn replace_all(&self, batch: StoreBatch) -> Result<()> {
        self.check()?;
        let mut fresh = Keyspace::default();
        fresh.apply(batch);
        *self.keyspace.write() = fresh;
        Ok(())
    }
}

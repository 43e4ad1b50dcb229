//! Shared state store
//!
//! The engine publishes everything a presentation layer reads through a
//! small key-value interface: string records under keys, plus append-only
//! string lists. [`MemoryStore`] is the in-process implementation and
//! [`FleetStore`] layers the fleet's typed records and key layout on top.

pub mod memory;
pub mod records;

pub use memory::MemoryStore;
pub use records::FleetStore;

use crate::core::error::Result;

/// Writes applied together by [`StateStore::commit`] or [`StateStore::replace_all`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreBatch {
    pub records: Vec<(String, String)>,
    /// Whole-list replacements
    pub lists: Vec<(String, Vec<String>)>,
    /// Single values pushed onto the end of a list, in order
    pub appends: Vec<(String, String)>,
}

impl StoreBatch {
    pub fn record(&mut self, key: impl Into<String>, value: String) {
        self.records.push((key.into(), value));
    }

    pub fn list(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.lists.push((key.into(), values));
    }

    pub fn append(&mut self, key: impl Into<String>, value: String) {
        self.appends.push((key.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.lists.is_empty() && self.appends.is_empty()
    }
}

/// Key-value store with per-key atomicity
///
/// Every method may fail with `FleetError::StoreUnavailable`; callers never
/// see stale or default data in its place.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: String) -> Result<()>;

    /// Append to the list at `key`, creating it if missing
    fn push(&self, key: &str, value: String) -> Result<()>;

    /// Inclusive range with negative indices counting from the end
    fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    fn len(&self, key: &str) -> Result<usize>;

    /// Record keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Apply `batch` on top of the current keyspace, all of it or none of it
    fn commit(&self, batch: StoreBatch) -> Result<()>;

    /// Drop every record and list, then write `batch`, as one step
    fn replace_all(&self, batch: StoreBatch) -> Result<()>;
}

/// Resolve list range bounds the way Redis `LRANGE` does
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

//! # Memtable
//!
//! The in-memory write buffer that sits in front of the SSTable builder.
//!
//! Live writes land here first, in a sorted structure (`BTreeMap`). When the
//! buffer grows past a caller-chosen size it is handed to the SSTable layer,
//! which only ever iterates it in ascending key order.
//!
//! ## Key properties
//! - **Sorted order**: [`Memtable::iter`] yields keys in strictly ascending
//!   order, which is exactly the contract the table builder enforces.
//! - **Last write wins**: `put` on an existing key replaces its value.
//! - **Approximate size tracking**: key + value bytes plus a fixed per-entry
//!   overhead, used for flush threshold decisions.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let mut m = Memtable::new();
//! m.put(b"hello".to_vec(), b"world".to_vec());
//! assert_eq!(m.get(b"hello"), Some(b"world".as_slice()));
//! ```

use std::collections::BTreeMap;

/// Estimated bookkeeping cost of one map node, counted per entry.
pub const ENTRY_OVERHEAD: usize = 64;

/// An ordered, in-memory key/value buffer backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    approx_size: usize,
}

impl Memtable {
    /// Creates a new, empty memtable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value stored under `key`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let key_len = key.len();
        let value_len = value.len();
        match self.map.insert(key, value) {
            Some(old) => {
                // key bytes and overhead were counted on first insert
                self.approx_size = self.approx_size.saturating_sub(old.len());
            }
            None => {
                self.approx_size = self
                    .approx_size
                    .saturating_add(key_len)
                    .saturating_add(ENTRY_OVERHEAD);
            }
        }
        self.approx_size = self.approx_size.saturating_add(value_len);
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    /// Returns an iterator over all entries in **ascending key order**.
    ///
    /// This ordering is what makes the memtable a valid source for
    /// `sstable::TableBuilder::add`.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the memtable contains zero entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the approximate byte footprint of the buffered entries.
    ///
    /// Counts key and value bytes plus [`ENTRY_OVERHEAD`] per entry. Allocator
    /// slack is not tracked.
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Removes all entries and resets `approx_size` to zero.
    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }
}

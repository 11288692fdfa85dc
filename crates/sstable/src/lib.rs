//! # SSTable — Sorted String Table
//!
//! Immutable, block-structured on-disk tables: the persistence building
//! block under a log-structured merge engine.
//!
//! A [`TableBuilder`] streams ascending key/value pairs into size-bounded
//! data blocks, then writes a sparse index (one entry per block, keyed by
//! the block's last key) and a fixed footer. A [`TableReader`] loads only the
//! footer and the index, then answers each point lookup with one index
//! search and one block read.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ DATA BLOCKS (each <= block_size, ascending)   │
//! │                                               │
//! │ key_len (u32) | key | val_len (u32) | val     │
//! │ ... repeated, no padding ...                  │
//! ├───────────────────────────────────────────────┤
//! │ INDEX BLOCK (one record per data block)       │
//! │                                               │
//! │ key_len (u32) | last_key | 12 (u32) |         │
//! │ block_offset (u64) | block_size (u32)         │
//! ├───────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                 │
//! │                                               │
//! │ index_offset (u64) | index_size (u32) |       │
//! │ magic (u64) 0xDEAD_BEEF_CAFE_F00D             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.
//!
//! ## Example
//! ```rust
//! use sstable::{TableBuilder, TableOptions, TableReader};
//!
//! # fn main() -> sstable::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("example.sst");
//!
//! let mut builder = TableBuilder::create(&path, TableOptions::default())?;
//! builder.add(b"apple", b"red")?;
//! builder.add(b"banana", b"yellow")?;
//! builder.finish()?;
//!
//! let mut reader = TableReader::open(&path)?;
//! assert_eq!(reader.get(b"banana")?.as_deref(), Some(&b"yellow"[..]));
//! assert_eq!(reader.get(b"cherry")?, None);
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
mod flush;
pub mod format;
mod options;
mod reader;

pub use builder::{TableBuilder, TableSummary};
pub use error::{Result, SstError};
pub use flush::write_from_memtable;
pub use format::{BlockHandle, Footer, FOOTER_SIZE, TABLE_MAGIC};
pub use options::{TableOptions, DEFAULT_BLOCK_SIZE};
pub use reader::{TableIter, TableReader};

use std::io;

use thiserror::Error;

/// Everything that can go wrong while building or reading a table.
///
/// A lookup that simply finds nothing is **not** an error; see
/// [`TableReader::get`](crate::TableReader::get).
#[derive(Debug, Error)]
pub enum SstError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u32,
        actual: usize,
    },

    #[error("file too small to hold a footer ({0} bytes)")]
    TooSmall(u64),

    #[error("invalid table magic: {0:#018x}")]
    BadMagic(u64),

    #[error("corrupt table: {0}")]
    Corrupt(&'static str),

    #[error("key is not strictly greater than the previous key")]
    OutOfOrder,

    #[error("length {0} does not fit the u32 record framing")]
    RecordTooLarge(usize),

    #[error("builder is finished or failed; no further writes accepted")]
    BuilderClosed,
}

impl SstError {
    /// Returns `true` for failures that mean the bytes on disk are not a
    /// well-formed table, as opposed to the storage medium failing.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SstError::TooSmall(_) | SstError::BadMagic(_) | SstError::Corrupt(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SstError>;

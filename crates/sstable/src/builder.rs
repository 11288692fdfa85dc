use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, SstError};
use crate::format::{encode_record, record_encoded_size, BlockHandle, Footer, FOOTER_SIZE};
use crate::options::TableOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Building,
    Finished,
    Failed,
}

/// What a successful [`TableBuilder::finish`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSummary {
    pub entries: u64,
    pub data_blocks: usize,
    pub index_handle: BlockHandle,
    pub file_size: u64,
}

/// Streams ascending key/value pairs into a new table file.
///
/// Records are buffered into a data block until the next one would push the
/// block past [`TableOptions::block_size`]; the full block is then appended to
/// the file and its last key recorded in the sparse index. [`finish`] writes
/// the index block and the footer.
///
/// # Ordering
///
/// Every key must be strictly greater than the one before it, whether or not
/// a block boundary lies in between. Violations return
/// [`SstError::OutOfOrder`] and leave the builder untouched.
///
/// # Lifecycle
///
/// A builder is single use. After `finish` (or after any failed write) every
/// call returns [`SstError::BuilderClosed`]. Dropping a builder that was never
/// finished closes the file but leaves it without an index or footer; readers
/// will reject it.
///
/// [`finish`]: TableBuilder::finish
pub struct TableBuilder {
    path: PathBuf,
    file: BufWriter<File>,
    options: TableOptions,
    state: BuildState,
    /// Bytes handed to the file so far.
    offset: u64,
    block: Vec<u8>,
    block_offset: u64,
    last_key: Option<Vec<u8>>,
    index: Vec<(Vec<u8>, BlockHandle)>,
    entries: u64,
}

impl TableBuilder {
    /// Creates (or truncates) the table file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SstError::Io`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, options: TableOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: BufWriter::new(file),
            options,
            state: BuildState::Building,
            offset: 0,
            block: Vec::new(),
            block_offset: 0,
            last_key: None,
            index: Vec::new(),
            entries: 0,
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// - [`SstError::BuilderClosed`] after `finish` or a previous I/O failure.
    /// - [`SstError::OutOfOrder`] if `key` does not sort after the last key.
    /// - [`SstError::RecordTooLarge`] if a length overflows the u32 framing.
    /// - [`SstError::Io`] if flushing a full block fails; the builder is then
    ///   closed.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_building()?;
        let result = self.add_record(key, value);
        if let Err(SstError::Io(_)) = result {
            self.state = BuildState::Failed;
        }
        result
    }

    fn add_record(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(SstError::OutOfOrder);
            }
        }

        let entry_size = record_encoded_size(key, value);
        if !self.block.is_empty() && self.block.len() + entry_size > self.options.block_size {
            self.flush_data_block()?;
        }
        if self.block.len() + entry_size > u32::MAX as usize {
            return Err(SstError::RecordTooLarge(entry_size));
        }

        if self.block.is_empty() {
            self.block_offset = self.offset;
        }
        encode_record(&mut self.block, key, value)?;

        match &mut self.last_key {
            Some(last) => {
                last.clear();
                last.extend_from_slice(key);
            }
            None => self.last_key = Some(key.to_vec()),
        }
        self.entries += 1;
        Ok(())
    }

    /// Writes the pending data block (if any) and records its index entry.
    fn flush_data_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let Some(last_key) = self.last_key.clone() else {
            return Err(SstError::Corrupt("data block without a last key"));
        };

        let size = u32::try_from(self.block.len())
            .map_err(|_| SstError::RecordTooLarge(self.block.len()))?;
        self.file.write_all(&self.block)?;

        let handle = BlockHandle::new(self.block_offset, size);
        self.offset = handle.end();
        debug!(
            offset = handle.offset,
            size = handle.size,
            last_key_len = last_key.len(),
            "flushed data block"
        );

        self.index.push((last_key, handle));
        self.block.clear();
        Ok(())
    }

    /// Flushes the last data block, writes the index block and the footer.
    ///
    /// # File Layout
    ///
    /// ```text
    /// [DATA]   blocks of records: key_len(u32) | key | val_len(u32) | val
    /// [INDEX]  records: block_last_key -> BlockHandle(offset u64, size u32)
    /// [FOOTER] index_handle(12B) | magic(u64)
    /// ```
    ///
    /// No rollback happens if a write fails halfway; the file is left
    /// truncated. Use [`write_from_memtable`](crate::write_from_memtable) for
    /// an atomic temp-file-and-rename build.
    pub fn finish(&mut self) -> Result<TableSummary> {
        self.ensure_building()?;
        let result = self.write_index_and_footer();
        self.state = match result {
            Ok(_) => BuildState::Finished,
            Err(_) => BuildState::Failed,
        };
        result
    }

    fn write_index_and_footer(&mut self) -> Result<TableSummary> {
        self.flush_data_block()?;

        let mut index_block = Vec::new();
        for (last_key, handle) in &self.index {
            encode_record(&mut index_block, last_key, &handle.encode())?;
        }
        let index_size = u32::try_from(index_block.len())
            .map_err(|_| SstError::RecordTooLarge(index_block.len()))?;
        let index_handle = BlockHandle::new(self.offset, index_size);
        self.file.write_all(&index_block)?;
        self.offset = index_handle.end();

        self.file.write_all(&Footer::new(index_handle).encode())?;
        self.offset += FOOTER_SIZE as u64;

        self.file.flush()?;
        if self.options.sync {
            self.file.get_ref().sync_all()?;
        }

        let summary = TableSummary {
            entries: self.entries,
            data_blocks: self.index.len(),
            index_handle,
            file_size: self.offset,
        };
        info!(
            path = %self.path.display(),
            entries = summary.entries,
            data_blocks = summary.data_blocks,
            file_size = summary.file_size,
            "finished table"
        );
        Ok(summary)
    }

    fn ensure_building(&self) -> Result<()> {
        match self.state {
            BuildState::Building => Ok(()),
            BuildState::Finished | BuildState::Failed => Err(SstError::BuilderClosed),
        }
    }

    /// Number of records accepted so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Number of data blocks already written to the file.
    pub fn data_blocks(&self) -> usize {
        self.index.len()
    }

    /// Bytes written to the file so far; excludes the pending block.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TableBuilder {
    fn drop(&mut self) {
        if self.state == BuildState::Building {
            warn!(
                path = %self.path.display(),
                "table builder dropped before finish; file has no footer"
            );
        }
    }
}

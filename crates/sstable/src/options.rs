/// Default data-block threshold in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Build-time settings for a [`TableBuilder`](crate::TableBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// Upper bound on the encoded size of one data block. A single record
    /// larger than this still gets a block of its own.
    pub block_size: usize,

    /// If `true`, `finish` calls `sync_all` on the file before returning.
    pub sync: bool,
}

impl TableOptions {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sync: true,
        }
    }
}

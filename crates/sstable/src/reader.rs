use std::cmp::Ordering;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, SstError};
use crate::format::{decode_record, BlockHandle, Footer, BLOCK_HANDLE_SIZE, FOOTER_SIZE};

/// Reads a table file for point lookups.
///
/// On [`open`](TableReader::open) the footer and the whole **index block**
/// are loaded into memory as a `BTreeMap<Vec<u8>, BlockHandle>` (block last
/// key → block location). After that a lookup is one in-memory search plus
/// exactly one data-block read. Data blocks are never cached.
///
/// The reader owns its file handle and moves its cursor on every read, so
/// lookups take `&mut self`. Open one reader per thread to read a table
/// concurrently.
pub struct TableReader {
    path: PathBuf,
    file: File,
    file_size: u64,
    footer: Footer,
    index: BTreeMap<Vec<u8>, BlockHandle>,
}

impl TableReader {
    /// Opens a table file and loads its index into memory.
    ///
    /// # Validation
    ///
    /// - The file must be at least [`FOOTER_SIZE`] bytes.
    /// - The footer magic must equal [`TABLE_MAGIC`](crate::TABLE_MAGIC).
    /// - The index block must lie between the start of the file and the footer.
    /// - Every index entry must decode, keys must strictly ascend, and every
    ///   data block must end at or before the index block.
    ///
    /// # Errors
    ///
    /// [`SstError::Io`] if the file cannot be opened or read; a format error
    /// (see [`SstError::is_corruption`]) if any check above fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(reader) => {
                info!(
                    path = %path.display(),
                    data_blocks = reader.index.len(),
                    file_size = reader.file_size,
                    "loaded table index"
                );
                Ok(reader)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open table");
                Err(e)
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(SstError::TooSmall(file_size));
        }

        let footer_offset = file_size - FOOTER_SIZE as u64;
        let footer_bytes = read_block(
            &mut file,
            BlockHandle::new(footer_offset, FOOTER_SIZE as u32),
        )?;
        let footer = Footer::decode(&footer_bytes)?;

        let index_handle = footer.index_handle;
        if index_handle.checked_end()? > footer_offset {
            return Err(SstError::Corrupt("index block handle out of range"));
        }
        let index_block = read_block(&mut file, index_handle)?;
        let index = decode_index(&index_block, index_handle.offset)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_size,
            footer,
            index,
        })
    }

    /// Point lookup for a single key.
    ///
    /// Returns `Ok(Some(value))` if the key is stored in this table and
    /// `Ok(None)` if it is not. A key above every block's last key is
    /// answered from the index without touching the file.
    ///
    /// # Errors
    ///
    /// [`SstError::Io`] / [`SstError::ShortRead`] if the block cannot be read
    /// in full; [`SstError::Corrupt`] if the block's records do not decode.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // first block whose last key is >= the search key
        let handle = match self
            .index
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
        {
            Some((_, handle)) => *handle,
            None => return Ok(None),
        };

        let block = read_block(&mut self.file, handle)?;
        find_in_block(&block, key)
    }

    /// Forward scan over every record in key order, one data block in memory
    /// at a time.
    pub fn iter(&mut self) -> TableIter<'_> {
        TableIter {
            file: &mut self.file,
            handles: self.index.values(),
            block: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Returns the number of data blocks listed in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the table holds no data blocks.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Last key of each data block, ascending.
    pub fn index_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys().map(Vec::as_slice)
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads exactly `handle.size` bytes at `handle.offset`.
fn read_block(file: &mut File, handle: BlockHandle) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(handle.offset))?;
    let mut buf = Vec::with_capacity(handle.size as usize);
    let actual = file
        .by_ref()
        .take(u64::from(handle.size))
        .read_to_end(&mut buf)?;
    if actual != handle.size as usize {
        return Err(SstError::ShortRead {
            offset: handle.offset,
            expected: handle.size,
            actual,
        });
    }
    Ok(buf)
}

fn decode_index(block: &[u8], index_offset: u64) -> Result<BTreeMap<Vec<u8>, BlockHandle>> {
    let mut index = BTreeMap::new();
    let mut input = block;
    let mut prev: Option<&[u8]> = None;

    while !input.is_empty() {
        let (last_key, mut handle_bytes) = decode_record(&mut input)?;
        if handle_bytes.len() != BLOCK_HANDLE_SIZE {
            return Err(SstError::Corrupt("index entry is not a block handle"));
        }
        let handle = BlockHandle::decode_from(&mut handle_bytes)?;
        if handle.checked_end()? > index_offset {
            return Err(SstError::Corrupt("data block overlaps index block"));
        }
        if prev.is_some_and(|p| p >= last_key) {
            return Err(SstError::Corrupt("index keys out of order"));
        }
        prev = Some(last_key);
        index.insert(last_key.to_vec(), handle);
    }
    Ok(index)
}

/// Scans an ascending block, stopping at the first key past `key`.
fn find_in_block(block: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut input = block;
    while !input.is_empty() {
        let (k, v) = decode_record(&mut input)?;
        match k.cmp(key) {
            Ordering::Less => continue,
            Ordering::Equal => return Ok(Some(v.to_vec())),
            Ordering::Greater => return Ok(None),
        }
    }
    Ok(None)
}

/// Iterator returned by [`TableReader::iter`].
///
/// Yields `(key, value)` pairs in ascending key order. After the first error
/// the iterator is exhausted.
pub struct TableIter<'a> {
    file: &'a mut File,
    handles: btree_map::Values<'a, Vec<u8>, BlockHandle>,
    block: Vec<u8>,
    pos: usize,
    done: bool,
}

impl Iterator for TableIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.pos < self.block.len() {
                let mut input = &self.block[self.pos..];
                return match decode_record(&mut input) {
                    Ok((k, v)) => {
                        let item = (k.to_vec(), v.to_vec());
                        self.pos = self.block.len() - input.len();
                        Some(Ok(item))
                    }
                    Err(e) => {
                        self.done = true;
                        Some(Err(e))
                    }
                };
            }

            let Some(handle) = self.handles.next() else {
                self.done = true;
                return None;
            };
            match read_block(self.file, *handle) {
                Ok(block) => {
                    self.block = block;
                    self.pos = 0;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_record;
    use crate::{TableBuilder, TableOptions};
    use anyhow::Result;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    fn build<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        path: &Path,
        block_size: usize,
        pairs: &[(K, V)],
    ) -> Result<()> {
        let opts = TableOptions::default()
            .with_block_size(block_size)
            .with_sync(false);
        let mut b = TableBuilder::create(path, opts)?;
        for (k, v) in pairs {
            b.add(k.as_ref(), v.as_ref())?;
        }
        b.finish()?;
        Ok(())
    }

    fn sample() -> Vec<(&'static str, &'static str)> {
        vec![
            ("apple", "red"),
            ("banana", "yellow"),
            ("cherry", ""),
            ("grape", "purple"),
            ("lemon", "sour"),
            ("mango", "orange"),
        ]
    }

    // -------------------- Basic open & get --------------------

    #[test]
    fn open_and_get_entries() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.sst");
        build(&path, 32, &sample())?;

        let mut reader = TableReader::open(&path)?;
        assert!(reader.len() > 1);
        for (k, v) in sample() {
            assert_eq!(reader.get(k.as_bytes())?.as_deref(), Some(v.as_bytes()));
        }
        Ok(())
    }

    #[test]
    fn missing_keys_are_not_found() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("missing.sst");
        build(&path, 32, &sample())?;

        let mut reader = TableReader::open(&path)?;
        assert_eq!(reader.get(b"")?, None);
        assert_eq!(reader.get(b"aardvark")?, None);
        assert_eq!(reader.get(b"blueberry")?, None);
        assert_eq!(reader.get(b"lemonade")?, None);
        assert_eq!(reader.get(b"zucchini")?, None);
        Ok(())
    }

    #[test]
    fn index_keys_are_block_last_keys() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keys.sst");
        build(&path, 1, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")])?;

        let reader = TableReader::open(&path)?;
        let keys: Vec<&[u8]> = reader.index_keys().collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b".as_slice(), b"c".as_slice()]);
        assert_eq!(reader.footer().index_handle.offset, 30);
        Ok(())
    }

    #[test]
    fn empty_table_answers_not_found() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.sst");
        build::<&str, &str>(&path, 128, &[])?;

        let mut reader = TableReader::open(&path)?;
        assert!(reader.is_empty());
        assert_eq!(reader.get(b"anything")?, None);
        assert_eq!(reader.iter().count(), 0);
        Ok(())
    }

    // -------------------- Scan --------------------

    #[test]
    fn iter_yields_every_record_in_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("scan.sst");
        build(&path, 32, &sample())?;

        let mut reader = TableReader::open(&path)?;
        let all: Vec<(Vec<u8>, Vec<u8>)> = reader.iter().collect::<crate::Result<_>>()?;
        let expected: Vec<(Vec<u8>, Vec<u8>)> = sample()
            .into_iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        assert_eq!(all, expected);

        // lookups still work after a scan moved the cursor
        assert_eq!(reader.get(b"apple")?.as_deref(), Some(&b"red"[..]));
        Ok(())
    }

    // -------------------- Validation errors --------------------

    #[test]
    fn open_file_too_small() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.sst");
        std::fs::write(&path, b"short").unwrap();

        assert!(matches!(TableReader::open(&path), Err(SstError::TooSmall(5))));
    }

    #[test]
    fn open_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badmagic.sst");
        std::fs::write(&path, [0u8; FOOTER_SIZE]).unwrap();

        assert!(matches!(TableReader::open(&path), Err(SstError::BadMagic(0))));
    }

    #[test]
    fn open_nonexistent_file() {
        let dir = tempdir().unwrap();
        let result = TableReader::open(dir.path().join("no_such_file.sst"));
        assert!(matches!(result, Err(SstError::Io(_))));
    }

    #[test]
    fn open_index_handle_past_footer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("range.sst");
        let footer = Footer::new(BlockHandle::new(0, 100));
        std::fs::write(&path, footer.encode()).unwrap();

        let err = TableReader::open(&path).err().unwrap();
        assert!(err.is_corruption());
    }

    #[test]
    fn open_data_handle_past_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overlap.sst");

        let mut bytes = Vec::new();
        encode_record(&mut bytes, b"k", &BlockHandle::new(50, 10).encode()).unwrap();
        let footer = Footer::new(BlockHandle::new(0, bytes.len() as u32));
        bytes.extend_from_slice(&footer.encode());
        std::fs::write(&path, bytes).unwrap();

        let err = TableReader::open(&path).err().unwrap();
        assert!(err.is_corruption());
    }

    #[test]
    fn open_truncated_index_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badindex.sst");

        let mut bytes = vec![0xFF, 0xFF, 0x00, 0x00, b'k'];
        let footer = Footer::new(BlockHandle::new(0, bytes.len() as u32));
        bytes.extend_from_slice(&footer.encode());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(TableReader::open(&path), Err(SstError::Corrupt(_))));
    }

    #[test]
    fn open_index_entry_with_wrong_value_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shortvalue.sst");

        let mut bytes = Vec::new();
        encode_record(&mut bytes, b"k", &BlockHandle::new(0, 0).encode()[..8]).unwrap();
        let footer = Footer::new(BlockHandle::new(0, bytes.len() as u32));
        bytes.extend_from_slice(&footer.encode());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            TableReader::open(&path),
            Err(SstError::Corrupt("index entry is not a block handle"))
        ));
    }

    #[test]
    fn open_index_keys_out_of_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unordered.sst");

        let mut bytes = Vec::new();
        encode_record(&mut bytes, b"b", &BlockHandle::new(0, 0).encode()).unwrap();
        encode_record(&mut bytes, b"a", &BlockHandle::new(0, 0).encode()).unwrap();
        let footer = Footer::new(BlockHandle::new(0, bytes.len() as u32));
        bytes.extend_from_slice(&footer.encode());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            TableReader::open(&path),
            Err(SstError::Corrupt("index keys out of order"))
        ));
    }

    #[test]
    fn open_footer_handle_that_wraps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrapfooter.sst");
        let footer = Footer::new(BlockHandle::new(u64::MAX, 1));
        std::fs::write(&path, footer.encode()).unwrap();

        assert!(matches!(
            TableReader::open(&path),
            Err(SstError::Corrupt("block handle overflows"))
        ));
    }

    #[test]
    fn open_index_entry_handle_that_wraps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrapindex.sst");

        let mut bytes = Vec::new();
        encode_record(&mut bytes, b"k", &BlockHandle::new(u64::MAX, 5).encode()).unwrap();
        let footer = Footer::new(BlockHandle::new(0, bytes.len() as u32));
        bytes.extend_from_slice(&footer.encode());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            TableReader::open(&path),
            Err(SstError::Corrupt("block handle overflows"))
        ));
    }

    // -------------------- Lookup failures --------------------

    #[test]
    fn corrupt_data_block_is_not_reported_as_missing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("corrupt.sst");
        build(&path, 1, &[(b"a", b"1"), (b"b", b"2")])?;

        // blow up the first record's key length
        let mut f = OpenOptions::new().write(true).open(&path)?;
        f.write_all(&[0xFF, 0xFF, 0xFF, 0x7F])?;
        drop(f);

        let mut reader = TableReader::open(&path)?;
        let err = reader.get(b"a").unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(reader.get(b"b")?.as_deref(), Some(&b"2"[..]));
        Ok(())
    }

    #[test]
    fn truncated_file_after_open_is_short_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shrunk.sst");
        build(&path, 1, &[(b"a", b"1"), (b"b", b"2")])?;

        let mut reader = TableReader::open(&path)?;
        OpenOptions::new().write(true).open(&path)?.set_len(15)?;

        assert!(matches!(
            reader.get(b"b"),
            Err(SstError::ShortRead { offset: 10, expected: 10, actual: 5 })
        ));
        Ok(())
    }
}

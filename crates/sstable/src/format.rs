//! SSTable binary format: block handles, the footer and record framing.
//!
//! Nothing in here touches a file; every function is a pure transform over
//! byte buffers. All integers are little-endian.
//!
//! ```text
//! BlockHandle := offset(u64) | size(u32)                      12 bytes
//! Footer      := index_handle(BlockHandle) | magic(u64)       20 bytes
//! Record      := key_len(u32) | key | val_len(u32) | val
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, SstError};

/// Magic number identifying this table format.
pub const TABLE_MAGIC: u64 = 0xDEAD_BEEF_CAFE_F00D;

/// Encoded size of a [`BlockHandle`]: 8 (`offset`) + 4 (`size`).
pub const BLOCK_HANDLE_SIZE: usize = 8 + 4;

/// Encoded size of the [`Footer`]: handle + 8 (`magic`).
pub const FOOTER_SIZE: usize = BLOCK_HANDLE_SIZE + 8;

/// Size of each of the two length prefixes in a record.
pub const RECORD_HEADER_SIZE: usize = 4;

/// Locates one block inside the table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u32,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// First byte past the end of the block.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }

    /// Like [`end`](Self::end), for handles decoded from a file; a handle
    /// whose range wraps past `u64::MAX` is corrupt.
    pub fn checked_end(&self) -> Result<u64> {
        self.offset
            .checked_add(u64::from(self.size))
            .ok_or(SstError::Corrupt("block handle overflows"))
    }

    pub fn encode(&self) -> [u8; BLOCK_HANDLE_SIZE] {
        let mut buf = [0u8; BLOCK_HANDLE_SIZE];
        LittleEndian::write_u64(&mut buf[..8], self.offset);
        LittleEndian::write_u32(&mut buf[8..], self.size);
        buf
    }

    /// Decodes a handle from the front of `input` and advances it by
    /// [`BLOCK_HANDLE_SIZE`] bytes.
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        if input.len() < BLOCK_HANDLE_SIZE {
            return Err(SstError::Corrupt("truncated block handle"));
        }
        let (head, rest) = input.split_at(BLOCK_HANDLE_SIZE);
        let handle = Self {
            offset: LittleEndian::read_u64(&head[..8]),
            size: LittleEndian::read_u32(&head[8..]),
        };
        *input = rest;
        Ok(handle)
    }
}

/// Fixed-size trailer; always the last [`FOOTER_SIZE`] bytes of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_handle: BlockHandle,
    pub magic: u64,
}

impl Footer {
    pub fn new(index_handle: BlockHandle) -> Self {
        Self {
            index_handle,
            magic: TABLE_MAGIC,
        }
    }

    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[..BLOCK_HANDLE_SIZE].copy_from_slice(&self.index_handle.encode());
        LittleEndian::write_u64(&mut buf[BLOCK_HANDLE_SIZE..], self.magic);
        buf
    }

    /// Decodes a footer from exactly [`FOOTER_SIZE`] bytes.
    ///
    /// The magic is checked before the handle is looked at: with a foreign
    /// magic the handle bytes mean nothing.
    pub fn decode(input: &[u8]) -> Result<Self> {
        if input.len() != FOOTER_SIZE {
            return Err(SstError::Corrupt("footer has wrong length"));
        }
        let magic = LittleEndian::read_u64(&input[BLOCK_HANDLE_SIZE..]);
        if magic != TABLE_MAGIC {
            return Err(SstError::BadMagic(magic));
        }
        let mut handle_bytes = &input[..BLOCK_HANDLE_SIZE];
        let index_handle = BlockHandle::decode_from(&mut handle_bytes)?;
        Ok(Self {
            index_handle,
            magic,
        })
    }
}

/// Exact number of bytes [`encode_record`] appends for this pair.
pub fn record_encoded_size(key: &[u8], value: &[u8]) -> usize {
    RECORD_HEADER_SIZE + key.len() + RECORD_HEADER_SIZE + value.len()
}

fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| SstError::RecordTooLarge(len))
}

fn put_u32(dst: &mut Vec<u8>, v: u32) {
    let mut buf = [0u8; RECORD_HEADER_SIZE];
    LittleEndian::write_u32(&mut buf, v);
    dst.extend_from_slice(&buf);
}

/// Appends `key_len | key | val_len | value` to `dst`.
///
/// Fails without touching `dst` if either length overflows `u32`.
pub fn encode_record(dst: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<()> {
    let key_len = frame_len(key.len())?;
    let value_len = frame_len(value.len())?;
    dst.reserve(record_encoded_size(key, value));
    put_u32(dst, key_len);
    dst.extend_from_slice(key);
    put_u32(dst, value_len);
    dst.extend_from_slice(value);
    Ok(())
}

fn take_prefixed<'a>(input: &mut &'a [u8]) -> Option<&'a [u8]> {
    if input.len() < RECORD_HEADER_SIZE {
        return None;
    }
    let len = LittleEndian::read_u32(&input[..RECORD_HEADER_SIZE]) as usize;
    let body = &input[RECORD_HEADER_SIZE..];
    if body.len() < len {
        return None;
    }
    let (bytes, rest) = body.split_at(len);
    *input = rest;
    Some(bytes)
}

/// Decodes one record from the front of `input`, borrowing key and value.
///
/// `input` only moves forward when the whole record decoded; on failure it is
/// left where it was and the block must be treated as corrupt.
pub fn decode_record<'a>(input: &mut &'a [u8]) -> Result<(&'a [u8], &'a [u8])> {
    let mut cursor = *input;
    let key = take_prefixed(&mut cursor).ok_or(SstError::Corrupt("malformed record key"))?;
    let value = take_prefixed(&mut cursor).ok_or(SstError::Corrupt("malformed record value"))?;
    *input = cursor;
    Ok((key, value))
}

//! Persisted index of AUX event record positions.
//!
//! While recording, every AUX event record's file offset and size is
//! appended to an [`AuxIndex`]. The index is written once when the capture
//! is finalized and read back on open, so queues can be populated without
//! scanning the whole file.
//!
//! # Format
//!
//! Host byte order, no framing beyond the leading count:
//!
//! ```text
//! u64 count
//! count × { u64 file_offset, u64 size }
//! ```

use crate::error::{Error, Result};
use crate::record::EventHeader;
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Entries per chunk.
pub const INDEX_CHUNK_ENTRIES: usize = 256;

/// Size of one serialized entry.
pub const INDEX_ENTRY_SIZE: u64 = 16;

/// Location of one AUX event record in the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset of the record header.
    pub file_offset: u64,
    /// Record size from its header.
    pub size: u64,
}

impl IndexEntry {
    fn swapped(self) -> Self {
        Self {
            file_offset: self.file_offset.swap_bytes(),
            size: self.size.swap_bytes(),
        }
    }
}

/// A fixed-capacity group of entries.
#[derive(Debug)]
pub struct IndexChunk {
    entries: Vec<IndexEntry>,
}

impl IndexChunk {
    fn new() -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(INDEX_CHUNK_ENTRIES)?;
        Ok(Self { entries })
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= INDEX_CHUNK_ENTRIES
    }

    /// Entries in this chunk.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries in this chunk.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chunk has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append-only list of [`IndexEntry`], stored in chunks.
#[derive(Debug, Default)]
pub struct AuxIndex {
    chunks: Vec<IndexChunk>,
}

impl AuxIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, starting a new chunk when the last one is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if a new chunk cannot be allocated.
    pub fn push(&mut self, entry: IndexEntry) -> Result<()> {
        if self.chunks.last().is_none_or(IndexChunk::is_full) {
            self.chunks.try_reserve(1)?;
            self.chunks.push(IndexChunk::new()?);
        }
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.entries.push(entry);
        }
        Ok(())
    }

    /// Record the AUX event whose header was read at `file_offset`.
    pub fn record_event(&mut self, header: &EventHeader, file_offset: u64) -> Result<()> {
        self.push(IndexEntry {
            file_offset,
            size: u64::from(header.size),
        })
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(IndexChunk::len).sum()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(IndexChunk::is_empty)
    }

    /// Chunks in append order.
    pub fn chunks(&self) -> &[IndexChunk] {
        &self.chunks
    }

    /// All entries in append order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.chunks.iter().flat_map(|chunk| chunk.entries.iter())
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> u64 {
        8 + self.len() as u64 * INDEX_ENTRY_SIZE
    }

    /// Write the count followed by every entry.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u64::<NativeEndian>(self.len() as u64)?;
        for entry in self.iter() {
            writer.write_u64::<NativeEndian>(entry.file_offset)?;
            writer.write_u64::<NativeEndian>(entry.size)?;
        }
        Ok(())
    }

    /// Read an index of at most `size` bytes from `reader`, appending its
    /// entries. Byte-swaps every field when `needs_swap` is set.
    ///
    /// The declared count is checked against `size` before any entry is read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if the count does not fit in `size`,
    /// or an I/O error if the data is truncated.
    pub fn process<R: Read>(&mut self, mut reader: R, size: u64, needs_swap: bool) -> Result<()> {
        let mut count = reader.read_u64::<NativeEndian>()?;
        if needs_swap {
            count = count.swap_bytes();
        }

        let needed = count
            .checked_mul(INDEX_ENTRY_SIZE)
            .and_then(|n| n.checked_add(8))
            .ok_or_else(|| Error::InvalidIndex(format!("entry count {count} overflows")))?;
        if needed > size {
            return Err(Error::InvalidIndex(format!(
                "{count} entries need {needed} bytes, only {size} available"
            )));
        }

        for _ in 0..count {
            let mut entry = IndexEntry {
                file_offset: reader.read_u64::<NativeEndian>()?,
                size: reader.read_u64::<NativeEndian>()?,
            };
            if needs_swap {
                entry = entry.swapped();
            }
            self.push(entry)?;
        }

        tracing::debug!(entries = count, "loaded auxtrace index");
        Ok(())
    }

    /// Read a whole index from `reader`.
    pub fn read_from<R: Read>(reader: R, size: u64, needs_swap: bool) -> Result<Self> {
        let mut index = Self::new();
        index.process(reader, size, needs_swap)?;
        Ok(index)
    }
}

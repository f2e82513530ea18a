//! Whole-capture mapping shared by every buffer of a session.
//!
//! When the capture's data section fits in the address space it is mapped
//! once, and buffers borrow slices of it instead of mapping their own
//! windows. Buffers hold a [`SessionSlice`], which keeps the mapping alive
//! through an `Arc` but offers no way to unmap it.

use super::MappedWindow;
use crate::error::{Error, Result};
use rustix::fd::AsFd;
use std::sync::Arc;

/// One read-only mapping of a capture's data region.
#[derive(Debug)]
pub struct SessionMap {
    window: MappedWindow,
    /// File offset of the first mapped byte.
    file_offset: u64,
}

impl SessionMap {
    /// Map `len` bytes of the capture starting at `file_offset`.
    pub fn map<Fd: AsFd>(fd: Fd, file_offset: u64, len: u64) -> Result<Arc<Self>> {
        let window = MappedWindow::map(fd, file_offset, len)?;
        tracing::debug!(file_offset, len, "mapped capture data section");
        Ok(Arc::new(Self {
            window,
            file_offset,
        }))
    }

    /// File offset of the first mapped byte.
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Number of mapped bytes.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Whether `[file_offset, file_offset + len)` lies inside the mapping.
    pub fn contains(&self, file_offset: u64, len: u64) -> bool {
        file_offset >= self.file_offset
            && file_offset
                .checked_add(len)
                .is_some_and(|end| end <= self.file_offset + self.len() as u64)
    }

    /// Borrow `len` bytes at `file_offset` as a slice handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the range is not fully mapped.
    pub fn slice(self: &Arc<Self>, file_offset: u64, len: u64) -> Result<SessionSlice> {
        if !self.contains(file_offset, len) {
            return Err(Error::OutOfRange(format!(
                "buffer at {file_offset:#x}+{len:#x} outside session mapping"
            )));
        }
        Ok(SessionSlice {
            map: Arc::clone(self),
            start: (file_offset - self.file_offset) as usize,
            len: len as usize,
        })
    }
}

/// A range of a [`SessionMap`] owned by one buffer.
#[derive(Debug, Clone)]
pub struct SessionSlice {
    map: Arc<SessionMap>,
    start: usize,
    len: usize,
}

impl SessionSlice {
    /// The borrowed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.map.window.as_slice()[self.start..self.start + self.len]
    }

    /// The mapping this slice points into.
    pub fn session_map(&self) -> &Arc<SessionMap> {
        &self.map
    }
}

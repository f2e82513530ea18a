//! Read-only, page-aligned mapping of one file region.
//!
//! A [`MappedWindow`] covers an arbitrary byte range `[offset, offset + len)`
//! of a file. `mmap` requires a page-aligned file offset, so the window maps
//! from the page boundary below `offset` and exposes only the requested
//! bytes through [`MappedWindow::as_slice`].
//!
//! # Example
//!
//! ```rust,ignore
//! use auxmux::memory::MappedWindow;
//!
//! let file = std::fs::File::open("perf.data")?;
//! let window = MappedWindow::map(&file, 5000, 128)?;
//! assert_eq!(window.as_slice().len(), 128);
//! // Unmapped on drop.
//! ```

use crate::error::{Error, Result};
use rustix::fd::AsFd;
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;

/// System page size, used to align mapping offsets.
#[inline]
pub fn page_size() -> usize {
    rustix::param::page_size()
}

/// A read-only mapping of a file region, unmapped on drop.
pub struct MappedWindow {
    /// Start of the page-aligned mapping.
    base: NonNull<u8>,
    /// Length of the whole mapping, including the alignment adjustment.
    map_len: usize,
    /// Distance from `base` to the first requested byte.
    adj: usize,
    /// Number of requested bytes.
    len: usize,
}

impl MappedWindow {
    /// Map `len` bytes of `fd` starting at `file_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero, does not fit in the address space,
    /// or the `mmap` call fails.
    pub fn map<Fd: AsFd>(fd: Fd, file_offset: u64, len: u64) -> Result<Self> {
        if len == 0 {
            return Err(Error::OutOfRange("empty mapping window".into()));
        }

        let adj = (file_offset & (page_size() as u64 - 1)) as usize;
        let len = usize::try_from(len).map_err(|_| Error::SizeOverflow(len))?;
        let map_len = len
            .checked_add(adj)
            .ok_or(Error::SizeOverflow(len as u64))?;
        let aligned_offset = file_offset - adj as u64;

        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ,
                MapFlags::SHARED,
                fd,
                aligned_offset,
            )?
        };

        let base = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::Unsupported("mmap returned null".into()))?;

        tracing::trace!(file_offset, len, map_len, "mapped aux window");

        Ok(Self {
            base,
            map_len,
            adj,
            len,
        })
    }

    /// The requested bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is live for the lifetime of `self` and covers
        // `adj + len` readable bytes.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(self.adj), self.len) }
    }

    /// Number of requested bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length windows are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the underlying mapping, including the leading alignment slack.
    pub fn mapped_len(&self) -> usize {
        self.map_len
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = rustix::mm::munmap(self.base.as_ptr().cast(), self.map_len);
        }
    }
}

impl std::fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedWindow")
            .field("map_len", &self.map_len)
            .field("adj", &self.adj)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: MappedWindow is Send + Sync because:
// - The mapping is read-only and owned exclusively by this value
// - Unmapping happens only in Drop
unsafe impl Send for MappedWindow {}
unsafe impl Sync for MappedWindow {}

//! AUX buffer metadata and lazily materialized payload bytes.
//!
//! An [`AuxBuffer`] describes one contiguous chunk of captured AUX payload:
//! where it came from (pid/tid/cpu), where it sits in the AUX ring
//! (`offset`), its ordering key (`reference`) and where its bytes live in the
//! capture file (`data_offset`). The bytes themselves are held in a
//! [`BufferData`] state that is filled on demand and can be released and
//! re-fetched any number of times.
//!
//! # Backing strategies
//!
//! | State | Produced by | Released by |
//! |-------|-------------|-------------|
//! | [`BufferData::Borrowed`] | single session mapping | never (the session owns it) |
//! | [`BufferData::Owned`] | pipe input, copied at admission | [`AuxBuffer::drop_data`] |
//! | [`BufferData::Mapped`] | [`AuxBuffer::get_data`] on a seekable file | [`AuxBuffer::put_data`] |

use crate::error::Result;
use crate::memory::{MappedWindow, SessionSlice};
use rustix::fd::AsFd;

/// Sentinel for "not applicable" pid/tid/cpu values.
pub const NOT_APPLICABLE: i32 = -1;

/// Where a buffer's bytes currently live.
#[derive(Debug, Default)]
pub enum BufferData {
    /// Nothing materialized yet, or released.
    #[default]
    Unmaterialized,
    /// A private mapping of the buffer's file region.
    Mapped(MappedWindow),
    /// A heap copy, made when the input could not be re-read.
    Owned(Box<[u8]>),
    /// A slice of the session-wide mapping. Never unmapped by the buffer.
    Borrowed(SessionSlice),
}

impl BufferData {
    /// Materialized bytes, if any.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            BufferData::Unmaterialized => None,
            BufferData::Mapped(window) => Some(window.as_slice()),
            BufferData::Owned(bytes) => Some(bytes),
            BufferData::Borrowed(slice) => Some(slice.as_slice()),
        }
    }

    /// Whether any bytes are held.
    pub fn is_materialized(&self) -> bool {
        !matches!(self, BufferData::Unmaterialized)
    }
}

/// One contiguous chunk of captured AUX payload.
#[derive(Debug)]
pub struct AuxBuffer {
    /// Process id, or [`NOT_APPLICABLE`].
    pub pid: i32,
    /// Thread id, or [`NOT_APPLICABLE`].
    pub tid: i32,
    /// CPU, or [`NOT_APPLICABLE`] for per-thread capture.
    pub cpu: i32,
    /// Payload size in bytes.
    pub size: u64,
    /// Position of this chunk in the source's AUX ring.
    pub offset: u64,
    /// Ordering key stamped by the trace source.
    pub reference: u64,
    /// File offset of the payload in the capture.
    pub data_offset: u64,
    /// Tail chunk of a buffer that was split.
    pub consecutive: bool,
    /// Creation-order number assigned when the buffer is queued.
    pub buffer_nr: u64,
    data: BufferData,
}

impl AuxBuffer {
    /// Create buffer metadata with no materialized bytes.
    pub fn new(tid: i32, cpu: i32, size: u64, offset: u64, reference: u64, data_offset: u64) -> Self {
        Self {
            pid: NOT_APPLICABLE,
            tid,
            cpu,
            size,
            offset,
            reference,
            data_offset,
            consecutive: false,
            buffer_nr: 0,
            data: BufferData::Unmaterialized,
        }
    }

    /// Copy the metadata into a new, unmaterialized buffer.
    pub fn clone_metadata(&self) -> Self {
        Self {
            pid: self.pid,
            tid: self.tid,
            cpu: self.cpu,
            size: self.size,
            offset: self.offset,
            reference: self.reference,
            data_offset: self.data_offset,
            consecutive: self.consecutive,
            buffer_nr: self.buffer_nr,
            data: BufferData::Unmaterialized,
        }
    }

    /// Attach bytes obtained at admission time (pipe copy or session slice).
    pub fn set_data(&mut self, data: BufferData) {
        self.data = data;
    }

    /// Current backing state.
    pub fn data(&self) -> &BufferData {
        &self.data
    }

    /// Bytes if already materialized, without touching the file.
    pub fn cached_data(&self) -> Option<&[u8]> {
        self.data.bytes()
    }

    /// Return the payload bytes, mapping them from `fd` on first access.
    ///
    /// Repeated calls return the same bytes until [`put_data`](Self::put_data)
    /// releases them. A failure affects only this buffer; callers are
    /// expected to log it and move on.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be mapped.
    pub fn get_data<Fd: AsFd>(&mut self, fd: Fd) -> Result<&[u8]> {
        if !self.data.is_materialized() {
            let window = MappedWindow::map(fd, self.data_offset, self.size)?;
            self.data = BufferData::Mapped(window);
        }
        // Materialized above.
        Ok(self.data.bytes().unwrap_or_default())
    }

    /// Release a private mapping. Copies and session slices are kept.
    pub fn put_data(&mut self) {
        if matches!(self.data, BufferData::Mapped(_)) {
            self.data = BufferData::Unmaterialized;
        }
    }

    /// Release a private mapping and also free a heap copy.
    ///
    /// Freeing a copy clears `size`, since the bytes cannot be re-read.
    pub fn drop_data(&mut self) {
        self.put_data();
        if matches!(self.data, BufferData::Owned(_)) {
            self.data = BufferData::Unmaterialized;
            self.size = 0;
        }
    }

    /// Release all data and the buffer itself.
    pub fn free(mut self) {
        self.drop_data();
        tracing::trace!(buffer_nr = self.buffer_nr, "freed aux buffer");
    }

    /// End of the payload in the capture file.
    pub fn data_end(&self) -> u64 {
        self.data_offset + self.size
    }
}

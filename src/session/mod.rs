//! The capture session as seen by the admission paths.
//!
//! [`AuxSession`] is everything the queueing code needs from the surrounding
//! session: configuration, how buffer bytes can be obtained, bounded record
//! peeks at file offsets, and sample-id correlation. Two implementations
//! are provided:
//!
//! - [`CaptureFile`]: a seekable capture file, optionally mapped once whole
//! - [`PipeSession`]: a non-seekable stream whose payloads must be copied

mod capture;
mod pipe;

pub use capture::CaptureFile;
pub use pipe::PipeSession;

use crate::config::AuxConfig;
use crate::error::{Error, Result};
use crate::filter::CpuBitmap;
use crate::memory::SessionMap;
use crate::record::{AuxSample, Endian, SampleSource};
use std::ops::Range;
use std::sync::Arc;

/// Extracts the AUX area from a raw sample record.
///
/// Sample layouts depend on the event's sample type, which is known only to
/// the session that recorded it.
pub type SampleParser = fn(&[u8], Endian) -> Result<Option<AuxSample>>;

/// How the bytes of newly admitted buffers are obtained.
#[derive(Debug, Clone)]
pub enum Backing {
    /// The capture is mapped once; buffers borrow slices of it.
    SessionMapped(Arc<SessionMap>),
    /// The input cannot be re-read; payloads are copied at admission.
    Pipe,
    /// Buffers map their own file region on first access.
    Seekable,
}

/// Session services used when admitting AUX buffers.
pub trait AuxSession {
    /// Admission configuration.
    fn config(&self) -> &AuxConfig;

    /// Byte order of the records.
    fn endian(&self) -> Endian;

    /// Current backing strategy for buffer bytes.
    fn backing(&self) -> Backing;

    /// Read up to `max_size` bytes of the record starting at `file_offset`.
    ///
    /// Returns exactly the record's bytes as declared by its header.
    fn peek_event(&self, file_offset: u64, max_size: usize) -> Result<Vec<u8>>;

    /// Resolve a sample id to its trace source.
    fn id_to_source(&self, id: u64) -> Option<SampleSource>;

    /// Copy the next `size` payload bytes from a non-seekable input.
    fn copy_data(&mut self, size: u64) -> Result<Box<[u8]>> {
        let _ = size;
        Err(Error::Unsupported("session input is seekable".into()))
    }

    /// Consume and discard `size` payload bytes. No-op for seekable inputs.
    fn discard_data(&mut self, size: u64) -> Result<()> {
        let _ = size;
        Ok(())
    }

    /// AUX area of a sample record, if the session can parse samples.
    fn aux_sample(&self, record: &[u8]) -> Result<Option<AuxSample>> {
        let _ = record;
        Ok(None)
    }

    /// File range holding the session's records.
    fn data_section(&self) -> Option<Range<u64>> {
        None
    }

    /// Whether AUX data is decoded at all.
    fn decode_enabled(&self) -> bool {
        self.config().decode
    }

    /// The configured CPU filter.
    fn cpu_bitmap(&self) -> Option<&CpuBitmap> {
        self.config().cpu_filter.as_ref()
    }
}

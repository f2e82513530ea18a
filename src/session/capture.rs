//! Seekable capture file session.

use super::{AuxSession, Backing, SampleParser};
use crate::config::AuxConfig;
use crate::error::{Error, Result};
use crate::memory::SessionMap;
use crate::record::{AuxSample, EVENT_HEADER_SIZE, Endian, EventHeader, SampleSource};
use std::collections::HashMap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// A capture file that can be read at arbitrary offsets.
///
/// # Example
///
/// ```rust,ignore
/// use auxmux::session::CaptureFile;
/// use auxmux::AuxConfig;
///
/// let mut capture = CaptureFile::open("perf.data", AuxConfig::default())?;
/// capture.set_data_section(4096..capture_len);
/// capture.map_data_section()?; // optional: one mapping for all buffers
/// ```
#[derive(Debug)]
pub struct CaptureFile {
    file: File,
    config: AuxConfig,
    endian: Endian,
    mapping: Option<Arc<SessionMap>>,
    sources: HashMap<u64, SampleSource>,
    data_section: Option<Range<u64>>,
    sample_parser: Option<SampleParser>,
}

impl CaptureFile {
    /// Open the capture at `path` read-only.
    pub fn open<P: AsRef<Path>>(path: P, config: AuxConfig) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_file(file, config))
    }

    /// Wrap an already opened capture.
    pub fn from_file(file: File, config: AuxConfig) -> Self {
        Self {
            file,
            config,
            endian: Endian::NATIVE,
            mapping: None,
            sources: HashMap::new(),
            data_section: None,
            sample_parser: None,
        }
    }

    /// Records are in `endian` byte order.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Parse sample records with `parser` during full scans.
    pub fn with_sample_parser(mut self, parser: SampleParser) -> Self {
        self.sample_parser = Some(parser);
        self
    }

    /// The underlying file, for [`AuxBuffer::get_data`](crate::AuxBuffer::get_data).
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Set the file range holding records.
    pub fn set_data_section(&mut self, range: Range<u64>) {
        self.data_section = Some(range);
    }

    /// Map the data section once; later admissions borrow from it.
    ///
    /// # Errors
    ///
    /// Fails if no data section is set or the mapping fails. Admission then
    /// keeps using per-buffer mappings.
    pub fn map_data_section(&mut self) -> Result<()> {
        let range = self
            .data_section
            .clone()
            .ok_or_else(|| Error::Unsupported("no data section to map".into()))?;
        let len = range.end.checked_sub(range.start).ok_or_else(|| {
            Error::OutOfRange(format!("data section {:#x}..{:#x}", range.start, range.end))
        })?;
        let mapping = SessionMap::map(&self.file, range.start, len)?;
        self.mapping = Some(mapping);
        Ok(())
    }

    /// Stop handing out slices of the session mapping.
    ///
    /// Buffers already holding slices keep the mapping alive.
    pub fn unmap_data_section(&mut self) {
        self.mapping = None;
    }

    /// Register the trace source behind sample id `id`.
    pub fn add_source(&mut self, id: u64, source: SampleSource) {
        self.sources.insert(id, source);
    }

    fn pread_exact(&self, buf: &mut [u8], mut offset: u64) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = rustix::io::pread(&self.file, &mut buf[filled..], offset)?;
            if n == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            filled += n;
            offset += n as u64;
        }
        Ok(())
    }
}

impl AuxSession for CaptureFile {
    fn config(&self) -> &AuxConfig {
        &self.config
    }

    fn endian(&self) -> Endian {
        self.endian
    }

    fn backing(&self) -> Backing {
        match &self.mapping {
            Some(mapping) => Backing::SessionMapped(Arc::clone(mapping)),
            None => Backing::Seekable,
        }
    }

    fn peek_event(&self, file_offset: u64, max_size: usize) -> Result<Vec<u8>> {
        let mut header_buf = [0u8; EVENT_HEADER_SIZE];
        self.pread_exact(&mut header_buf, file_offset)?;
        let header = EventHeader::parse(&header_buf, self.endian)?;

        let size = header.size as usize;
        if size < EVENT_HEADER_SIZE || size > max_size {
            return Err(Error::InvalidRecord(format!(
                "record at {file_offset:#x} has size {size} (limit {max_size})"
            )));
        }

        let mut record = vec![0u8; size];
        record[..EVENT_HEADER_SIZE].copy_from_slice(&header_buf);
        self.pread_exact(
            &mut record[EVENT_HEADER_SIZE..],
            file_offset + EVENT_HEADER_SIZE as u64,
        )?;
        Ok(record)
    }

    fn id_to_source(&self, id: u64) -> Option<SampleSource> {
        self.sources.get(&id).copied()
    }

    fn aux_sample(&self, record: &[u8]) -> Result<Option<AuxSample>> {
        match self.sample_parser {
            Some(parse) => parse(record, self.endian),
            None => Ok(None),
        }
    }

    fn data_section(&self) -> Option<Range<u64>> {
        self.data_section.clone()
    }
}

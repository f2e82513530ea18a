//! Non-seekable (pipe) session.

use super::{AuxSession, Backing};
use crate::config::AuxConfig;
use crate::error::{Error, Result};
use crate::record::{EVENT_HEADER_SIZE, Endian, EventHeader, SampleSource};
use std::collections::HashMap;
use std::io::{self, Read};

/// A session reading records from a stream that cannot seek.
///
/// Records are pulled with [`read_record`](Self::read_record). An AUX event
/// record is immediately followed by its payload, which admission copies
/// (or discards) before the next record is read.
#[derive(Debug)]
pub struct PipeSession<R> {
    reader: R,
    config: AuxConfig,
    endian: Endian,
    sources: HashMap<u64, SampleSource>,
    position: u64,
}

impl<R: Read> PipeSession<R> {
    /// Wrap `reader`.
    pub fn new(reader: R, config: AuxConfig) -> Self {
        Self {
            reader,
            config,
            endian: Endian::NATIVE,
            sources: HashMap::new(),
            position: 0,
        }
    }

    /// Records are in `endian` byte order.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Register the trace source behind sample id `id`.
    pub fn add_source(&mut self, id: u64, source: SampleSource) {
        self.sources.insert(id, source);
    }

    /// Bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record. Returns `None` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, a truncated record, or a record larger than the
    /// configured peek limit.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header_buf = [0u8; EVENT_HEADER_SIZE];
        let n = read_full(&mut self.reader, &mut header_buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < EVENT_HEADER_SIZE {
            return Err(Error::InvalidRecord("truncated record header".into()));
        }
        let header = EventHeader::parse(&header_buf, self.endian)?;
        let size = header.size as usize;
        if size < EVENT_HEADER_SIZE || size > self.config.peek_limit {
            return Err(Error::InvalidRecord(format!("record size {size}")));
        }

        let mut record = vec![0u8; size];
        record[..EVENT_HEADER_SIZE].copy_from_slice(&header_buf);
        self.reader.read_exact(&mut record[EVENT_HEADER_SIZE..])?;
        self.position += size as u64;
        Ok(Some(record))
    }

    /// Give back the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<R: Read> AuxSession for PipeSession<R> {
    fn config(&self) -> &AuxConfig {
        &self.config
    }

    fn endian(&self) -> Endian {
        self.endian
    }

    fn backing(&self) -> Backing {
        Backing::Pipe
    }

    fn peek_event(&self, _file_offset: u64, _max_size: usize) -> Result<Vec<u8>> {
        Err(Error::Unsupported("cannot peek at offsets of a pipe".into()))
    }

    fn id_to_source(&self, id: u64) -> Option<SampleSource> {
        self.sources.get(&id).copied()
    }

    fn copy_data(&mut self, size: u64) -> Result<Box<[u8]>> {
        let len = usize::try_from(size).map_err(|_| Error::SizeOverflow(size))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        // Bytes read before a failure stay in `data` and count as consumed.
        let result = (&mut self.reader).take(size).read_to_end(&mut data);
        self.position += data.len() as u64;
        result?;
        if data.len() < len {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(data.into_boxed_slice())
    }

    fn discard_data(&mut self, size: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.reader).take(size), &mut io::sink())?;
        self.position += skipped;
        if skipped < size {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(())
    }
}

//! Wire format of the records this crate consumes.
//!
//! Every record starts with an 8-byte [`EventHeader`]. An AUX event record
//! (`PERF_RECORD_AUXTRACE`) is followed in the file by its payload, which is
//! not counted in `header.size`.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Record type of an AUX event record.
pub const PERF_RECORD_AUXTRACE: u32 = 71;

/// Record type of a regular sample.
pub const PERF_RECORD_SAMPLE: u32 = 9;

/// Size of [`EventHeader`] on the wire.
pub const EVENT_HEADER_SIZE: usize = 8;

/// Size of a complete AUX event record, header included.
pub const AUXTRACE_RECORD_SIZE: usize = 48;

/// Largest record `peek_event` will read.
pub const EVENT_PEEK_MAX: usize = 1 << 16;

/// Byte order of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Little-endian.
    #[default]
    Little,
    /// Big-endian.
    Big,
}

impl Endian {
    /// Byte order of this host.
    pub const NATIVE: Endian = if cfg!(target_endian = "big") {
        Endian::Big
    } else {
        Endian::Little
    };

    /// Whether data in this order must be swapped on this host.
    pub fn needs_swap(self) -> bool {
        self != Self::NATIVE
    }

    /// The other byte order.
    pub fn swapped(self) -> Self {
        match self {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        }
    }

    fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }

    fn write_u16(self, buf: &mut [u8], n: u16) {
        match self {
            Endian::Little => LittleEndian::write_u16(buf, n),
            Endian::Big => BigEndian::write_u16(buf, n),
        }
    }

    fn write_u32(self, buf: &mut [u8], n: u32) {
        match self {
            Endian::Little => LittleEndian::write_u32(buf, n),
            Endian::Big => BigEndian::write_u32(buf, n),
        }
    }

    fn write_u64(self, buf: &mut [u8], n: u64) {
        match self {
            Endian::Little => LittleEndian::write_u64(buf, n),
            Endian::Big => BigEndian::write_u64(buf, n),
        }
    }
}

/// Common header of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Record type.
    pub kind: u32,
    /// Type-specific flags.
    pub misc: u16,
    /// Record size in bytes, header included.
    pub size: u16,
}

impl EventHeader {
    /// Parse a header from the first 8 bytes of `buf`.
    pub fn parse(buf: &[u8], endian: Endian) -> Result<Self> {
        if buf.len() < EVENT_HEADER_SIZE {
            return Err(Error::InvalidRecord(format!(
                "{} bytes is too short for a record header",
                buf.len()
            )));
        }
        Ok(Self {
            kind: endian.read_u32(&buf[0..4]),
            misc: endian.read_u16(&buf[4..6]),
            size: endian.read_u16(&buf[6..8]),
        })
    }

    /// Serialize into the first 8 bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8], endian: Endian) {
        endian.write_u32(&mut buf[0..4], self.kind);
        endian.write_u16(&mut buf[4..6], self.misc);
        endian.write_u16(&mut buf[6..8], self.size);
    }
}

/// An AUX event record announcing one chunk of AUX payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxtraceRecord {
    /// Record header.
    pub header: EventHeader,
    /// Payload size.
    pub size: u64,
    /// Position of the payload in the source's AUX ring.
    pub offset: u64,
    /// Ordering key stamped by the trace source.
    pub reference: u64,
    /// Queue number.
    pub idx: u32,
    /// Thread id (`u32::MAX` for none).
    pub tid: u32,
    /// CPU (`u32::MAX` for none).
    pub cpu: u32,
}

impl AuxtraceRecord {
    /// Build a record with a correctly sized header.
    pub fn new(size: u64, offset: u64, reference: u64, idx: u32, tid: i32, cpu: i32) -> Self {
        Self {
            header: EventHeader {
                kind: PERF_RECORD_AUXTRACE,
                misc: 0,
                size: AUXTRACE_RECORD_SIZE as u16,
            },
            size,
            offset,
            reference,
            idx,
            tid: tid as u32,
            cpu: cpu as u32,
        }
    }

    /// Parse a complete record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if the header type is wrong or the
    /// record is shorter than an AUX event record.
    pub fn parse(buf: &[u8], endian: Endian) -> Result<Self> {
        let header = EventHeader::parse(buf, endian)?;
        if header.kind != PERF_RECORD_AUXTRACE {
            return Err(Error::InvalidRecord(format!(
                "record type {} is not an auxtrace event",
                header.kind
            )));
        }
        if (header.size as usize) < AUXTRACE_RECORD_SIZE || buf.len() < AUXTRACE_RECORD_SIZE {
            return Err(Error::InvalidRecord(format!(
                "auxtrace event of {} bytes is truncated",
                header.size
            )));
        }
        Ok(Self {
            header,
            size: endian.read_u64(&buf[8..16]),
            offset: endian.read_u64(&buf[16..24]),
            reference: endian.read_u64(&buf[24..32]),
            idx: endian.read_u32(&buf[32..36]),
            tid: endian.read_u32(&buf[36..40]),
            cpu: endian.read_u32(&buf[40..44]),
        })
    }

    /// Serialize the record (without payload).
    pub fn encode(&self, endian: Endian) -> [u8; AUXTRACE_RECORD_SIZE] {
        let mut buf = [0u8; AUXTRACE_RECORD_SIZE];
        self.header.encode(&mut buf, endian);
        endian.write_u64(&mut buf[8..16], self.size);
        endian.write_u64(&mut buf[16..24], self.offset);
        endian.write_u64(&mut buf[24..32], self.reference);
        endian.write_u32(&mut buf[32..36], self.idx);
        endian.write_u32(&mut buf[36..40], self.tid);
        endian.write_u32(&mut buf[40..44], self.cpu);
        buf
    }

    /// Thread id with `-1` for none.
    pub fn tid(&self) -> i32 {
        self.tid as i32
    }

    /// CPU with `-1` for none.
    pub fn cpu(&self) -> i32 {
        self.cpu as i32
    }
}

/// The AUX area carried inside a sample record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxSample {
    /// Sample id, correlated with a trace source.
    pub id: u64,
    /// Offset of the AUX bytes from the start of the record.
    pub data_offset: u64,
    /// Number of AUX bytes.
    pub size: u64,
    /// Ordering key of the sample, usually its timestamp.
    pub reference: u64,
}

/// Where a sample id's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSource {
    /// Queue number of the source.
    pub idx: u32,
    /// Thread id, or `-1`.
    pub tid: i32,
    /// CPU, or `-1`.
    pub cpu: i32,
}

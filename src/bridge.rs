//! Admission of AUX buffers from session records.
//!
//! These methods turn AUX event records, AUX-carrying samples and persisted
//! index entries into [`AuxBuffer`]s and queue them. They are the only code
//! that understands record layouts; everything below works on buffers.
//!
//! Severity is decided here: a filtered CPU is a silent no-op, an
//! unreadable pipe payload skips one buffer, while allocation failures,
//! broken correlation and malformed index data are returned as errors.

use crate::buffer::{AuxBuffer, BufferData};
use crate::error::{Error, Result};
use crate::filter;
use crate::index::AuxIndex;
use crate::observability::{self, span_index_replay, span_queue_scan};
use crate::queue::{Queue, QueueTable};
use crate::record::{
    AUXTRACE_RECORD_SIZE, AuxSample, AuxtraceRecord, EventHeader, PERF_RECORD_AUXTRACE,
    PERF_RECORD_SAMPLE,
};
use crate::session::{AuxSession, Backing};

/// Outcome of offering one buffer for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The buffer was queued, possibly as several chunks.
    Queued {
        /// Queue the buffer went to.
        queue_nr: u32,
        /// Creation number of the first chunk.
        buffer_nr: u64,
        /// Number of chunks queued.
        chunks: usize,
    },
    /// The buffer's CPU is not in the filter.
    Filtered,
    /// The payload could not be read; this buffer is skipped.
    Unreadable,
    /// AUX decoding is disabled, or the record carries no AUX data.
    Skipped,
}

impl Admission {
    /// Whether anything was queued.
    pub fn is_queued(&self) -> bool {
        matches!(self, Admission::Queued { .. })
    }
}

impl<T> QueueTable<T> {
    /// Admit `buffer` into queue `queue_nr`.
    ///
    /// Applies the CPU filter, attaches bytes according to the session's
    /// backing, splits oversized demand-mapped buffers and queues the result.
    /// Either every chunk is queued or none is.
    pub fn add_buffer<S: AuxSession>(
        &mut self,
        session: &mut S,
        queue_nr: u32,
        mut buffer: AuxBuffer,
    ) -> Result<Admission> {
        if !session.decode_enabled() || buffer.size == 0 {
            session.discard_data(buffer.size)?;
            return Ok(Admission::Skipped);
        }

        if !filter::passes(session.cpu_bitmap(), buffer.cpu) {
            session.discard_data(buffer.size)?;
            observability::record_buffer_filtered(buffer.cpu);
            return Ok(Admission::Filtered);
        }

        let chunks = match session.backing() {
            Backing::SessionMapped(map) => {
                let slice = map.slice(buffer.data_offset, buffer.size)?;
                buffer.set_data(BufferData::Borrowed(slice));
                vec![buffer]
            }
            Backing::Pipe => match session.copy_data(buffer.size) {
                Ok(bytes) => {
                    buffer.set_data(BufferData::Owned(bytes));
                    vec![buffer]
                }
                Err(Error::OutOfMemory) => return Err(Error::OutOfMemory),
                Err(e) => {
                    tracing::warn!(
                        queue = queue_nr,
                        size = buffer.size,
                        error = %e,
                        "failed to copy aux payload, skipping buffer"
                    );
                    observability::record_buffer_unreadable();
                    return Ok(Admission::Unreadable);
                }
            },
            Backing::Seekable => {
                let policy = session.config().split_policy;
                if policy.needs_split(buffer.size) {
                    let chunks = policy.split(buffer)?;
                    observability::record_buffer_split(chunks.len());
                    chunks
                } else {
                    vec![buffer]
                }
            }
        };

        // Grow first so no chunk can fail to queue after another succeeded.
        self.reserve_queue(queue_nr)?;

        let count = chunks.len();
        let mut first_nr = None;
        for chunk in chunks {
            if session.config().tracing.buffer_events {
                observability::trace_buffer_admitted(queue_nr, chunk.size, chunk.reference, chunk.cpu);
            }
            let buffer_nr = self.queue_buffer(queue_nr, chunk)?;
            first_nr.get_or_insert(buffer_nr);
        }

        Ok(Admission::Queued {
            queue_nr,
            buffer_nr: first_nr.unwrap_or_default(),
            chunks: count,
        })
    }

    /// Admit the payload announced by an AUX event record.
    ///
    /// `data_offset` is the file offset of the payload, i.e. just past the
    /// record.
    pub fn add_event<S: AuxSession>(
        &mut self,
        session: &mut S,
        record: &AuxtraceRecord,
        data_offset: u64,
    ) -> Result<Admission> {
        let buffer = AuxBuffer::new(
            record.tid(),
            record.cpu(),
            record.size,
            record.offset,
            record.reference,
            data_offset,
        );
        self.add_buffer(session, record.idx, buffer)
    }

    /// Admit the AUX area of a sample record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSampleId`] or [`Error::SourceNotFound`] when
    /// the sample cannot be correlated with a trace source.
    pub fn add_sample<S: AuxSession>(
        &mut self,
        session: &mut S,
        sample: &AuxSample,
        data_offset: u64,
        reference: u64,
    ) -> Result<Admission> {
        if sample.id == 0 {
            return Err(Error::MissingSampleId);
        }
        let source = session
            .id_to_source(sample.id)
            .ok_or(Error::SourceNotFound { id: sample.id })?;

        let buffer = AuxBuffer::new(source.tid, source.cpu, sample.size, 0, reference, data_offset);
        self.add_buffer(session, source.idx, buffer)
    }

    /// The queue a sample's AUX data belongs to, if it can be resolved.
    pub fn sample_queue<S: AuxSession>(
        &mut self,
        session: &S,
        sample_id: u64,
    ) -> Option<&mut Queue<T>> {
        if sample_id == 0 {
            return None;
        }
        let source = session.id_to_source(sample_id)?;
        self.queue_mut(source.idx)
    }

    /// Admit the AUX event record found at `file_offset` by an index entry.
    ///
    /// Records of other types are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if the record's size does not match
    /// the index.
    pub fn add_indexed_event<S: AuxSession>(
        &mut self,
        session: &mut S,
        file_offset: u64,
        size: u64,
    ) -> Result<Admission> {
        let bytes = session.peek_event(file_offset, session.config().peek_limit)?;
        let header = EventHeader::parse(&bytes, session.endian())?;
        if header.kind != PERF_RECORD_AUXTRACE {
            return Ok(Admission::Skipped);
        }
        if (header.size as usize) < AUXTRACE_RECORD_SIZE || u64::from(header.size) != size {
            return Err(Error::InvalidIndex(format!(
                "record at {file_offset:#x} has size {}, index says {size}",
                header.size
            )));
        }

        let record = AuxtraceRecord::parse(&bytes, session.endian())?;
        self.add_event(session, &record, file_offset + u64::from(header.size))
    }

    /// Populate the queues from a persisted index.
    ///
    /// Stops at the first failing entry. Returns the number of entries
    /// processed; zero when AUX decoding is disabled.
    pub fn process_index<S: AuxSession>(&mut self, session: &mut S, index: &AuxIndex) -> Result<usize> {
        if !session.decode_enabled() {
            return Ok(0);
        }

        let _span = session
            .config()
            .tracing
            .replay_spans
            .then(|| span_index_replay(index.len()).entered());

        let mut processed = 0;
        for entry in index.iter() {
            self.add_indexed_event(session, entry.file_offset, entry.size)?;
            processed += 1;
        }
        observability::record_index_replayed(processed as u64);

        Ok(processed)
    }

    /// Populate the queues by walking every record of the data section.
    ///
    /// Used when no index is available. AUX event records are admitted when
    /// `events` is set, AUX-carrying samples when `samples` is set.
    ///
    /// # Errors
    ///
    /// Fails if the session has no data section, or on the first record
    /// that cannot be read or admitted.
    pub fn queue_data<S: AuxSession>(&mut self, session: &mut S, samples: bool, events: bool) -> Result<()> {
        if !session.decode_enabled() {
            return Ok(());
        }
        let range = session
            .data_section()
            .ok_or_else(|| Error::Unsupported("session has no data section".into()))?;

        let _span = session
            .config()
            .tracing
            .replay_spans
            .then(|| span_queue_scan(range.start, range.end).entered());

        let mut offset = range.start;
        while offset < range.end {
            let bytes = session.peek_event(offset, session.config().peek_limit)?;
            let header = EventHeader::parse(&bytes, session.endian())?;
            let mut next = span_end(offset, u64::from(header.size), range.end)?;

            match header.kind {
                PERF_RECORD_AUXTRACE => {
                    let record = AuxtraceRecord::parse(&bytes, session.endian())?;
                    let payload_offset = next;
                    next = span_end(payload_offset, record.size, range.end)?;
                    if events {
                        self.add_event(session, &record, payload_offset)?;
                    }
                }
                PERF_RECORD_SAMPLE if samples => {
                    let sample = session.aux_sample(&bytes)?.filter(|s| s.size > 0);
                    if let Some(sample) = sample {
                        let data_offset = offset
                            .checked_add(sample.data_offset)
                            .ok_or_else(|| overflow(offset))?;
                        span_end(data_offset, sample.size, next)?;
                        self.add_sample(session, &sample, data_offset, sample.reference)?;
                    }
                }
                _ => {}
            }

            offset = next;
        }

        Ok(())
    }

    /// Handle an AUX event record read from the stream.
    ///
    /// Returns the payload size following the record. The payload has been
    /// consumed from pipe inputs (copied or discarded); seekable callers skip
    /// it themselves.
    pub fn process_auxtrace_event<S: AuxSession>(
        &mut self,
        session: &mut S,
        record: &AuxtraceRecord,
        data_offset: u64,
    ) -> Result<u64> {
        observability::trace_auxtrace_event(
            record.size,
            record.offset,
            record.reference,
            record.idx,
            record.tid(),
            record.cpu(),
        );
        self.add_event(session, record, data_offset)?;
        Ok(record.size)
    }
}

/// End of `len` bytes at `offset`, which must not pass `limit`.
fn span_end(offset: u64, len: u64, limit: u64) -> Result<u64> {
    let end = offset.checked_add(len).ok_or_else(|| overflow(offset))?;
    if end > limit {
        return Err(Error::InvalidRecord(format!(
            "record data at {offset:#x}+{len:#x} runs past {limit:#x}"
        )));
    }
    Ok(end)
}

fn overflow(offset: u64) -> Error {
    Error::InvalidRecord(format!("record size at {offset:#x} overflows"))
}

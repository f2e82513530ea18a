//! Integration tests for admission from seekable capture files.
//!
//! Each test writes a small capture with AUX event records, interleaved
//! non-AUX records and their payloads, then populates queues from it by
//! scanning, by index replay or through a session-wide mapping.

use auxmux::bridge::Admission;
use auxmux::buffer::BufferData;
use auxmux::index::{AuxIndex, IndexEntry};
use auxmux::prelude::*;
use auxmux::record::{AuxSample, EventHeader, PERF_RECORD_SAMPLE, SampleSource};
use std::io::Write;
use tempfile::NamedTempFile;

const FILE_HEADER: usize = 64;
const PERF_RECORD_COMM: u32 = 3;

/// A capture on disk plus what was written into it.
struct Fixture {
    file: NamedTempFile,
    data_end: u64,
    index: AuxIndex,
    comm_offset: u64,
}

fn write_aux(bytes: &mut Vec<u8>, index: &mut AuxIndex, record: AuxtraceRecord, fill: u8) {
    let offset = bytes.len() as u64;
    index.record_event(&record.header, offset).unwrap();
    bytes.extend_from_slice(&record.encode(Endian::NATIVE));
    bytes.extend(std::iter::repeat_n(fill, record.size as usize));
}

fn write_other(bytes: &mut Vec<u8>, kind: u32, body: &[u8]) -> u64 {
    let offset = bytes.len() as u64;
    let mut header = [0u8; 8];
    EventHeader {
        kind,
        misc: 0,
        size: (8 + body.len()) as u16,
    }
    .encode(&mut header, Endian::NATIVE);
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(body);
    offset
}

/// Sample body: id, aux size, reference, then the aux bytes.
fn write_sample(bytes: &mut Vec<u8>, id: u64, reference: u64, aux: &[u8]) -> u64 {
    let mut body = Vec::new();
    body.extend_from_slice(&id.to_ne_bytes());
    body.extend_from_slice(&(aux.len() as u64).to_ne_bytes());
    body.extend_from_slice(&reference.to_ne_bytes());
    body.extend_from_slice(aux);
    write_other(bytes, PERF_RECORD_SAMPLE, &body)
}

fn parse_sample(record: &[u8], _endian: Endian) -> Result<Option<AuxSample>> {
    let word = |at: usize| u64::from_ne_bytes(record[at..at + 8].try_into().unwrap());
    Ok(Some(AuxSample {
        id: word(8),
        size: word(16),
        reference: word(24),
        data_offset: 32,
    }))
}

/// Queue 0 (cpu 0): 100 bytes @30, 70 bytes @40. Queue 1 (cpu 1): 50 bytes @10.
fn fixture() -> Fixture {
    let mut bytes = vec![0xee; FILE_HEADER];
    let mut index = AuxIndex::new();

    write_aux(&mut bytes, &mut index, AuxtraceRecord::new(100, 0, 30, 0, 10, 0), 0xa0);
    let comm_offset = write_other(&mut bytes, PERF_RECORD_COMM, b"worker\0\0");
    write_aux(&mut bytes, &mut index, AuxtraceRecord::new(50, 0, 10, 1, 11, 1), 0xb1);
    write_aux(&mut bytes, &mut index, AuxtraceRecord::new(70, 100, 40, 0, 10, 0), 0xa2);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    Fixture {
        file,
        data_end: bytes.len() as u64,
        index,
        comm_offset,
    }
}

fn open(fixture: &Fixture, config: AuxConfig) -> CaptureFile {
    let mut capture = CaptureFile::open(fixture.file.path(), config).unwrap();
    capture.set_data_section(FILE_HEADER as u64..fixture.data_end);
    capture
}

fn sizes(table: &QueueTable, queue_nr: u32) -> Vec<u64> {
    table.queue(queue_nr).unwrap().buffers().map(|b| b.size).collect()
}

// ============================================================================
// Scanning
// ============================================================================

#[test]
fn test_scan_builds_queues_by_source() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    let mut table: QueueTable = QueueTable::new().unwrap();

    table.queue_data(&mut capture, false, true).unwrap();

    assert_eq!(sizes(&table, 0), vec![100, 70]);
    assert_eq!(sizes(&table, 1), vec![50]);
    assert!(table.populated);
    assert!(table.take_new_data());

    let queue = table.queue(0).unwrap();
    assert!(queue.set);
    assert_eq!((queue.tid, queue.cpu), (10, 0));

    // Nothing is mapped until a decoder asks for the bytes.
    assert!(queue.buffers().all(|b| !b.data().is_materialized()));
}

#[test]
fn test_payloads_map_on_demand() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    let mut table: QueueTable = QueueTable::new().unwrap();
    table.queue_data(&mut capture, false, true).unwrap();

    let queue = table.queue_mut(0).unwrap();
    let fills: Vec<u8> = queue
        .buffers_mut()
        .map(|buffer| {
            let size = buffer.size;
            let bytes = buffer.get_data(capture.file()).unwrap();
            assert_eq!(bytes.len() as u64, size);
            assert!(bytes.iter().all(|b| *b == bytes[0]));
            bytes[0]
        })
        .collect();
    assert_eq!(fills, vec![0xa0, 0xa2]);

    let buffer = queue.front_mut().unwrap();
    buffer.put_data();
    assert!(!buffer.data().is_materialized());
    assert_eq!(buffer.get_data(capture.file()).unwrap(), &[0xa0; 100][..]);
}

#[test]
fn test_scan_without_data_section_fails() {
    let fixture = fixture();
    let mut capture = CaptureFile::open(fixture.file.path(), AuxConfig::default()).unwrap();
    let mut table: QueueTable = QueueTable::new().unwrap();
    assert!(matches!(
        table.queue_data(&mut capture, false, true),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_scan_samples() {
    let mut bytes = vec![0u8; FILE_HEADER];
    let mut index = AuxIndex::new();
    write_aux(&mut bytes, &mut index, AuxtraceRecord::new(16, 0, 1, 0, 10, 0), 0x11);
    let sample_offset = write_sample(&mut bytes, 5, 77, b"sampled-aux-bytes");
    write_sample(&mut bytes, 5, 78, b"");

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let mut capture = CaptureFile::open(file.path(), AuxConfig::default())
        .unwrap()
        .with_sample_parser(parse_sample);
    capture.set_data_section(FILE_HEADER as u64..bytes.len() as u64);
    capture.add_source(
        5,
        SampleSource {
            idx: 2,
            tid: 12,
            cpu: 2,
        },
    );

    let mut table: QueueTable = QueueTable::new().unwrap();
    table.queue_data(&mut capture, true, false).unwrap();

    // Events were not requested; the empty sample adds nothing.
    assert!(table.queue(0).unwrap().is_empty());
    let queue = table.queue_mut(2).unwrap();
    assert_eq!(queue.len(), 1);

    let buffer = queue.front_mut().unwrap();
    assert_eq!(buffer.data_offset, sample_offset + 32);
    assert_eq!(buffer.reference, 77);
    assert_eq!((buffer.tid, buffer.cpu), (12, 2));
    assert_eq!(buffer.get_data(capture.file()).unwrap(), b"sampled-aux-bytes");
}

#[test]
fn test_scan_sample_with_unknown_id_fails() {
    let mut bytes = vec![0u8; FILE_HEADER];
    write_sample(&mut bytes, 9, 1, b"aux");
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let mut capture = CaptureFile::open(file.path(), AuxConfig::default())
        .unwrap()
        .with_sample_parser(parse_sample);
    capture.set_data_section(FILE_HEADER as u64..bytes.len() as u64);

    let mut table: QueueTable = QueueTable::new().unwrap();
    assert!(matches!(
        table.queue_data(&mut capture, true, true),
        Err(Error::SourceNotFound { id: 9 })
    ));
}

/// A capture whose only AUX record declares `size` payload bytes but carries 16.
fn malformed_capture(size: u64) -> (NamedTempFile, u64) {
    let mut bytes = vec![0u8; FILE_HEADER];
    bytes.extend_from_slice(&AuxtraceRecord::new(size, 0, 1, 0, 10, 0).encode(Endian::NATIVE));
    bytes.extend_from_slice(&[0x5a; 16]);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    (file, bytes.len() as u64)
}

#[test]
fn test_scan_rejects_payload_past_data_section() {
    let (file, data_end) = malformed_capture(1000);
    let mut capture = CaptureFile::open(file.path(), AuxConfig::default()).unwrap();
    capture.set_data_section(FILE_HEADER as u64..data_end);
    let mut table: QueueTable = QueueTable::new().unwrap();

    assert!(matches!(
        table.queue_data(&mut capture, false, true),
        Err(Error::InvalidRecord(_))
    ));
    assert!(!table.populated);
}

#[test]
fn test_scan_rejects_overflowing_payload_size() {
    // MAX - 47 wraps back onto the record itself; MAX - 40 overflows outright.
    for size in [u64::MAX - 47, u64::MAX - 40, u64::MAX] {
        let (file, data_end) = malformed_capture(size);
        let mut capture = CaptureFile::open(file.path(), AuxConfig::default()).unwrap();
        capture.set_data_section(FILE_HEADER as u64..data_end);
        let mut table: QueueTable = QueueTable::new().unwrap();

        assert!(matches!(
            table.queue_data(&mut capture, false, true),
            Err(Error::InvalidRecord(_))
        ));
        assert!(table.queue(0).unwrap().is_empty());
    }
}

#[test]
fn test_scan_rejects_sample_data_past_record() {
    fn oversized(record: &[u8], endian: Endian) -> Result<Option<AuxSample>> {
        Ok(parse_sample(record, endian)?.map(|s| AuxSample {
            size: s.size + 64,
            ..s
        }))
    }

    let mut bytes = vec![0u8; FILE_HEADER];
    write_sample(&mut bytes, 5, 1, b"aux");
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let mut capture = CaptureFile::open(file.path(), AuxConfig::default())
        .unwrap()
        .with_sample_parser(oversized);
    capture.set_data_section(FILE_HEADER as u64..bytes.len() as u64);
    capture.add_source(
        5,
        SampleSource {
            idx: 0,
            tid: 1,
            cpu: 0,
        },
    );

    let mut table: QueueTable = QueueTable::new().unwrap();
    assert!(matches!(
        table.queue_data(&mut capture, true, false),
        Err(Error::InvalidRecord(_))
    ));
    assert!(!table.populated);
}

#[test]
fn test_replay_of_truncated_capture_fails() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    let mut table: QueueTable = QueueTable::new().unwrap();

    let mut index = AuxIndex::new();
    index
        .push(IndexEntry {
            file_offset: fixture.data_end - 8,
            size: 48,
        })
        .unwrap();

    assert!(table.process_index(&mut capture, &index).is_err());
    assert!(!table.populated);
}

// ============================================================================
// Index Replay
// ============================================================================

#[test]
fn test_index_round_trip_through_file() {
    let fixture = fixture();
    let mut stored = NamedTempFile::new().unwrap();
    fixture.index.write(&mut stored).unwrap();
    stored.flush().unwrap();

    let len = stored.as_file().metadata().unwrap().len();
    assert_eq!(len, fixture.index.encoded_len());

    let loaded = AuxIndex::read_from(std::fs::File::open(stored.path()).unwrap(), len, false).unwrap();
    let offsets: Vec<u64> = loaded.iter().map(|e| e.file_offset).collect();
    let expected: Vec<u64> = fixture.index.iter().map(|e| e.file_offset).collect();
    assert_eq!(offsets, expected);
    assert!(loaded.iter().all(|e| e.size == 48));
}

#[test]
fn test_index_replay_matches_scan() {
    let fixture = fixture();

    let mut scanned: QueueTable = QueueTable::new().unwrap();
    scanned
        .queue_data(&mut open(&fixture, AuxConfig::default()), false, true)
        .unwrap();

    let mut capture = open(&fixture, AuxConfig::default());
    let mut replayed: QueueTable = QueueTable::new().unwrap();
    let processed = replayed.process_index(&mut capture, &fixture.index).unwrap();
    assert_eq!(processed, 3);

    for queue_nr in 0..2 {
        let a: Vec<_> = scanned
            .queue(queue_nr)
            .unwrap()
            .buffers()
            .map(|b| (b.size, b.reference, b.data_offset, b.buffer_nr))
            .collect();
        let b: Vec<_> = replayed
            .queue(queue_nr)
            .unwrap()
            .buffers()
            .map(|b| (b.size, b.reference, b.data_offset, b.buffer_nr))
            .collect();
        assert_eq!(a, b);
    }
}

#[test]
fn test_index_entry_for_other_record_is_ignored() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    let mut table: QueueTable = QueueTable::new().unwrap();

    let admission = table
        .add_indexed_event(&mut capture, fixture.comm_offset, 16)
        .unwrap();
    assert_eq!(admission, Admission::Skipped);
    assert!(!table.populated);
}

#[test]
fn test_index_size_mismatch_is_an_error() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    let mut table: QueueTable = QueueTable::new().unwrap();

    let first = fixture.index.iter().next().unwrap().file_offset;
    let mut bad = AuxIndex::new();
    bad.push(IndexEntry {
        file_offset: first,
        size: 64,
    })
    .unwrap();

    assert!(matches!(
        table.process_index(&mut capture, &bad),
        Err(Error::InvalidIndex(_))
    ));
}

#[test]
fn test_index_replay_skipped_when_not_decoding() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::dont_decode());
    let mut table: QueueTable = QueueTable::new().unwrap();

    assert_eq!(table.process_index(&mut capture, &fixture.index).unwrap(), 0);
    table.queue_data(&mut capture, true, true).unwrap();
    assert!(!table.populated);
}

// ============================================================================
// Session Mapping And Filtering
// ============================================================================

#[test]
fn test_session_mapping_outlives_capture() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    capture.map_data_section().unwrap();

    let mut table: QueueTable = QueueTable::new().unwrap();
    table.process_index(&mut capture, &fixture.index).unwrap();
    drop(capture);

    let buffer = table.queue_mut(1).unwrap().front_mut().unwrap();
    assert!(matches!(buffer.data(), BufferData::Borrowed(_)));

    // Releasing a borrowed slice keeps it; the session owns the mapping.
    buffer.put_data();
    assert_eq!(buffer.cached_data().unwrap(), &[0xb1; 50][..]);
}

#[test]
fn test_cpu_filter_drops_other_cpus() {
    let fixture = fixture();
    let config = AuxConfig::default().with_cpu_filter("1".parse().unwrap());
    let mut capture = open(&fixture, config);
    let mut table: QueueTable = QueueTable::new().unwrap();

    table.queue_data(&mut capture, false, true).unwrap();
    assert!(table.queue(0).unwrap().is_empty());
    assert_eq!(sizes(&table, 1), vec![50]);
}

#[test]
fn test_split_chunks_cover_payload() {
    let fixture = fixture();
    let config = AuxConfig::default().with_split_policy(SplitPolicy::Ceiling(32));
    let mut capture = open(&fixture, config);
    let mut table: QueueTable = QueueTable::new().unwrap();

    table.queue_data(&mut capture, false, true).unwrap();
    assert_eq!(sizes(&table, 0), vec![32, 32, 32, 4, 32, 32, 6]);

    let queue = table.queue_mut(0).unwrap();
    let mut joined = Vec::new();
    for buffer in queue.buffers_mut().take(4) {
        joined.extend_from_slice(buffer.get_data(capture.file()).unwrap());
    }
    assert_eq!(joined, vec![0xa0; 100]);

    let flags: Vec<bool> = queue.buffers().map(|b| b.consecutive).collect();
    assert_eq!(flags, vec![false, true, true, true, false, true, true]);
}

// ============================================================================
// Ordered Draining
// ============================================================================

#[test]
fn test_heap_drains_queues_in_reference_order() {
    let fixture = fixture();
    let mut capture = open(&fixture, AuxConfig::default());
    let mut table: QueueTable = QueueTable::new().unwrap();
    table.process_index(&mut capture, &fixture.index).unwrap();

    let mut heap = AuxHeap::new();
    for (queue_nr, queue) in table.queues().iter().enumerate() {
        if let Some(buffer) = queue.front() {
            heap.add(queue_nr as u32, buffer.reference).unwrap();
        }
    }

    let mut order = Vec::new();
    while let Some(item) = heap.pop_first() {
        let queue = table.queue_mut(item.queue_nr).unwrap();
        let mut buffer = queue.pop_front().unwrap();
        assert!(!buffer.get_data(capture.file()).unwrap().is_empty());
        order.push(buffer.reference);
        buffer.free();

        if let Some(next) = queue.front() {
            heap.add(item.queue_nr, next.reference).unwrap();
        }
    }

    assert_eq!(order, vec![10, 30, 40]);
    assert!(table.queues().iter().all(Queue::is_empty));
}

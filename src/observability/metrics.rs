//! Metrics collection using metrics-rs.

use metrics::{Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_QUEUED: &str = "auxmux_buffers_queued";
const BYTES_QUEUED: &str = "auxmux_bytes_queued";
const BUFFERS_FILTERED: &str = "auxmux_buffers_filtered";
const BUFFERS_SPLIT: &str = "auxmux_buffers_split";
const BUFFERS_UNREADABLE: &str = "auxmux_buffers_unreadable";
const MAP_FAILURES: &str = "auxmux_map_failures";
const INDEX_ENTRIES_REPLAYED: &str = "auxmux_index_entries_replayed";
const QUEUE_SLOTS: &str = "auxmux_queue_slots";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(BUFFERS_QUEUED, Unit::Count, "AUX buffers appended to queues");
    metrics::describe_counter!(BYTES_QUEUED, Unit::Bytes, "AUX payload bytes queued");
    metrics::describe_counter!(
        BUFFERS_FILTERED,
        Unit::Count,
        "AUX buffers dropped by the CPU filter"
    );
    metrics::describe_counter!(
        BUFFERS_SPLIT,
        Unit::Count,
        "Oversized AUX buffers split into chunks"
    );
    metrics::describe_counter!(
        BUFFERS_UNREADABLE,
        Unit::Count,
        "AUX buffers skipped because their payload could not be read"
    );
    metrics::describe_counter!(MAP_FAILURES, Unit::Count, "Failed AUX buffer mappings");
    metrics::describe_counter!(
        INDEX_ENTRIES_REPLAYED,
        Unit::Count,
        "Index entries fed back through admission"
    );
    metrics::describe_gauge!(QUEUE_SLOTS, Unit::Count, "Allocated queue slots");
}

/// Record a buffer appended to a queue.
#[inline]
pub fn record_buffer_queued(bytes: u64) {
    counter!(BUFFERS_QUEUED).increment(1);
    counter!(BYTES_QUEUED).increment(bytes);
}

/// Record a buffer dropped by the CPU filter.
#[inline]
pub fn record_buffer_filtered(cpu: i32) {
    counter!(BUFFERS_FILTERED, "cpu" => cpu.to_string()).increment(1);
}

/// Record a buffer split into `chunks` pieces.
#[inline]
pub fn record_buffer_split(chunks: usize) {
    counter!(BUFFERS_SPLIT, "chunks" => chunks.to_string()).increment(1);
}

/// Record a buffer whose payload could not be copied.
#[inline]
pub fn record_buffer_unreadable() {
    counter!(BUFFERS_UNREADABLE).increment(1);
}

/// Record a failed mapping of buffer data.
#[inline]
pub fn record_map_failure() {
    counter!(MAP_FAILURES).increment(1);
}

/// Record index entries replayed.
#[inline]
pub fn record_index_replayed(entries: u64) {
    counter!(INDEX_ENTRIES_REPLAYED).increment(entries);
}

/// Record the number of allocated queue slots.
#[inline]
pub fn record_queue_slots(slots: usize) {
    gauge!(QUEUE_SLOTS).set(slots as f64);
}

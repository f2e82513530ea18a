//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create spans for index replay and full scans.
    pub replay_spans: bool,
    /// Whether to log every admitted buffer.
    pub buffer_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            replay_spans: true,
            buffer_events: false, // One line per buffer is noisy
        }
    }
}

impl TracingConfig {
    /// Spans and per-buffer events.
    pub fn all() -> Self {
        Self {
            replay_spans: true,
            buffer_events: true,
        }
    }

    /// Disable everything.
    pub fn none() -> Self {
        Self {
            replay_spans: false,
            buffer_events: false,
        }
    }
}

/// Create a span covering replay of a persisted index.
#[inline]
pub fn span_index_replay(entries: usize) -> Span {
    span!(Level::INFO, "auxtrace_index_replay", entries = entries)
}

/// Create a span covering a full scan of the data section.
#[inline]
pub fn span_queue_scan(start: u64, end: u64) -> Span {
    span!(Level::INFO, "auxtrace_queue_scan", start = start, end = end)
}

/// Log an admitted buffer.
#[inline]
pub fn trace_buffer_admitted(queue_nr: u32, size: u64, reference: u64, cpu: i32) {
    tracing::trace!(
        queue = queue_nr,
        size = size,
        reference = reference,
        cpu = cpu,
        "aux buffer admitted"
    );
}

/// Log an AUX event record as read from the stream.
#[inline]
pub fn trace_auxtrace_event(size: u64, offset: u64, reference: u64, idx: u32, tid: i32, cpu: i32) {
    tracing::debug!(
        size = format_args!("{size:#x}"),
        offset = format_args!("{offset:#x}"),
        reference = format_args!("{reference:#x}"),
        idx = idx,
        tid = tid,
        cpu = cpu,
        "auxtrace event"
    );
}

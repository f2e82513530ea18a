//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `auxmux_buffers_queued` | Counter | Buffers appended to queues |
//! | `auxmux_bytes_queued` | Counter | Payload bytes queued |
//! | `auxmux_buffers_filtered` | Counter | Buffers dropped by the CPU filter |
//! | `auxmux_buffers_split` | Counter | Oversized buffers split into chunks |
//! | `auxmux_buffers_unreadable` | Counter | Buffers whose payload could not be copied |
//! | `auxmux_map_failures` | Counter | Failed buffer mappings |
//! | `auxmux_index_entries_replayed` | Counter | Index entries fed through admission |
//! | `auxmux_queue_slots` | Gauge | Allocated queue slots |
//!
//! Without an installed recorder, recording is a no-op.
//!
//! ## Tracing
//!
//! Spans are emitted for index replay and full data-section scans; per-buffer
//! events are opt-in through [`TracingConfig::buffer_events`].

mod metrics;
mod tracing_support;

pub use metrics::{
    init_metrics, record_buffer_filtered, record_buffer_queued, record_buffer_split,
    record_buffer_unreadable, record_index_replayed, record_map_failure, record_queue_slots,
};
pub use tracing_support::{
    TracingConfig, span_index_replay, span_queue_scan, trace_auxtrace_event, trace_buffer_admitted,
};

//! # auxmux
//!
//! Queuing of AUX-area trace data recorded alongside performance events.
//!
//! Hardware tracers write large opaque byte streams next to ordinary event
//! records. auxmux indexes those streams as [`AuxBuffer`]s, groups them into
//! per-source queues and lets a decoder drain the queues in global order.
//! Buffer bytes are obtained lazily: mapped from the capture on first
//! access, borrowed from a single session-wide mapping, or copied when the
//! input is a pipe.
//!
//! ## Features
//!
//! - **Queues by source**: one queue per CPU or thread, grown by powers of two
//! - **Lazy payloads**: buffers map their bytes only when decoded
//! - **Persisted index**: rebuild the queues without scanning the capture
//! - **Cross-queue ordering**: a min-heap keyed by each queue's next timestamp
//! - **CPU filtering**: drop buffers from unwanted CPUs at admission
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use auxmux::prelude::*;
//!
//! let mut capture = CaptureFile::open("perf.data", AuxConfig::default())?;
//! capture.set_data_section(data_start..data_end);
//!
//! let mut table: QueueTable = QueueTable::new()?;
//! table.queue_data(&mut capture, false, true)?;
//!
//! let mut heap = AuxHeap::new();
//! for (nr, queue) in table.queues().iter().enumerate() {
//!     if let Some(buffer) = queue.front() {
//!         heap.add(nr as u32, buffer.reference)?;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod heap;
pub mod index;
pub mod memory;
pub mod observability;
pub mod queue;
pub mod record;
pub mod session;
pub mod split;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bridge::Admission;
    pub use crate::buffer::{AuxBuffer, BufferData};
    pub use crate::config::AuxConfig;
    pub use crate::error::{Error, Result};
    pub use crate::filter::CpuBitmap;
    pub use crate::heap::AuxHeap;
    pub use crate::index::{AuxIndex, IndexEntry};
    pub use crate::queue::{Queue, QueueTable};
    pub use crate::record::{AuxtraceRecord, Endian};
    pub use crate::session::{AuxSession, CaptureFile, PipeSession};
    pub use crate::split::SplitPolicy;
}

pub use buffer::AuxBuffer;
pub use config::AuxConfig;
pub use error::{Error, Result};
pub use heap::AuxHeap;
pub use index::AuxIndex;
pub use queue::QueueTable;

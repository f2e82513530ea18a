//! Per-session configuration of AUX buffer admission.

use crate::filter::{self, CpuBitmap};
use crate::observability::TracingConfig;
use crate::record::EVENT_PEEK_MAX;
use crate::split::SplitPolicy;

/// How AUX data of a session is admitted.
#[derive(Debug, Clone)]
pub struct AuxConfig {
    /// Whether AUX data is decoded at all. When false, admission paths
    /// consume their input and queue nothing.
    pub decode: bool,
    /// Only admit buffers from these CPUs.
    pub cpu_filter: Option<CpuBitmap>,
    /// Splitting of oversized demand-mapped buffers.
    pub split_policy: SplitPolicy,
    /// Largest record read when peeking at a file offset.
    pub peek_limit: usize,
    /// Spans and per-buffer logging.
    pub tracing: TracingConfig,
}

impl Default for AuxConfig {
    fn default() -> Self {
        Self {
            decode: true,
            cpu_filter: None,
            split_policy: SplitPolicy::native(),
            peek_limit: EVENT_PEEK_MAX,
            tracing: TracingConfig::default(),
        }
    }
}

impl AuxConfig {
    /// A config that skips all AUX data.
    pub fn dont_decode() -> Self {
        Self {
            decode: false,
            ..Self::default()
        }
    }

    /// Restrict admission to the CPUs in `filter`.
    pub fn with_cpu_filter(mut self, filter: CpuBitmap) -> Self {
        self.cpu_filter = Some(filter);
        self
    }

    /// Use `policy` for oversized buffers.
    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.split_policy = policy;
        self
    }

    /// Bound record peeks to `limit` bytes.
    pub fn with_peek_limit(mut self, limit: usize) -> Self {
        self.peek_limit = limit;
        self
    }

    /// Use `tracing` for spans and per-buffer logging.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// Whether a buffer from `cpu` passes the CPU filter.
    pub fn admits_cpu(&self, cpu: i32) -> bool {
        filter::passes(self.cpu_filter.as_ref(), cpu)
    }
}

//! Error types for auxmux.

use thiserror::Error;

/// Result type alias using auxmux's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for auxmux operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An allocation needed for growth, splitting or index chunks failed.
    #[error("out of memory")]
    OutOfMemory,

    /// A queue number cannot be covered by a power-of-two table.
    #[error("queue number {0} is too large")]
    QueueNumberTooLarge(u32),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),

    /// The persisted index is truncated or inconsistent.
    #[error("invalid auxtrace index: {0}")]
    InvalidIndex(String),

    /// A record read from the capture is malformed.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A sample id has no known trace source.
    #[error("no trace source for sample id {id}")]
    SourceNotFound {
        /// The sample id that failed to resolve.
        id: u64,
    },

    /// A sample carries AUX data but no id to correlate it with.
    #[error("sample has no id")]
    MissingSampleId,

    /// A size does not fit the address space of this build.
    #[error("size {0} does not fit in memory")]
    SizeOverflow(u64),

    /// The session cannot perform the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An offset lies outside the region it refers to.
    #[error("{0} out of range")]
    OutOfRange(String),
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

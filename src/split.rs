//! Splitting of oversized buffers for 32-bit address spaces.
//!
//! A demand-mapped buffer must fit in one `mmap` call. On 32-bit builds
//! buffers larger than [`BUFFER_LIMIT_FOR_32_BIT`] are cut into chunks of at
//! most that size. Chunks keep their relative order and every chunk after
//! the first is marked `consecutive`.

use crate::buffer::AuxBuffer;
use crate::error::Result;

/// Largest buffer mapped in one piece on 32-bit builds (32 MiB).
pub const BUFFER_LIMIT_FOR_32_BIT: u64 = 32 * 1024 * 1024;

/// Whether and how large buffers are split before queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Buffers are queued whole.
    Disabled,
    /// Buffers are cut into chunks of at most this many bytes.
    Ceiling(u64),
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::native()
    }
}

impl SplitPolicy {
    /// The policy for the current target's address width.
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "32") {
            SplitPolicy::Ceiling(BUFFER_LIMIT_FOR_32_BIT)
        } else {
            SplitPolicy::Disabled
        }
    }

    /// Whether `size` exceeds the ceiling.
    pub fn needs_split(&self, size: u64) -> bool {
        match *self {
            SplitPolicy::Disabled => false,
            SplitPolicy::Ceiling(ceiling) => ceiling > 0 && size > ceiling,
        }
    }

    /// Cut `buffer` into chunks no larger than the ceiling.
    ///
    /// Returns the chunks in increasing `data_offset` order. The last chunk is
    /// the original buffer, shrunk to the remainder. Nothing is returned
    /// unless every chunk could be allocated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the chunk
    /// list cannot be allocated.
    pub fn split(&self, mut buffer: AuxBuffer) -> Result<Vec<AuxBuffer>> {
        let ceiling = match *self {
            SplitPolicy::Ceiling(ceiling) if self.needs_split(buffer.size) => ceiling,
            _ => {
                let mut whole = Vec::new();
                whole.try_reserve_exact(1)?;
                whole.push(buffer);
                return Ok(whole);
            }
        };

        let count = buffer.size.div_ceil(ceiling);
        let mut chunks = Vec::new();
        chunks.try_reserve_exact(count as usize)?;

        let mut remaining = buffer.size;
        let mut consecutive = false;
        while remaining > ceiling {
            let mut chunk = buffer.clone_metadata();
            chunk.size = ceiling;
            chunk.consecutive = consecutive;
            chunks.push(chunk);

            buffer.data_offset += ceiling;
            remaining -= ceiling;
            consecutive = true;
        }

        buffer.size = remaining;
        buffer.consecutive = consecutive;
        chunks.push(buffer);

        tracing::debug!(chunks = chunks.len(), ceiling, "split oversized aux buffer");

        Ok(chunks)
    }
}

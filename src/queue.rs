//! Per-source buffer queues.
//!
//! A [`QueueTable`] holds one [`Queue`] per trace source, indexed by a small
//! queue number (one per CPU, or per thread in per-thread mode). The table
//! grows by powers of two and never renumbers queues: the index is the
//! identity. Within a queue, buffers stay in admission order.

use crate::buffer::{AuxBuffer, NOT_APPLICABLE};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::os::fd::AsFd;

/// Number of queues allocated by [`QueueTable::new`].
pub const INITIAL_QUEUE_COUNT: usize = 32;

/// Ordered buffers from one trace source.
///
/// `T` is private per-queue state owned by the decoding driver.
#[derive(Debug)]
pub struct Queue<T = ()> {
    buffers: VecDeque<AuxBuffer>,
    /// Thread id of the first queued buffer.
    pub tid: i32,
    /// CPU of the first queued buffer.
    pub cpu: i32,
    /// Whether `tid`/`cpu` have been pinned.
    pub set: bool,
    /// Decoder state; never inspected here.
    pub state: Option<T>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            buffers: VecDeque::new(),
            tid: NOT_APPLICABLE,
            cpu: NOT_APPLICABLE,
            set: false,
            state: None,
        }
    }
}

impl<T> Queue<T> {
    /// Buffers in admission order.
    pub fn buffers(&self) -> impl Iterator<Item = &AuxBuffer> {
        self.buffers.iter()
    }

    /// Mutable buffers in admission order.
    pub fn buffers_mut(&mut self) -> impl Iterator<Item = &mut AuxBuffer> {
        self.buffers.iter_mut()
    }

    /// Number of queued buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the queue holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Oldest buffer.
    pub fn front(&self) -> Option<&AuxBuffer> {
        self.buffers.front()
    }

    /// Oldest buffer, mutably (e.g. to materialize its data).
    pub fn front_mut(&mut self) -> Option<&mut AuxBuffer> {
        self.buffers.front_mut()
    }

    /// Bytes of the oldest buffer, mapping them from `fd` if needed.
    ///
    /// A buffer whose bytes cannot be mapped is logged and reported as
    /// `None`; the caller skips it and carries on.
    pub fn front_data<Fd: AsFd>(&mut self, fd: Fd) -> Option<&[u8]> {
        let buffer = self.buffers.front_mut()?;
        let (offset, size) = (buffer.data_offset, buffer.size);
        match buffer.get_data(fd) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(offset, size, error = %e, "failed to map aux buffer");
                crate::observability::record_map_failure();
                None
            }
        }
    }

    /// Detach the oldest buffer. The caller frees it when done.
    pub fn pop_front(&mut self) -> Option<AuxBuffer> {
        self.buffers.pop_front()
    }

    /// The buffer following the one numbered `current`, or the first buffer
    /// if `current` is `None`.
    pub fn next_buffer(&self, current: Option<u64>) -> Option<&AuxBuffer> {
        let idx = self.next_position(current)?;
        self.buffers.get(idx)
    }

    /// Mutable form of [`next_buffer`](Self::next_buffer).
    pub fn next_buffer_mut(&mut self, current: Option<u64>) -> Option<&mut AuxBuffer> {
        let idx = self.next_position(current)?;
        self.buffers.get_mut(idx)
    }

    fn next_position(&self, current: Option<u64>) -> Option<usize> {
        match current {
            None => (!self.buffers.is_empty()).then_some(0),
            Some(nr) => {
                // Buffer numbers increase along the queue.
                let pos = self
                    .buffers
                    .binary_search_by_key(&nr, |b| b.buffer_nr)
                    .ok()?;
                (pos + 1 < self.buffers.len()).then_some(pos + 1)
            }
        }
    }

    fn push(&mut self, buffer: AuxBuffer) {
        if !self.set {
            self.set = true;
            self.tid = buffer.tid;
            self.cpu = buffer.cpu;
        } else if self.tid != buffer.tid || self.cpu != buffer.cpu {
            tracing::debug!(
                queue_tid = self.tid,
                queue_cpu = self.cpu,
                tid = buffer.tid,
                cpu = buffer.cpu,
                "buffer identity differs from queue"
            );
        }
        self.buffers.push_back(buffer);
    }

    fn free(&mut self) {
        while let Some(buffer) = self.buffers.pop_front() {
            buffer.free();
        }
    }
}

/// All queues of a session, plus bookkeeping shared between them.
#[derive(Debug)]
pub struct QueueTable<T = ()> {
    queues: Vec<Queue<T>>,
    next_buffer_nr: u64,
    /// Set whenever a buffer is queued; cleared by the consumer.
    pub new_data: bool,
    /// Set once any buffer has been queued.
    pub populated: bool,
}

impl<T> QueueTable<T> {
    /// Create a table with [`INITIAL_QUEUE_COUNT`] empty queues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the queue array cannot be allocated.
    pub fn new() -> Result<Self> {
        Ok(Self {
            queues: alloc_queue_array(INITIAL_QUEUE_COUNT)?,
            next_buffer_nr: 0,
            new_data: false,
            populated: false,
        })
    }

    /// Number of queue slots (always a power of two, or zero after free).
    pub fn nr_queues(&self) -> usize {
        self.queues.len()
    }

    /// Queue `queue_nr`, if within the table.
    pub fn queue(&self, queue_nr: u32) -> Option<&Queue<T>> {
        self.queues.get(queue_nr as usize)
    }

    /// Mutable queue `queue_nr`, if within the table.
    pub fn queue_mut(&mut self, queue_nr: u32) -> Option<&mut Queue<T>> {
        self.queues.get_mut(queue_nr as usize)
    }

    /// All queue slots, indexed by queue number.
    pub fn queues(&self) -> &[Queue<T>] {
        &self.queues
    }

    /// All queue slots, mutably.
    pub fn queues_mut(&mut self) -> &mut [Queue<T>] {
        &mut self.queues
    }

    /// Read and clear the `new_data` flag.
    pub fn take_new_data(&mut self) -> bool {
        std::mem::take(&mut self.new_data)
    }

    /// Make sure queue `queue_nr` exists, growing the table if needed.
    ///
    /// Growth is committed only after the new array is fully built, so on
    /// error the table is unchanged.
    pub fn reserve_queue(&mut self, queue_nr: u32) -> Result<()> {
        let needed = queue_nr as usize + 1;
        if needed <= self.queues.len() {
            return Ok(());
        }

        let mut nr_queues = self.queues.len().max(INITIAL_QUEUE_COUNT);
        while nr_queues < needed {
            nr_queues = nr_queues
                .checked_mul(2)
                .ok_or(Error::QueueNumberTooLarge(queue_nr))?;
        }
        let mut grown = alloc_queue_array(nr_queues)?;
        let from = self.queues.len();
        for (slot, queue) in grown.iter_mut().zip(self.queues.drain(..)) {
            *slot = queue;
        }
        tracing::debug!(from, to = nr_queues, "grew queue table");
        self.queues = grown;
        crate::observability::record_queue_slots(nr_queues);

        Ok(())
    }

    /// Append `buffer` to queue `queue_nr`.
    ///
    /// Pins the queue's tid/cpu on its first buffer, stamps the buffer with
    /// the next creation number and raises `new_data`/`populated`. Returns
    /// the creation number.
    ///
    /// # Errors
    ///
    /// Fails only if the table must grow and cannot; the buffer is dropped.
    pub fn queue_buffer(&mut self, queue_nr: u32, mut buffer: AuxBuffer) -> Result<u64> {
        self.reserve_queue(queue_nr)?;

        let buffer_nr = self.next_buffer_nr;
        buffer.buffer_nr = buffer_nr;
        self.next_buffer_nr += 1;

        crate::observability::record_buffer_queued(buffer.size);
        self.queues[queue_nr as usize].push(buffer);

        self.new_data = true;
        self.populated = true;

        Ok(buffer_nr)
    }

    /// Free every buffer and release the queue array.
    pub fn free(&mut self) {
        for queue in &mut self.queues {
            queue.free();
        }
        self.queues = Vec::new();
    }
}

impl<T> Drop for QueueTable<T> {
    fn drop(&mut self) {
        self.free();
    }
}

fn alloc_queue_array<T>(nr_queues: usize) -> Result<Vec<Queue<T>>> {
    let mut queues = Vec::new();
    queues.try_reserve_exact(nr_queues)?;
    queues.resize_with(nr_queues, Queue::default);
    Ok(queues)
}

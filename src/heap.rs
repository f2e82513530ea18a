//! Min-heap of queue numbers ordered by a caller-supplied ordinal.
//!
//! A decoder pushes each queue with the ordinal of its next buffer (usually
//! the buffer's `reference` or a timestamp), then repeatedly reads the root,
//! decodes from that queue and pops it. Ties between equal ordinals are
//! resolved arbitrarily.
//!
//! # Example
//!
//! ```rust
//! use auxmux::heap::AuxHeap;
//!
//! let mut heap = AuxHeap::new();
//! heap.add(3, 300).unwrap();
//! heap.add(1, 100).unwrap();
//! assert_eq!(heap.first().map(|item| item.queue_nr), Some(1));
//! heap.pop();
//! assert_eq!(heap.first().map(|item| item.queue_nr), Some(3));
//! ```

use crate::error::{Error, Result};
use crate::queue::INITIAL_QUEUE_COUNT;

/// One heap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapItem {
    /// Queue to decode from.
    pub queue_nr: u32,
    /// Sort key.
    pub ordinal: u64,
}

/// Binary min-heap over [`HeapItem::ordinal`].
#[derive(Debug, Default)]
pub struct AuxHeap {
    items: Vec<HeapItem>,
    /// Covers the largest queue number added so far; a power of two.
    capacity: usize,
}

impl AuxHeap {
    /// Create an empty heap. Nothing is allocated until the first add.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `queue_nr` with `ordinal`.
    ///
    /// Storage grows to the next power of two covering `queue_nr`, so a heap
    /// holding one entry per queue never reallocates on insertion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if growth fails; the heap is unchanged.
    pub fn add(&mut self, queue_nr: u32, ordinal: u64) -> Result<()> {
        let needed = queue_nr as usize;
        if needed >= self.capacity {
            let mut capacity = INITIAL_QUEUE_COUNT;
            while capacity <= needed {
                capacity = capacity
                    .checked_mul(2)
                    .ok_or(Error::QueueNumberTooLarge(queue_nr))?;
            }
            self.items
                .try_reserve_exact(capacity.saturating_sub(self.items.len()))?;
            self.capacity = capacity;
        }
        if self.items.len() == self.items.capacity() {
            self.items.try_reserve(1)?;
        }

        let pos = self.items.len();
        self.items.push(HeapItem { queue_nr, ordinal });
        self.sift_up(pos, HeapItem { queue_nr, ordinal });

        Ok(())
    }

    /// The entry with the smallest ordinal.
    pub fn first(&self) -> Option<&HeapItem> {
        self.items.first()
    }

    /// All entries in heap-array order.
    pub fn items(&self) -> &[HeapItem] {
        &self.items
    }

    /// Remove the root.
    ///
    /// Moves the smaller child up along a single path to a leaf, then drops
    /// the last entry into the hole and bubbles it up. This does fewer
    /// comparisons than a textbook sift-down on shallow heaps.
    pub fn pop(&mut self) {
        let count = self.items.len();
        if count == 0 {
            return;
        }

        let items = &mut self.items;
        let mut pos = 0;
        loop {
            let left = 2 * pos + 1;
            if left >= count {
                break;
            }
            let right = left + 1;
            if right >= count {
                items[pos] = items[left];
                items.truncate(count - 1);
                return;
            }
            if items[left].ordinal < items[right].ordinal {
                items[pos] = items[left];
                pos = left;
            } else {
                items[pos] = items[right];
                pos = right;
            }
        }

        let last = items[count - 1];
        self.sift_up(pos, last);
        self.items.truncate(count - 1);
    }

    /// Remove and return the root.
    pub fn pop_first(&mut self) -> Option<HeapItem> {
        let first = self.first().copied();
        self.pop();
        first
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current storage capacity, in entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Release all storage.
    pub fn free(&mut self) {
        self.items = Vec::new();
        self.capacity = 0;
    }

    fn sift_up(&mut self, mut pos: usize, item: HeapItem) {
        while pos > 0 {
            let parent = (pos - 1) >> 1;
            if self.items[parent].ordinal <= item.ordinal {
                break;
            }
            self.items[pos] = self.items[parent];
            pos = parent;
        }
        self.items[pos] = item;
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// SketchStream - Streaming Cardinality & Frequency Summarizer
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Single-Producer / Single-Consumer Ring Buffer
//!
//! The lock-free queue between the reader thread and each worker. One slot
//! is sacrificed to distinguish full from empty, so a ring of capacity C
//! holds at most C-1 items.
//!
//! Synchronization is index-based: the producer publishes a slot with a
//! release store to `head`; the consumer's acquire load of `head` makes the
//! slot contents visible before they are taken. The mirror-image discipline
//! applies to `tail`. Neither side ever writes the other's index.
//!
//! The structure is only sound under the SPSC contract: exactly one thread
//! pushes and exactly one thread pops for the lifetime of the ring.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct SpscRing<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Safety: slot contents move between exactly two threads, and the
// release/acquire pair on head/tail orders every slot write before the
// matching read. T itself only needs to be sendable across that handoff.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring with the given slot count (minimum 2; one slot is
    /// always unusable).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Producer side. Returns the value back when the ring is full so the
    /// caller can retry without cloning.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % self.capacity;
        if next == self.tail.load(Ordering::Acquire) {
            return Err(value);
        }
        // Safety: only the producer writes `slots[head]`, and `head` is not
        // published until the store below.
        unsafe {
            *self.slots[head].get() = Some(value);
        }
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Consumer side. `None` when the ring is empty.
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        // Safety: only the consumer reads `slots[tail]`, and the producer
        // stopped touching it when it published `head` past this index.
        let value = unsafe { (*self.slots[tail].get()).take() };
        self.tail.store((tail + 1) % self.capacity, Ordering::Release);
        value
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Racy size estimate for observability only.
    pub fn approx_len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            self.capacity - tail + head
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deferred line buffer.
//!
//! Holds console lines that cannot be sent yet: lines produced before the
//! network is up, and lines logged from tasks that must not transmit
//! synchronously. A line without a terminating newline is merged into the
//! previous entry when both come from the same task, so a message printed in
//! pieces leaves the buffer as one line.
//!
//! When full, the oldest entry is evicted to make room.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound for an entry grown by coalescing.
pub const MAX_ENTRY_LEN: usize = 1024;

/// A buffered console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEntry {
    /// Originating task; `None` is a continuation without a label.
    pub task: Option<String>,
    /// Accumulated text.
    pub text: String,
}

impl BufferedEntry {
    fn is_open_for(&self, task: Option<&str>) -> bool {
        !self.text.ends_with('\n') && self.task.as_deref() == task
    }

    fn extend(&mut self, text: &str) {
        let room = MAX_ENTRY_LEN.saturating_sub(self.text.len());
        self.text.push_str(truncate(text, room));
    }
}

/// Result of [`LineBuffer::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored as a new entry.
    Appended,
    /// Merged into the most recent entry.
    Coalesced,
    /// Stored after evicting the oldest entry.
    Evicted,
    /// Not stored: capacity is zero or the text is empty.
    Disabled,
}

impl AppendOutcome {
    /// True if the text is now held by the buffer.
    pub fn is_stored(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

struct Ring {
    slots: Vec<Option<BufferedEntry>>,
    start: usize,
    count: usize,
}

impl Ring {
    fn index(&self, logical: usize) -> usize {
        (self.start + logical) % self.slots.len()
    }

    fn newest_mut(&mut self) -> Option<&mut BufferedEntry> {
        if self.count == 0 {
            return None;
        }
        let idx = self.index(self.count - 1);
        self.slots[idx].as_mut()
    }

    fn pop_front(&mut self) -> Option<BufferedEntry> {
        if self.count == 0 {
            return None;
        }
        let entry = self.slots[self.start].take();
        self.start = (self.start + 1) % self.slots.len();
        self.count -= 1;
        entry
    }
}

/// Bounded FIFO of console lines guarded by a single mutex.
pub struct LineBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
    evicted: AtomicU64,
}

impl LineBuffer {
    /// Create a buffer holding at most `capacity` entries (0 disables it).
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                start: 0,
                count: 0,
            }),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries dropped to make room so far.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Store `text` for `task`.
    pub fn append(&self, task: Option<&str>, text: &str) -> AppendOutcome {
        if self.capacity == 0 || text.is_empty() {
            return AppendOutcome::Disabled;
        }

        let mut ring = self.ring.lock();

        if let Some(newest) = ring.newest_mut() {
            if newest.is_open_for(task) {
                newest.extend(text);
                return AppendOutcome::Coalesced;
            }
        }

        let mut outcome = AppendOutcome::Appended;
        if ring.count == self.capacity {
            drop(ring.pop_front());
            self.evicted.fetch_add(1, Ordering::Relaxed);
            outcome = AppendOutcome::Evicted;
        }

        let idx = ring.index(ring.count);
        ring.slots[idx] = Some(BufferedEntry {
            task: task.map(str::to_owned),
            text: truncate(text, MAX_ENTRY_LEN).to_owned(),
        });
        ring.count += 1;
        outcome
    }

    /// Remove and return the oldest entry.
    pub fn drain_one(&self) -> Option<BufferedEntry> {
        self.ring.lock().pop_front()
    }

    /// Drop every entry; returns how many were held.
    pub fn clear(&self) -> usize {
        let mut ring = self.ring.lock();
        let dropped = ring.count;
        while ring.pop_front().is_some() {}
        ring.start = 0;
        dropped
    }
}

impl std::fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("evicted", &self.evicted())
            .finish()
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

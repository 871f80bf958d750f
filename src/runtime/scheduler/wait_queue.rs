// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::scheduler::{
    algorithm::SchedulingAlgorithm,
    fiber::SharedFiber,
};
use ::core::cmp::Reverse;
use ::std::{
    collections::BinaryHeap,
    time::Instant,
};

//==============================================================================
// Structures
//==============================================================================

struct WaitQueueEntry {
    /// Deadline snapshot taken at push time. `None` means no timed wakeup.
    deadline: Option<Instant>,
    fiber: SharedFiber,
}

/// Deadline-ordered collection of waiting fibers. Untimed entries sort after every timed one.
pub struct WaitQueue {
    // Use a reverse to get a min heap.
    heap: BinaryHeap<Reverse<WaitQueueEntry>>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Pushes `fiber` keyed by its current deadline. The deadline must not change while the
    /// fiber sits in the queue.
    pub fn push(&mut self, fiber: SharedFiber) {
        let entry: WaitQueueEntry = WaitQueueEntry {
            deadline: fiber.deadline(),
            fiber,
        };
        self.heap.push(Reverse(entry));
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns the earliest deadline in the queue, or `None` when the queue is empty. An inner
    /// `None` means the earliest entry has no timed wakeup at all.
    pub fn next_deadline(&self) -> Option<Option<Instant>> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Hands every entry for which `predicate` returns true to `algorithm`. The predicate is
    /// expected to flip ready fibers to the ready state as a side effect. An interruption can
    /// ready an entry anywhere in the heap, so the sweep inspects every entry.
    pub fn move_to<P: FnMut(&mut SharedFiber) -> bool>(
        &mut self,
        algorithm: &mut dyn SchedulingAlgorithm,
        mut predicate: P,
    ) {
        let entries: Vec<Reverse<WaitQueueEntry>> = self.heap.drain().collect();
        for Reverse(mut entry) in entries {
            if predicate(&mut entry.fiber) {
                algorithm.awakened(entry.fiber);
            } else {
                self.heap.push(Reverse(entry));
            }
        }
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for WaitQueueEntry {
    fn eq(&self, other: &WaitQueueEntry) -> bool {
        // This is technically not correct. However for the usage in this module
        // we only need to compare entries by deadline.
        self.deadline == other.deadline
    }
}

impl Eq for WaitQueueEntry {}

impl PartialOrd for WaitQueueEntry {
    fn partial_cmp(&self, other: &WaitQueueEntry) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WaitQueueEntry {
    fn cmp(&self, other: &WaitQueueEntry) -> core::cmp::Ordering {
        // Compare by deadline; an absent deadline sorts as infinitely late.
        match (self.deadline, other.deadline) {
            (None, None) => core::cmp::Ordering::Equal,
            (None, Some(_)) => core::cmp::Ordering::Greater,
            (Some(_), None) => core::cmp::Ordering::Less,
            (Some(left), Some(right)) => left.cmp(&right),
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

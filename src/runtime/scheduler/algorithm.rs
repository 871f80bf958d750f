// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::fiber::SharedFiber;
use ::std::collections::VecDeque;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Pluggable policy deciding which ready fiber runs next. The manager hands every fiber that
/// becomes runnable to [awakened](SchedulingAlgorithm::awakened) and asks
/// [pick_next](SchedulingAlgorithm::pick_next) for the next one to dispatch.
///
/// Implementations must not re-enter the manager.
pub trait SchedulingAlgorithm {
    /// `fiber` became eligible to run.
    fn awakened(&mut self, fiber: SharedFiber);

    /// Removes and returns the next fiber to run, if any.
    fn pick_next(&mut self) -> Option<SharedFiber>;
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Default scheduling algorithm: a plain FIFO, so fibers run round-robin in the order they were
/// awakened.
pub struct RoundRobin {
    ready_queue: VecDeque<SharedFiber>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            ready_queue: VecDeque::new(),
        }
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.ready_queue.is_empty()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl SchedulingAlgorithm for RoundRobin {
    fn awakened(&mut self, fiber: SharedFiber) {
        debug_assert!(fiber.is_ready(), "fiber with invalid state handed to the algorithm");
        self.ready_queue.push_back(fiber);
    }

    fn pick_next(&mut self) -> Option<SharedFiber> {
        self.ready_queue.pop_front()
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

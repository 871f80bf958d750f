// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        fiber::{
            FiberId,
            SharedFiber,
        },
        operations,
    },
};

//==============================================================================
// Structures
//==============================================================================

/// Owner-side handle to a spawned fiber.
///
/// Joining and detaching consume the handle. A handle dropped without either detaches the fiber,
/// so the scheduler reclaims it on termination.
pub struct FiberHandle {
    fiber: Option<SharedFiber>,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Fiber Handles
impl FiberHandle {
    pub(crate) fn new(fiber: SharedFiber) -> Self {
        Self { fiber: Some(fiber) }
    }

    pub fn id(&self) -> FiberId {
        self.fiber.as_ref().expect("handle already consumed").id()
    }

    /// Shared reference to the underlying fiber, for signallers and synchronization primitives.
    pub fn fiber(&self) -> SharedFiber {
        self.fiber.as_ref().expect("handle already consumed").clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.fiber.as_ref().map_or(true, |fiber| fiber.is_terminated())
    }

    /// Waits until the fiber terminates. Must run on the thread whose scheduler owns the fiber,
    /// either from another fiber or from the top level.
    pub fn join(mut self) -> Result<(), Fail> {
        let fiber: SharedFiber = self.fiber.take().expect("handle already consumed");
        operations::instance().join(fiber)
    }

    /// Gives up ownership; the scheduler deallocates the fiber when it terminates.
    pub fn detach(mut self) {
        if let Some(fiber) = self.fiber.take() {
            trace!("detach(): id={:?}, name={:?}", fiber.id(), fiber.name());
            fiber.mark_detached();
        }
    }

    /// Requests cooperative interruption: the fiber is woken from any wait and raises `EINTR`
    /// at its next interruption point with delivery enabled.
    pub fn interrupt(&self) {
        if let Some(ref fiber) = self.fiber {
            fiber.request_interruption(true);
        }
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Drop for FiberHandle {
    fn drop(&mut self) {
        if let Some(fiber) = self.fiber.take() {
            fiber.mark_detached();
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use crate::runtime::scheduler::{
        handle::FiberHandle,
        operations,
    };
    use ::anyhow::Result;

    #[test]
    fn interrupt_sets_pending_flag() -> Result<()> {
        let handle: FiberHandle = operations::spawn("idle", || Ok(()))?;
        handle.interrupt();
        crate::ensure_eq!(handle.fiber().interruption_requested(), true);
        handle.join()?;
        Ok(())
    }

    #[test]
    fn join_reports_termination() -> Result<()> {
        let handle: FiberHandle = operations::spawn("quick", || Ok(()))?;
        let fiber = handle.fiber();
        handle.join()?;
        crate::ensure_eq!(fiber.is_terminated(), true);
        Ok(())
    }
}

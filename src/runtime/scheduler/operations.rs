// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The `this_fiber` surface: free functions that operate on the calling thread's scheduler.
//! The scheduler itself is a per-thread singleton, lazily built on first use and torn down on
//! thread exit (its destructor drains the wait queue).

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        config::SchedulerConfig,
        fiber::SharedFiber,
        handle::FiberHandle,
        scheduler::SharedFiberManager,
    },
};
use ::std::{
    cell::RefCell,
    time::{
        Duration,
        Instant,
    },
};

//==============================================================================
// Static Variables
//==============================================================================

thread_local! {
    /// The calling thread's scheduler.
    static SCHEDULER: RefCell<Option<SharedFiberManager>> = RefCell::new(None);
}

//==============================================================================
// Standalone Functions
//==============================================================================

/// Returns the calling thread's scheduler, building it on first use.
pub fn instance() -> SharedFiberManager {
    SCHEDULER.with(|scheduler| {
        scheduler
            .borrow_mut()
            .get_or_insert_with(|| SharedFiberManager::new(SchedulerConfig::from_env()))
            .clone()
    })
}

/// Creates a fiber running `entry` and registers it with the calling thread's scheduler. The
/// fiber does not run until the scheduler dispatches it.
pub fn spawn<F>(name: &str, entry: F) -> Result<FiberHandle, Fail>
where
    F: FnOnce() -> Result<(), Fail> + 'static,
{
    let mut fm: SharedFiberManager = instance();
    let fiber: SharedFiber = SharedFiber::with_stack_size(name, Box::new(entry), fm.default_stack_size())?;
    fm.spawn(fiber.clone())?;
    Ok(FiberHandle::new(fiber))
}

/// Gives up the rest of the calling fiber's time slice. A no-op at top level.
pub fn yield_now() {
    instance().yield_now();
}

/// Parks the calling fiber until `deadline` has passed. At top level, sleeps the thread.
pub fn sleep_until(deadline: Instant) -> Result<(), Fail> {
    instance().sleep_until(deadline)
}

/// Parks the calling fiber for `duration`.
pub fn sleep_for(duration: Duration) -> Result<(), Fail> {
    instance().sleep_until(Instant::now() + duration)
}

/// Raises `EINTR` if the calling fiber has an interruption pending and delivery is enabled.
pub fn interruption_point() -> Result<(), Fail> {
    instance().interruption_point()
}

/// Whether the calling fiber accepts interruption delivery. False at top level.
pub fn interruption_enabled() -> bool {
    instance().interruption_enabled()
}

/// Whether the calling fiber has an interruption pending. False at top level.
pub fn interruption_requested() -> bool {
    instance().interruption_requested()
}

/// The fiber the calling thread is currently running, or none at top level.
pub fn active_fiber() -> Option<SharedFiber> {
    instance().active_fiber()
}

/// Marks a waiting fiber ready. Callable from any thread; the owning scheduler observes the
/// wakeup at its next sweep, within one wait interval. Used by synchronization primitives built
/// on top of `wait`/`wait_until`.
pub fn awakened(fiber: &SharedFiber) {
    fiber.awaken();
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use crate::runtime::scheduler::operations;
    use ::anyhow::Result;
    use ::std::{
        cell::Cell,
        rc::Rc,
        time::{
            Duration,
            Instant,
        },
    };

    /// A sleeping fiber resumes no earlier than its deadline and within a bounded overshoot.
    #[test]
    fn sleep_until_honors_deadline() -> Result<()> {
        let woke_after_deadline: Rc<Cell<bool>> = Rc::new(Cell::new(false));

        let start: Instant = Instant::now();
        let deadline: Instant = start + Duration::from_millis(50);
        let recorded: Rc<Cell<bool>> = woke_after_deadline.clone();
        let handle = operations::spawn("sleeper", move || {
            operations::sleep_until(deadline)?;
            recorded.set(Instant::now() >= deadline);
            Ok(())
        })?;
        handle.join()?;
        let elapsed: Duration = start.elapsed();

        crate::ensure_eq!(woke_after_deadline.get(), true);
        crate::ensure_eq!(elapsed >= Duration::from_millis(50), true);
        // Deadline plus wait interval, with generous slack for a loaded machine.
        crate::ensure_eq!(elapsed < Duration::from_millis(500), true);

        Ok(())
    }

    #[test]
    fn sleep_for_parks_the_calling_fiber() -> Result<()> {
        let start: Instant = Instant::now();
        let handle = operations::spawn("napper", || operations::sleep_for(Duration::from_millis(20)))?;
        handle.join()?;
        crate::ensure_eq!(start.elapsed() >= Duration::from_millis(20), true);
        Ok(())
    }

    #[test]
    fn queries_are_inert_at_top_level() -> Result<()> {
        crate::ensure_eq!(operations::active_fiber().is_none(), true);
        crate::ensure_eq!(operations::interruption_enabled(), false);
        crate::ensure_eq!(operations::interruption_requested(), false);
        crate::ensure_eq!(operations::interruption_point().is_ok(), true);
        Ok(())
    }

    #[test]
    fn yield_at_top_level_is_a_noop() -> Result<()> {
        operations::yield_now();
        Ok(())
    }
}

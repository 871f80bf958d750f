// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
    scheduler::{
        context::Context,
        stack::Stack,
    },
    SharedObject,
};
use ::std::{
    fmt,
    ops::{
        Deref,
        DerefMut,
    },
    panic::{
        catch_unwind,
        AssertUnwindSafe,
    },
    ptr,
    sync::atomic::{
        AtomicBool,
        AtomicU64,
        AtomicU8,
        Ordering,
    },
    time::Instant,
};

#[cfg(test)]
use ::std::sync::Weak;

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Source for fiber identifiers, shared by every scheduler in the process.
static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Externally visible fiber identifier.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct FiberId(pub u64);

/// Fiber lifecycle states. `Terminated` is absorbing.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Eligible to run; sitting in the scheduling algorithm or about to be resumed.
    Ready = 0,
    /// Currently executing on the owning thread. At most one per scheduler.
    Running = 1,
    /// Parked on the wait queue for a deadline, a join, or an external signal.
    Waiting = 2,
    /// Entry function finished or failed. Never runs again.
    Terminated = 3,
}

/// Entry function of a fiber. A failure result terminates the fiber; an `EINTR` failure is the
/// normal exit path of an interrupted fiber.
pub type FiberEntry = Box<dyn FnOnce() -> Result<(), Fail> + 'static>;

/// A cooperative execution context with its own stack and saved machine state.
///
/// Only the owning scheduler thread touches the non-atomic fields. Foreign threads are limited to
/// the state word and the flag bits, which is what `request_interruption` and `awaken` need.
pub struct Fiber {
    id: FiberId,
    /// Used to identify the fiber in logs.
    name: String,
    state: AtomicU8,
    interruption_requested: AtomicBool,
    interruption_blocked: AtomicBool,
    detached: AtomicBool,
    /// Wakeup deadline honored by the wait-queue sweep. `None` means no timed wakeup.
    deadline: Option<Instant>,
    /// Consumed exactly once by the trampoline.
    entry: Option<FiberEntry>,
    stack: Stack,
    context: Context,
    /// Whether the context has been initialized with the trampoline.
    started: bool,
    /// The context this fiber's dispatch departed from. Stamped at every resume with the exact
    /// slot that switch saved into; suspending and terminating switch back to it. Restamped per
    /// dispatch, so a migrated fiber always returns to the manager that currently runs it.
    resume_context: *const Context,
    /// Fibers waiting for this fiber to terminate.
    join_list: Vec<SharedFiber>,
}

/// Reference-counted handle to a [Fiber].
pub struct SharedFiber(SharedObject<Fiber>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl FiberState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Waiting,
            _ => Self::Terminated,
        }
    }
}

/// Associate Functions for Fibers
impl Fiber {
    pub fn id(&self) -> FiberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FiberState {
        FiberState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == FiberState::Ready
    }

    pub fn is_running(&self) -> bool {
        self.state() == FiberState::Running
    }

    pub fn is_waiting(&self) -> bool {
        self.state() == FiberState::Waiting
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == FiberState::Terminated
    }

    pub(crate) fn set_ready(&self) {
        self.state.store(FiberState::Ready as u8, Ordering::Release);
    }

    pub(crate) fn set_running(&self) {
        self.state.store(FiberState::Running as u8, Ordering::Release);
    }

    pub(crate) fn set_waiting(&self) {
        self.state.store(FiberState::Waiting as u8, Ordering::Release);
    }

    pub(crate) fn set_terminated(&self) {
        self.state.store(FiberState::Terminated as u8, Ordering::Release);
    }

    /// Marks a waiting fiber ready. This is the only state transition a foreign thread may
    /// perform; the compare-exchange keeps it from clobbering a running or terminated fiber.
    /// Returns whether the fiber was actually transitioned.
    pub fn awaken(&self) -> bool {
        self.state
            .compare_exchange(
                FiberState::Waiting as u8,
                FiberState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn interruption_requested(&self) -> bool {
        self.interruption_requested.load(Ordering::Acquire)
    }

    /// Sets or clears the interruption flag. The flag is delivered at the fiber's next
    /// interruption point, provided delivery is enabled.
    pub fn request_interruption(&self, on: bool) {
        self.interruption_requested.store(on, Ordering::Release);
    }

    pub fn interruption_blocked(&self) -> bool {
        self.interruption_blocked.load(Ordering::Acquire)
    }

    pub fn set_interruption_blocked(&self, on: bool) {
        self.interruption_blocked.store(on, Ordering::Release);
    }

    pub fn detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Gives up external ownership: the scheduler reclaims the fiber when it terminates.
    pub fn mark_detached(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Adds `joiner` to the fibers released on termination. Fails if this fiber has already
    /// terminated, in which case the joiner must re-dispatch itself.
    pub(crate) fn register_joiner(&mut self, joiner: SharedFiber) -> bool {
        if self.is_terminated() {
            return false;
        }
        if !self.join_list.iter().any(|fiber| fiber.id() == joiner.id()) {
            self.join_list.push(joiner);
        }
        true
    }

    pub(crate) fn remove_joiner(&mut self, id: FiberId) {
        self.join_list.retain(|fiber| fiber.id() != id);
    }

    /// Releases every joiner. Must run after the terminated state is set, so a late
    /// [register_joiner](Self::register_joiner) cannot slip in behind the drain.
    pub(crate) fn release_joiners(&mut self) {
        debug_assert!(self.is_terminated());
        for joiner in self.join_list.drain(..) {
            trace!("release_joiners(): waking joiner (id={:?})", joiner.id());
            joiner.awaken();
        }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub(crate) fn resume_context(&self) -> *const Context {
        self.resume_context
    }

    pub(crate) fn set_resume_context(&mut self, context: *const Context) {
        self.resume_context = context;
    }
}

/// Associate Functions for Shared Fibers
impl SharedFiber {
    /// Creates a fiber with the default stack size. The fiber starts in the ready state and does
    /// not run until spawned on a scheduler.
    pub fn new(name: &str, entry: FiberEntry) -> Result<Self, Fail> {
        Self::with_stack_size(name, entry, limits::DEFAULT_STACK_SIZE)
    }

    /// Creates a fiber with a caller-chosen stack size.
    pub fn with_stack_size(name: &str, entry: FiberEntry, stack_size: usize) -> Result<Self, Fail> {
        let stack: Stack = Stack::new(stack_size)?;
        let id: FiberId = FiberId(NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed));
        let fiber: Fiber = Fiber {
            id,
            name: name.to_string(),
            state: AtomicU8::new(FiberState::Ready as u8),
            interruption_requested: AtomicBool::new(false),
            interruption_blocked: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            deadline: None,
            entry: Some(entry),
            stack,
            context: Context::new(),
            started: false,
            resume_context: ptr::null(),
            join_list: Vec::new(),
        };
        trace!("with_stack_size(): created fiber (id={:?}, name={:?})", id, name);
        Ok(Self(SharedObject::new(fiber)))
    }

    /// Initializes the saved context so the first resume enters the trampoline. A no-op for a
    /// fiber that has already started; its saved context resumes wherever it last suspended.
    pub(crate) fn start(&mut self) -> Result<(), Fail> {
        if self.started {
            return Ok(());
        }
        let raw: *mut Fiber = {
            let fiber: &mut Fiber = self.deref_mut();
            fiber as *mut Fiber
        };
        let (arg0, arg1): (usize, usize) = split_fiber_pointer(raw);
        let fiber: &mut Fiber = unsafe { &mut *raw };
        fiber.context.initialize(&fiber.stack, fiber_trampoline, arg0, arg1)?;
        fiber.started = true;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> Weak<Fiber> {
        self.0.downgrade()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

// The trampoline pointer travels through makecontext(), which only guarantees 32 bits per
// argument, so it is split across an argument pair.

fn split_fiber_pointer(fiber: *mut Fiber) -> (usize, usize) {
    let raw: u64 = fiber as usize as u64;
    ((raw & 0xffff_ffff) as usize, (raw >> 32) as usize)
}

fn join_fiber_pointer(arg0: usize, arg1: usize) -> *mut Fiber {
    let raw: u64 = ((arg1 as u64 & 0xffff_ffff) << 32) | (arg0 as u64 & 0xffff_ffff);
    raw as usize as *mut Fiber
}

/// First (and only) frame on every fiber stack. Runs the entry function, marks the fiber
/// terminated, releases its joiners, and hands the thread back to the dispatcher. Never returns.
extern "C" fn fiber_trampoline(arg0: usize, arg1: usize) {
    let fiber: &mut Fiber = unsafe { &mut *join_fiber_pointer(arg0, arg1) };
    let entry: FiberEntry = fiber.entry.take().expect("fiber started without an entry function");

    match catch_unwind(AssertUnwindSafe(entry)) {
        Ok(Ok(())) => trace!(
            "fiber_trampoline(): fiber completed (id={:?}, name={:?})",
            fiber.id,
            fiber.name
        ),
        Ok(Err(e)) => debug!(
            "fiber_trampoline(): fiber failed (id={:?}, name={:?}, error={:?})",
            fiber.id, fiber.name, e
        ),
        Err(_) => warn!(
            "fiber_trampoline(): fiber panicked (id={:?}, name={:?})",
            fiber.id, fiber.name
        ),
    }

    fiber.set_terminated();
    fiber.release_joiners();

    // Switch back to the exact context this dispatch departed from. A terminated fiber never
    // runs again, so the state saved into its own context below is dead.
    let resume: *const Context = fiber.resume_context;
    debug_assert!(!resume.is_null(), "terminated fiber was never dispatched");
    unsafe { Context::switch(&mut fiber.context, &*resume) };
    unreachable!("terminated fiber resumed");
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Fibers move between threads only through the scheduler handoff protocols (spawn-then-migrate,
/// interruption, external wakeup). Every field a foreign thread may touch is atomic; the rest
/// belong to the thread whose scheduler currently holds the fiber.
unsafe impl Send for SharedFiber {}
unsafe impl Sync for SharedFiber {}

impl Clone for SharedFiber {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Deref for SharedFiber {
    type Target = Fiber;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SharedFiber {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

impl PartialEq for SharedFiber {
    fn eq(&self, other: &SharedFiber) -> bool {
        self.id() == other.id()
    }
}

impl Eq for SharedFiber {}

impl fmt::Debug for SharedFiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl From<u64> for FiberId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<FiberId> for u64 {
    fn from(value: FiberId) -> Self {
        value.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        FiberState,
        SharedFiber,
    };
    use ::anyhow::Result;

    fn dummy_fiber(name: &str) -> Result<SharedFiber> {
        Ok(SharedFiber::new(name, Box::new(|| Ok(())))?)
    }

    #[test]
    fn new_fiber_is_ready() -> Result<()> {
        let fiber: SharedFiber = dummy_fiber("fresh")?;
        crate::ensure_eq!(fiber.state(), FiberState::Ready);
        crate::ensure_eq!(fiber.deadline().is_none(), true);
        crate::ensure_eq!(fiber.detached(), false);
        Ok(())
    }

    #[test]
    fn fiber_ids_are_unique() -> Result<()> {
        let first: SharedFiber = dummy_fiber("first")?;
        let second: SharedFiber = dummy_fiber("second")?;
        crate::ensure_neq!(first.id(), second.id());
        Ok(())
    }

    #[test]
    fn awaken_only_transitions_waiting_fibers() -> Result<()> {
        let fiber: SharedFiber = dummy_fiber("waiter")?;

        // Ready fibers are left alone.
        crate::ensure_eq!(fiber.awaken(), false);
        crate::ensure_eq!(fiber.state(), FiberState::Ready);

        fiber.set_waiting();
        crate::ensure_eq!(fiber.awaken(), true);
        crate::ensure_eq!(fiber.state(), FiberState::Ready);

        fiber.set_terminated();
        crate::ensure_eq!(fiber.awaken(), false);
        crate::ensure_eq!(fiber.state(), FiberState::Terminated);

        Ok(())
    }

    #[test]
    fn register_joiner_fails_on_terminated_fiber() -> Result<()> {
        let mut target: SharedFiber = dummy_fiber("target")?;
        let joiner: SharedFiber = dummy_fiber("joiner")?;

        crate::ensure_eq!(target.register_joiner(joiner.clone()), true);
        // Registration is idempotent per joiner.
        crate::ensure_eq!(target.register_joiner(joiner.clone()), true);

        target.set_terminated();
        crate::ensure_eq!(target.register_joiner(joiner), false);

        Ok(())
    }

    #[test]
    fn release_joiners_wakes_waiting_joiners() -> Result<()> {
        let mut target: SharedFiber = dummy_fiber("target")?;
        let joiner: SharedFiber = dummy_fiber("joiner")?;

        joiner.set_waiting();
        crate::ensure_eq!(target.register_joiner(joiner.clone()), true);

        target.set_terminated();
        target.release_joiners();
        crate::ensure_eq!(joiner.state(), FiberState::Ready);

        Ok(())
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The fiber manager: owns the wait queue, the scheduling algorithm, and the active fiber
//! pointer, and performs every state transition and context switch in the system.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::spinlock::SpinLockGuard,
    runtime::{
        fail::Fail,
        scheduler::{
            algorithm::{
                RoundRobin,
                SchedulingAlgorithm,
            },
            config::SchedulerConfig,
            context::Context,
            fiber::SharedFiber,
            wait_queue::WaitQueue,
        },
        SharedObject,
    },
};
use ::std::{
    ops::{
        Deref,
        DerefMut,
    },
    thread,
    time::{
        Duration,
        Instant,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Fiber Manager
pub struct FiberManager {
    /// Policy choosing among ready fibers.
    algorithm: Box<dyn SchedulingAlgorithm>,
    /// Fibers parked for a deadline, a join, or an external signal.
    wait_queue: WaitQueue,
    /// The single running fiber, if any. Replaced at every context switch.
    active_fiber: Option<SharedFiber>,
    /// Saved state of the thread driving the scheduler between dispatches. Every dispatch
    /// departs from here, and the dispatched fiber carries a pointer to this exact slot as its
    /// resume context, so its suspension or termination switches back into the frame that
    /// dispatched it.
    driver_context: Context,
    wait_interval: Duration,
    default_stack_size: usize,
}

/// Reference-counted handle to a [FiberManager]. Cheap to clone; parked fiber stacks and the
/// thread-local registry all share the same manager through this handle.
#[derive(Clone)]
pub struct SharedFiberManager(SharedObject<FiberManager>);

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Wait-queue sweep predicate: flips a fiber to ready when its deadline has elapsed or an
/// interruption is pending, and migrates fibers a signaller already flipped to ready.
fn fetch_ready(fiber: &mut SharedFiber) -> bool {
    debug_assert!(!fiber.is_running(), "running fiber in the wait queue");
    debug_assert!(!fiber.is_terminated(), "terminated fiber in the wait queue");

    if fiber.deadline().map_or(false, |deadline| deadline <= Instant::now()) || fiber.interruption_requested() {
        fiber.set_ready();
    }
    fiber.is_ready()
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Shared Fiber Managers
impl SharedFiberManager {
    /// Creates a manager with the default round-robin algorithm.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_algorithm(config, Box::new(RoundRobin::new()))
    }

    /// Creates a manager with a caller-provided scheduling algorithm.
    pub fn with_algorithm(config: SchedulerConfig, algorithm: Box<dyn SchedulingAlgorithm>) -> Self {
        Self(SharedObject::new(FiberManager {
            algorithm,
            wait_queue: WaitQueue::new(),
            active_fiber: None,
            driver_context: Context::new(),
            wait_interval: config.wait_interval,
            default_stack_size: config.stack_size,
        }))
    }
}

/// Associate Functions for Fiber Managers
impl FiberManager {
    /// Registers `fiber` with the scheduling algorithm. The fiber does not run until a later
    /// scheduling decision picks it.
    pub fn spawn(&mut self, mut fiber: SharedFiber) -> Result<(), Fail> {
        debug_assert!(fiber.is_ready(), "cannot spawn a fiber that is not ready");
        trace!("spawn(): id={:?}, name={:?}", fiber.id(), fiber.name());
        fiber.start()?;
        self.algorithm.awakened(fiber);
        Ok(())
    }

    /// Performs exactly one scheduling decision. Invoked by a fiber that parked itself, it hands
    /// the thread back to the exact context that dispatched the fiber; that frame picks the next
    /// runnable. Invoked by the driving thread, it sweeps the wait queue and either dispatches
    /// the next ready fiber or sleeps until the earliest wakeup. Looping is the caller's job.
    pub fn run(&mut self) {
        // The sweep runs before every scheduling decision, so a wakeup recorded on the wait
        // queue is visible in this same decision.
        self.wait_queue.move_to(&mut *self.algorithm, fetch_ready);

        if self.active_fiber.is_some() {
            // The caller placed itself in a queue already; park its stack and switch back into
            // the dispatching frame, which continues below its own `resume` call.
            self.suspend_active();
            return;
        }

        if let Some(fiber) = self.algorithm.pick_next() {
            debug_assert!(fiber.is_ready(), "fiber with invalid state in ready queue");
            self.resume(fiber);
            return;
        }

        // Nothing runnable: sleep until the earliest wakeup.
        let wakeup: Instant = self.next_wakeup();
        let now: Instant = Instant::now();
        if wakeup > now {
            thread::sleep(wakeup - now);
        }
    }

    /// Gives up the rest of the active fiber's time slice and re-enqueues it behind every other
    /// ready fiber. On return the fiber is running again.
    pub fn yield_now(&mut self) {
        if let Some(active) = self.active_fiber.clone() {
            debug_assert!(active.is_running());
            active.set_ready();
            self.algorithm.awakened(active);
            self.run();
        }
    }

    /// Parks the active fiber until `awaken`ed by a signaller. `lk` protects the condition the
    /// caller waits on and is released only after the state change, so a wakeup cannot be lost.
    /// Raises `EINTR` if the fiber was interrupted.
    pub fn wait(&mut self, lk: SpinLockGuard<'_>) -> Result<(), Fail> {
        self.park(None, Some(lk));
        self.interruption_point()?;
        Ok(())
    }

    /// Parks the active fiber until `deadline` or an earlier wakeup. Returns `false` iff the
    /// deadline had passed on return; callers re-check their condition either way. Raises
    /// `EINTR` if the fiber was interrupted.
    pub fn wait_until(&mut self, deadline: Instant, lk: SpinLockGuard<'_>) -> Result<bool, Fail> {
        let not_expired: bool = self.park(Some(deadline), Some(lk));
        self.interruption_point()?;
        Ok(not_expired)
    }

    /// Parks the active fiber until `deadline` has passed, absorbing early wakeups. At top level
    /// (no active fiber) this simply sleeps the thread.
    pub fn sleep_until(&mut self, deadline: Instant) -> Result<(), Fail> {
        if self.active_fiber.is_some() {
            while Instant::now() < deadline {
                self.park(Some(deadline), None);
                self.interruption_point()?;
            }
        } else {
            let now: Instant = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
        Ok(())
    }

    /// Waits for `target` to terminate. Callable both from a fiber and from the thread driving
    /// the scheduler. Raises `EINTR` if the joining fiber was interrupted; the target keeps
    /// running in that case.
    pub fn join(&mut self, mut target: SharedFiber) -> Result<(), Fail> {
        if let Some(mut active) = self.active_fiber.clone() {
            debug_assert!(active.id() != target.id(), "fiber cannot join itself");
            loop {
                active.set_waiting();
                active.set_deadline(None);
                self.wait_queue.push(active.clone());
                if !target.register_joiner(active.clone()) {
                    // The target already terminated, so nothing will release us: go straight
                    // back to ready and take one more dispatch round.
                    active.set_ready();
                }
                self.run();
                if let Err(e) = self.interruption_point() {
                    target.remove_joiner(active.id());
                    return Err(e);
                }
                if target.is_terminated() {
                    break;
                }
            }
        } else {
            while !target.is_terminated() {
                self.run();
            }
        }
        debug_assert!(target.is_terminated());
        Ok(())
    }

    /// Adopts `fiber` into this scheduler and runs one scheduling step. Meant for fibers handed
    /// over by another thread before their first dispatch.
    pub fn migrate(&mut self, fiber: SharedFiber) -> Result<(), Fail> {
        debug_assert!(fiber.is_ready(), "cannot migrate a fiber that is not ready");
        trace!("migrate(): id={:?}, name={:?}", fiber.id(), fiber.name());
        self.spawn(fiber)?;
        self.run();
        Ok(())
    }

    /// The currently running fiber, or none when the scheduler is driven from the top level.
    pub fn active_fiber(&self) -> Option<SharedFiber> {
        self.active_fiber.clone()
    }

    /// Raises `EINTR` out of the active fiber if an interruption is pending and delivery is
    /// enabled, clearing the pending flag. A no-op at top level.
    pub fn interruption_point(&self) -> Result<(), Fail> {
        if let Some(ref active) = self.active_fiber {
            if active.interruption_requested() && !active.interruption_blocked() {
                active.request_interruption(false);
                let cause: String = format!("fiber interrupted (id={:?}, name={:?})", active.id(), active.name());
                debug!("interruption_point(): {}", cause);
                return Err(Fail::new(libc::EINTR, &cause));
            }
        }
        Ok(())
    }

    /// Whether the active fiber currently accepts interruption delivery. False at top level.
    pub fn interruption_enabled(&self) -> bool {
        self.active_fiber
            .as_ref()
            .map_or(false, |fiber| !fiber.interruption_blocked())
    }

    /// Whether an interruption is pending on the active fiber. False at top level.
    pub fn interruption_requested(&self) -> bool {
        self.active_fiber
            .as_ref()
            .map_or(false, |fiber| fiber.interruption_requested())
    }

    pub fn default_stack_size(&self) -> usize {
        self.default_stack_size
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    pub fn set_wait_interval(&mut self, wait_interval: Duration) {
        self.wait_interval = wait_interval;
    }

    /// Marks the active fiber waiting, releases `lk`, parks the fiber on the wait queue keyed by
    /// `deadline`, and runs the next scheduling decision. Returns whether the deadline had not
    /// yet passed when the fiber resumed.
    fn park(&mut self, deadline: Option<Instant>, lk: Option<SpinLockGuard<'_>>) -> bool {
        debug_assert!(self.active_fiber.is_some(), "wait primitives require a running fiber");
        if let Some(mut active) = self.active_fiber.clone() {
            debug_assert!(active.is_running());
            // State change strictly before the lock release: a signaller that acquires the lock
            // afterwards must observe the waiting state.
            active.set_waiting();
            drop(lk);
            active.set_deadline(deadline);
            self.wait_queue.push(active.clone());
            self.run();
        }
        match deadline {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }

    /// Dispatches `fiber`: switches from the driving thread into the fiber. The fiber's resume
    /// context is stamped with the exact slot this switch saves into, so its later suspension or
    /// termination returns control to this very frame.
    fn resume(&mut self, mut fiber: SharedFiber) {
        debug_assert!(self.active_fiber.is_none(), "dispatch while another fiber is running");
        self.active_fiber = Some(fiber.clone());
        fiber.set_running();

        // The dispatch target for a given dispatch must equal the `from` used for that same
        // switch. Compute it once and hand the fiber that pointer.
        let from: *mut Context = &mut self.driver_context as *mut Context;
        fiber.set_resume_context(from as *const Context);
        let to: *const Context = fiber.context() as *const Context;
        unsafe { Context::switch(&mut *from, &*to) };

        // Back on the driving thread: the fiber parked itself in a queue or terminated.
        // Dropping the manager's reference to a terminated detached fiber reclaims it.
        if let Some(last) = self.active_fiber.take() {
            if last.is_terminated() && last.detached() {
                trace!(
                    "resume(): reclaiming detached fiber (id={:?}, name={:?})",
                    last.id(),
                    last.name()
                );
            }
        }
    }

    /// Parks the active fiber's stack and switches back to the exact context that dispatched it
    /// (the fiber's own resume context, stamped per dispatch). The fiber must already have
    /// placed itself in a queue; it resumes inside this frame when it is next picked.
    fn suspend_active(&mut self) {
        if let Some(mut fiber) = self.active_fiber.clone() {
            debug_assert!(
                !fiber.is_running() && !fiber.is_terminated(),
                "suspending a fiber that did not park itself"
            );
            let from: *mut Context = fiber.context_mut() as *mut Context;
            let to: *const Context = fiber.resume_context();
            debug_assert!(!to.is_null(), "suspending a fiber that was never dispatched");
            unsafe { Context::switch(&mut *from, &*to) };
        }
    }

    /// Earliest instant the driving thread must wake up at. An empty queue and an untimed
    /// earliest entry both fall back to the wait interval, which bounds how late an
    /// externally-signalled wakeup is observed.
    fn next_wakeup(&self) -> Instant {
        match self.wait_queue.next_deadline() {
            Some(Some(deadline)) => deadline,
            _ => Instant::now() + self.wait_interval,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SharedFiberManager {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Deref for SharedFiberManager {
    type Target = FiberManager;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SharedFiberManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

impl Drop for FiberManager {
    /// Gives scheduled work a final chance to complete. Fibers whose last reference lives in the
    /// queues are dropped with the manager.
    fn drop(&mut self) {
        while !self.wait_queue.is_empty() {
            self.run();
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use crate::{
        collections::spinlock::SpinLock,
        runtime::scheduler::{
            algorithm::SchedulingAlgorithm,
            config::SchedulerConfig,
            fiber::{
                Fiber,
                FiberId,
                SharedFiber,
            },
            handle::FiberHandle,
            operations,
            scheduler::SharedFiberManager,
        },
    };
    use ::anyhow::Result;
    use ::std::{
        cell::{
            Cell,
            RefCell,
        },
        rc::Rc,
        sync::{
            atomic::{
                AtomicBool,
                Ordering,
            },
            Arc,
            Weak,
        },
        thread,
        time::{
            Duration,
            Instant,
        },
    };

    //==================================================================================================================
    // End-to-end scenarios
    //==================================================================================================================

    /// Three yielding fibers interleave in strict round-robin under the default algorithm.
    #[test]
    fn yield_loop_visits_fibers_round_robin() -> Result<()> {
        let counter: Rc<Cell<usize>> = Rc::new(Cell::new(0));
        let order: Rc<RefCell<Vec<FiberId>>> = Rc::new(RefCell::new(Vec::new()));

        let mut handles: Vec<FiberHandle> = Vec::new();
        for name in ["a", "b", "c"] {
            let counter: Rc<Cell<usize>> = counter.clone();
            let order: Rc<RefCell<Vec<FiberId>>> = order.clone();
            handles.push(operations::spawn(name, move || {
                let id: FiberId = operations::active_fiber().expect("entry runs on a fiber").id();
                order.borrow_mut().push(id);
                counter.set(counter.get() + 1);
                operations::yield_now();
                order.borrow_mut().push(id);
                counter.set(counter.get() + 1);
                operations::yield_now();
                order.borrow_mut().push(id);
                Ok(())
            })?);
        }

        let ids: Vec<FiberId> = handles.iter().map(|handle| handle.id()).collect();
        for handle in handles {
            handle.join()?;
        }

        crate::ensure_eq!(counter.get(), 6);
        let expected: Vec<FiberId> = vec![
            ids[0], ids[1], ids[2], ids[0], ids[1], ids[2], ids[0], ids[1], ids[2],
        ];
        let recorded: Vec<FiberId> = order.borrow().clone();
        crate::ensure_eq!(recorded, expected);

        Ok(())
    }

    /// `join` on a target that already terminated returns without deadlocking.
    #[test]
    fn join_on_terminated_target_returns() -> Result<()> {
        let joined_terminated: Rc<Cell<bool>> = Rc::new(Cell::new(false));

        let result: Rc<Cell<bool>> = joined_terminated.clone();
        let parent: FiberHandle = operations::spawn("parent", move || {
            let child: FiberHandle = operations::spawn("child", || Ok(()))?;
            // Let the child run to completion before joining it.
            operations::yield_now();
            let was_terminated: bool = child.is_terminated();
            child.join()?;
            result.set(was_terminated);
            Ok(())
        })?;
        parent.join()?;

        crate::ensure_eq!(joined_terminated.get(), true);

        Ok(())
    }

    /// `join` on a live target returns only after the target terminates.
    #[test]
    fn join_blocks_until_target_terminates() -> Result<()> {
        let events: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let parent_events: Rc<RefCell<Vec<&'static str>>> = events.clone();
        let parent: FiberHandle = operations::spawn("parent", move || {
            let child_events: Rc<RefCell<Vec<&'static str>>> = parent_events.clone();
            let child: FiberHandle = operations::spawn("child", move || {
                child_events.borrow_mut().push("child");
                operations::yield_now();
                child_events.borrow_mut().push("child");
                operations::yield_now();
                child_events.borrow_mut().push("child");
                Ok(())
            })?;
            child.join()?;
            parent_events.borrow_mut().push("joined");
            Ok(())
        })?;
        parent.join()?;

        let recorded: Vec<&'static str> = events.borrow().clone();
        crate::ensure_eq!(recorded, vec!["child", "child", "child", "joined"]);

        Ok(())
    }

    /// An interruption promotes an indefinitely-waiting fiber, which raises out of the wait and
    /// terminates without running the code after it.
    #[test]
    fn interrupted_wait_terminates_fiber() -> Result<()> {
        let lock: Arc<SpinLock> = Arc::new(SpinLock::new());
        let resumed_normally: Rc<Cell<bool>> = Rc::new(Cell::new(false));

        let waiter_lock: Arc<SpinLock> = lock.clone();
        let resumed: Rc<Cell<bool>> = resumed_normally.clone();
        let handle: FiberHandle = operations::spawn("waiter", move || {
            let mut fm: SharedFiberManager = operations::instance();
            let guard = waiter_lock.lock();
            fm.wait(guard)?;
            resumed.set(true);
            Ok(())
        })?;

        let target: SharedFiber = handle.fiber();
        let interrupter: thread::JoinHandle<()> = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            target.request_interruption(true);
        });

        handle.join()?;
        interrupter.join().unwrap();

        crate::ensure_eq!(resumed_normally.get(), false);

        Ok(())
    }

    /// Inside a `DisableInterruption` scope a pending interruption neither aborts the wait nor
    /// raises; it is delivered at the first interruption point after the scope ends.
    #[test]
    fn disabled_interruption_defers_delivery() -> Result<()> {
        let lock: Arc<SpinLock> = Arc::new(SpinLock::new());
        let raised_in_scope: Rc<Cell<bool>> = Rc::new(Cell::new(false));
        let raised_after_scope: Rc<Cell<bool>> = Rc::new(Cell::new(false));

        let waiter_lock: Arc<SpinLock> = lock.clone();
        let in_scope: Rc<Cell<bool>> = raised_in_scope.clone();
        let after_scope: Rc<Cell<bool>> = raised_after_scope.clone();
        let handle: FiberHandle = operations::spawn("blocked", move || {
            let me: SharedFiber = operations::active_fiber().expect("entry runs on a fiber");
            me.request_interruption(true);

            let disabler = crate::runtime::scheduler::interruption::DisableInterruption::new();
            let deadline: Instant = Instant::now() + Duration::from_millis(30);
            let guard = waiter_lock.lock();
            if operations::instance().wait_until(deadline, guard).is_err() {
                in_scope.set(true);
            }
            drop(disabler);

            if let Err(e) = operations::interruption_point() {
                after_scope.set(e.errno == libc::EINTR);
            }
            Ok(())
        })?;
        handle.join()?;

        crate::ensure_eq!(raised_in_scope.get(), false);
        crate::ensure_eq!(raised_after_scope.get(), true);

        Ok(())
    }

    /// A detached fiber's storage goes away with the switch that returns from its termination.
    #[test]
    fn detached_fiber_is_reclaimed_on_termination() -> Result<()> {
        let handle: FiberHandle = operations::spawn("detached", || Ok(()))?;
        let weak: Weak<Fiber> = {
            let fiber: SharedFiber = handle.fiber();
            fiber.downgrade()
        };
        handle.detach();

        let mut fm: SharedFiberManager = operations::instance();
        for _ in 0..8 {
            if weak.upgrade().is_none() {
                break;
            }
            fm.run();
        }
        crate::ensure_eq!(weak.upgrade().is_none(), true);

        Ok(())
    }

    //==================================================================================================================
    // Laws
    //==================================================================================================================

    /// A signaller that sets its predicate and wakes the waiter while holding the lock cannot
    /// lose the wakeup: the waiter's next return from `wait` observes the predicate.
    #[test]
    fn lock_handoff_wakeup_is_not_lost() -> Result<()> {
        let lock: Arc<SpinLock> = Arc::new(SpinLock::new());
        let predicate: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let observed: Rc<Cell<bool>> = Rc::new(Cell::new(false));

        let handle: FiberHandle = operations::spawn("waiter", {
            let lock: Arc<SpinLock> = lock.clone();
            let predicate: Arc<AtomicBool> = predicate.clone();
            let observed: Rc<Cell<bool>> = observed.clone();
            move || {
                let mut fm: SharedFiberManager = operations::instance();
                loop {
                    let guard = lock.lock();
                    if predicate.load(Ordering::Acquire) {
                        break;
                    }
                    fm.wait(guard)?;
                }
                observed.set(true);
                Ok(())
            }
        })?;

        let signaller: thread::JoinHandle<()> = thread::spawn({
            let lock: Arc<SpinLock> = lock.clone();
            let predicate: Arc<AtomicBool> = predicate.clone();
            let target: SharedFiber = handle.fiber();
            move || {
                thread::sleep(Duration::from_millis(20));
                let _guard = lock.lock();
                predicate.store(true, Ordering::Release);
                operations::awakened(&target);
            }
        });

        handle.join()?;
        signaller.join().unwrap();

        crate::ensure_eq!(observed.get(), true);

        Ok(())
    }

    /// `wait_until` returns false exactly when the deadline has passed at return.
    #[test]
    fn wait_until_reports_timeout() -> Result<()> {
        let outcome: Rc<Cell<Option<(bool, bool)>>> = Rc::new(Cell::new(None));

        let recorded: Rc<Cell<Option<(bool, bool)>>> = outcome.clone();
        let handle: FiberHandle = operations::spawn("sleeper", move || {
            let lock: SpinLock = SpinLock::new();
            let deadline: Instant = Instant::now() + Duration::from_millis(30);
            let guard = lock.lock();
            let not_expired: bool = operations::instance().wait_until(deadline, guard)?;
            recorded.set(Some((not_expired, Instant::now() >= deadline)));
            Ok(())
        })?;
        handle.join()?;

        crate::ensure_eq!(outcome.get(), Some((false, true)));

        Ok(())
    }

    /// An external wakeup before the deadline is not a timeout.
    #[test]
    fn wait_until_early_wakeup_is_not_a_timeout() -> Result<()> {
        let lock: Arc<SpinLock> = Arc::new(SpinLock::new());
        let outcome: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));

        let waiter_lock: Arc<SpinLock> = lock.clone();
        let recorded: Rc<Cell<Option<bool>>> = outcome.clone();
        let handle: FiberHandle = operations::spawn("waiter", move || {
            let deadline: Instant = Instant::now() + Duration::from_secs(10);
            let guard = waiter_lock.lock();
            let not_expired: bool = operations::instance().wait_until(deadline, guard)?;
            recorded.set(Some(not_expired));
            Ok(())
        })?;

        let signaller: thread::JoinHandle<()> = thread::spawn({
            let lock: Arc<SpinLock> = lock.clone();
            let target: SharedFiber = handle.fiber();
            move || {
                thread::sleep(Duration::from_millis(20));
                let _guard = lock.lock();
                operations::awakened(&target);
            }
        });

        handle.join()?;
        signaller.join().unwrap();

        crate::ensure_eq!(outcome.get(), Some(true));

        Ok(())
    }

    //==================================================================================================================
    // Pluggability and migration
    //==================================================================================================================

    struct LastInFirstOut {
        ready_stack: Vec<SharedFiber>,
    }

    impl SchedulingAlgorithm for LastInFirstOut {
        fn awakened(&mut self, fiber: SharedFiber) {
            self.ready_stack.push(fiber);
        }

        fn pick_next(&mut self) -> Option<SharedFiber> {
            self.ready_stack.pop()
        }
    }

    /// A custom algorithm fully controls dispatch order.
    #[test]
    fn custom_algorithm_overrides_dispatch_order() -> Result<()> {
        let mut fm: SharedFiberManager = SharedFiberManager::with_algorithm(
            SchedulerConfig::default(),
            Box::new(LastInFirstOut { ready_stack: Vec::new() }),
        );
        let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let order: Rc<RefCell<Vec<String>>> = order.clone();
            let name_owned: String = name.to_string();
            let fiber: SharedFiber = SharedFiber::new(
                name,
                Box::new(move || {
                    order.borrow_mut().push(name_owned);
                    Ok(())
                }),
            )?;
            fm.spawn(fiber)?;
        }

        for _ in 0..3 {
            fm.run();
        }

        let recorded: Vec<String> = order.borrow().clone();
        crate::ensure_eq!(recorded, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
        crate::ensure_eq!(fm.active_fiber().is_none(), true);

        Ok(())
    }

    /// A fiber created on one thread can be handed to another thread's scheduler before its
    /// first dispatch.
    #[test]
    fn migrate_adopts_fiber_from_another_thread() -> Result<()> {
        let ran: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

        let flag: Arc<AtomicBool> = ran.clone();
        let fiber: SharedFiber = SharedFiber::new(
            "migrant",
            Box::new(move || {
                flag.store(true, Ordering::Release);
                Ok(())
            }),
        )?;

        let worker: thread::JoinHandle<()> = thread::spawn(move || {
            let mut fm: SharedFiberManager = operations::instance();
            fm.migrate(fiber).expect("migrate should succeed");
        });
        worker.join().unwrap();

        crate::ensure_eq!(ran.load(Ordering::Acquire), true);

        Ok(())
    }

    /// After joining everything the manager holds no fibers.
    #[test]
    fn scheduler_is_quiescent_after_joining_everything() -> Result<()> {
        let mut handles: Vec<FiberHandle> = Vec::new();
        for name in ["x", "y"] {
            handles.push(operations::spawn(name, || {
                operations::yield_now();
                Ok(())
            })?);
        }
        for handle in handles {
            handle.join()?;
        }

        let fm: SharedFiberManager = operations::instance();
        crate::ensure_eq!(fm.active_fiber().is_none(), true);
        crate::ensure_eq!(fm.wait_queue.is_empty(), true);

        Ok(())
    }
}

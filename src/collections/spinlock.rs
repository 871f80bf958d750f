// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    hint,
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Busy-waiting lock guarding the tiny handoff window between a parking fiber and an external
/// signaller. Hold times are a handful of instructions, so spinning beats a full mutex here.
pub struct SpinLock {
    locked: AtomicBool,
}

/// Scoped ownership of a [SpinLock]. The lock is released when the guard drops.
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Spin Locks
impl SpinLock {
    /// Creates an unlocked spin lock.
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock, spinning until it becomes available.
    pub fn lock(&self) -> SpinLockGuard<'_> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }

    /// Attempts to acquire the lock without spinning.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_>> {
        match self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Some(SpinLockGuard { lock: self }),
            Err(_) => None,
        }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::SpinLock;
    use ::anyhow::Result;
    use ::std::{
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        thread,
    };

    #[test]
    fn lock_provides_mutual_exclusion() -> Result<()> {
        const NUM_THREADS: usize = 4;
        const NUM_ITERATIONS: usize = 1000;

        let lock: Arc<SpinLock> = Arc::new(SpinLock::new());
        let total: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

        // Racing non-atomic increments; the lock is the only thing keeping them exclusive.
        let mut handles: Vec<thread::JoinHandle<()>> = Vec::with_capacity(NUM_THREADS);
        for _ in 0..NUM_THREADS {
            let lock: Arc<SpinLock> = lock.clone();
            let total: Arc<AtomicUsize> = total.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..NUM_ITERATIONS {
                    let _guard = lock.lock();
                    let current: usize = total.load(Ordering::Relaxed);
                    total.store(current + 1, Ordering::Relaxed);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        crate::ensure_eq!(total.load(Ordering::Relaxed), NUM_THREADS * NUM_ITERATIONS);

        Ok(())
    }

    #[test]
    fn try_lock_fails_while_held() -> Result<()> {
        let lock: SpinLock = SpinLock::new();

        let guard = lock.lock();
        crate::ensure_eq!(lock.try_lock().is_none(), true);
        drop(guard);
        crate::ensure_eq!(lock.try_lock().is_some(), true);

        Ok(())
    }
}

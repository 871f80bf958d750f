// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Low-level context-switch primitive. A [Context] holds the machine state of a suspended fiber
//! (or of the thread driving the scheduler); [Context::switch] suspends the current execution and
//! resumes another one.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::stack::Stack,
};
use ::std::{
    mem,
    ptr,
};

#[cfg(not(target_os = "linux"))]
compile_error!("strand only supports Linux");

//==============================================================================
// Structures
//==============================================================================

/// Saved machine state. Built on POSIX ucontext.
///
/// A context must not move in memory once it has been initialized or saved into: the saved state
/// contains pointers back into the structure itself. Contexts therefore live inside heap-pinned
/// shared objects for their whole lifetime.
pub struct Context {
    inner: libc::ucontext_t,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Contexts
impl Context {
    /// Creates an empty context. It becomes valid either by being initialized with an entry
    /// function or by being saved into during a switch.
    pub fn new() -> Self {
        Self {
            inner: unsafe { mem::zeroed() },
        }
    }

    /// Sets this context up so that switching to it enters `entry(arg0, arg1)` on `stack`.
    /// The entry function must never return; it hands the thread back with a final switch.
    pub fn initialize(
        &mut self,
        stack: &Stack,
        entry: extern "C" fn(usize, usize),
        arg0: usize,
        arg1: usize,
    ) -> Result<(), Fail> {
        if unsafe { libc::getcontext(&mut self.inner) } != 0 {
            let cause: String = "cannot initialize context (getcontext failed)".to_string();
            error!("initialize(): {}", cause);
            return Err(Fail::new(libc::EAGAIN, &cause));
        }
        self.inner.uc_stack.ss_sp = stack.bottom() as *mut libc::c_void;
        self.inner.uc_stack.ss_size = stack.len();
        self.inner.uc_stack.ss_flags = 0;
        // No successor context: the entry function switches away explicitly and never returns.
        self.inner.uc_link = ptr::null_mut();

        // makecontext() forwards each argument as a full machine word, but only 32 bits per
        // argument are portable. Callers split wider values across argument pairs.
        let entry: extern "C" fn() = unsafe { mem::transmute::<extern "C" fn(usize, usize), extern "C" fn()>(entry) };
        unsafe { libc::makecontext(&mut self.inner, entry, 2, arg0, arg1) };
        Ok(())
    }

    /// Saves the current execution into `from` and resumes `to`. Returns when some other switch
    /// later resumes `from`.
    pub unsafe fn switch(from: &mut Context, to: &Context) {
        let rc: libc::c_int = libc::swapcontext(&mut from.inner, &to.inner);
        assert_eq!(rc, 0, "swapcontext failed");
    }
}

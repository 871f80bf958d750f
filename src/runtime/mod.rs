// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod fail;
pub mod limits;
pub mod logging;
pub mod scheduler;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    convert::{
        AsMut,
        AsRef,
    },
    ops::{
        Deref,
        DerefMut,
    },
    sync::Arc,
};

#[cfg(test)]
use ::std::sync::Weak;

//======================================================================================================================
// Structures
//======================================================================================================================

/// The SharedObject wraps an object that will be shared across fibers.
pub struct SharedObject<T>(Arc<T>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Arc::new(object))
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> Weak<T> {
        Arc::downgrade(&self.0)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Dereferences a shared object for use.
impl<T> Deref for SharedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

/// Dereferences a mutable reference to a shared object for use. This breaks Rust's ownership model because it allows
/// more than one mutable dereference of a shared object at a time. Strand requires this because the manager and every
/// parked fiber stack hold references to the same shared structures at the same time; however, Strand also ensures
/// that only one fiber runs on the owning thread at a time. Due to this design, Rust's static borrow checker is not
/// able to ensure memory safety and we have chosen not to use the dynamic borrow checker. Instead, shared objects
/// should be used judiciously with the understanding that the shared object may change/be mutated whenever a fiber
/// suspends. Fields that a foreign thread may touch must be atomic.
impl<T> DerefMut for SharedObject<T> {
    fn deref_mut<'a>(&'a mut self) -> &'a mut Self::Target {
        let ptr: *mut T = Arc::as_ptr(&self.0) as *mut T;
        unsafe { &mut *ptr }
    }
}

/// Returns a reference to the interior object, which is borrowed for directly accessing the value. Generally deref
/// should be used unless you absolutely need to borrow the reference.
impl<T> AsRef<T> for SharedObject<T> {
    fn as_ref(&self) -> &T {
        self.0.as_ref()
    }
}

/// Returns a mutable reference to the interior object. Similar to DerefMut, this breaks Rust's ownership properties
/// and should be considered unsafe. However, it is safe to use in Strand if and only if we only run one fiber per
/// scheduler at a time.
impl<T> AsMut<T> for SharedObject<T> {
    fn as_mut<'a>(&'a mut self) -> &'a mut T {
        let ptr: *mut T = Arc::as_ptr(&self.0) as *mut T;
        unsafe { &mut *ptr }
    }
}

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

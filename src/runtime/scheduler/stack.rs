// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    fail::Fail,
    limits,
};
use ::std::alloc::{
    alloc,
    dealloc,
    Layout,
};

//==============================================================================
// Structures
//==============================================================================

/// Owned stack memory for a single fiber. Freed when the fiber is dropped.
pub struct Stack {
    /// Lowest address of the allocation.
    base: *mut u8,
    layout: Layout,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Stacks
impl Stack {
    /// Allocates a stack of at least `size` bytes. Sizes below [limits::MIN_STACK_SIZE] are
    /// rounded up.
    pub fn new(size: usize) -> Result<Self, Fail> {
        let size: usize = size.max(limits::MIN_STACK_SIZE);
        let layout: Layout = match Layout::from_size_align(size, limits::STACK_ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => {
                let cause: String = format!("invalid stack layout (size={:?})", size);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let base: *mut u8 = unsafe { alloc(layout) };
        if base.is_null() {
            let cause: String = format!("cannot allocate stack (size={:?})", size);
            error!("new(): {}", cause);
            return Err(Fail::new(libc::ENOMEM, &cause));
        }
        Ok(Self { base, layout })
    }

    /// Returns the lowest address of the stack.
    pub fn bottom(&self) -> *mut u8 {
        self.base
    }

    /// Returns the size of the stack in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::Stack;
    use crate::runtime::limits;
    use ::anyhow::Result;

    #[test]
    fn new_rounds_undersized_requests_up() -> Result<()> {
        let stack: Stack = Stack::new(1)?;
        crate::ensure_eq!(stack.len(), limits::MIN_STACK_SIZE);
        Ok(())
    }

    #[test]
    fn new_honors_requested_size() -> Result<()> {
        let stack: Stack = Stack::new(limits::DEFAULT_STACK_SIZE)?;
        crate::ensure_eq!(stack.len(), limits::DEFAULT_STACK_SIZE);
        crate::ensure_eq!(stack.bottom().is_null(), false);
        Ok(())
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Scoped control over interruption delivery. Based on the thread-interruption discipline: the
//! pending flag can be set at any time, but it is only delivered at interruption points while
//! delivery is enabled.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::scheduler::operations;

//==============================================================================
// Structures
//==============================================================================

/// Blocks interruption delivery to the active fiber for the guard's scope. Restores the prior
/// setting on every exit path, including unwinding. Nesting is harmless: only the outermost
/// guard actually flips the flag.
pub struct DisableInterruption {
    /// Whether delivery was already blocked when this guard was built.
    was_blocked: bool,
}

/// Temporarily re-enables interruption delivery inside a [DisableInterruption] scope.
pub struct RestoreInterruption<'a> {
    disabler: &'a DisableInterruption,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl DisableInterruption {
    pub fn new() -> Self {
        match operations::active_fiber() {
            Some(fiber) => {
                let was_blocked: bool = fiber.interruption_blocked();
                if !was_blocked {
                    fiber.set_interruption_blocked(true);
                }
                Self { was_blocked }
            },
            // No active fiber: nothing to block, nothing to restore.
            None => Self { was_blocked: true },
        }
    }
}

impl<'a> RestoreInterruption<'a> {
    pub fn new(disabler: &'a DisableInterruption) -> Self {
        if !disabler.was_blocked {
            if let Some(fiber) = operations::active_fiber() {
                fiber.set_interruption_blocked(false);
            }
        }
        Self { disabler }
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for DisableInterruption {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DisableInterruption {
    fn drop(&mut self) {
        if !self.was_blocked {
            if let Some(fiber) = operations::active_fiber() {
                fiber.set_interruption_blocked(false);
            }
        }
    }
}

impl Drop for RestoreInterruption<'_> {
    fn drop(&mut self) {
        if !self.disabler.was_blocked {
            if let Some(fiber) = operations::active_fiber() {
                fiber.set_interruption_blocked(true);
            }
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::time::Duration;

//==============================================================================
// Constants
//==============================================================================

/// Smallest stack a fiber may be given. Requests below this are silently rounded up; the
/// trampoline, logging, and unwinding machinery all run on the fiber stack.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Default fiber stack size.
pub const DEFAULT_STACK_SIZE: usize = 128 * 1024;

/// Alignment for fiber stacks.
pub const STACK_ALIGNMENT: usize = 16;

/// How long the driving thread sleeps when no fiber is runnable and no timed wakeup is
/// pending. This bounds the latency of externally-signalled wakeups.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(10);

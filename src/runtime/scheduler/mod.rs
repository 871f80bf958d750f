// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Implementation of our cooperative, single-threaded fiber scheduler.
//!
//! Each OS thread owns at most one [FiberManager](scheduler::FiberManager). Fibers suspend only at
//! explicit scheduler entry points (`yield_now`, `wait`, `wait_until`, `join`) and hand the thread
//! over through a saved-context switch. Waiting fibers sit on a deadline-keyed wait queue and are
//! promoted back to the scheduling algorithm by a sweep that runs before every dispatch.

mod context;
mod stack;
mod wait_queue;

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod algorithm;
pub mod config;
pub mod fiber;
pub mod handle;
pub mod interruption;
pub mod operations;
pub mod scheduler;

pub use self::{
    algorithm::{
        RoundRobin,
        SchedulingAlgorithm,
    },
    config::SchedulerConfig,
    fiber::{
        FiberId,
        FiberState,
        SharedFiber,
    },
    handle::FiberHandle,
    interruption::{
        DisableInterruption,
        RestoreInterruption,
    },
    scheduler::SharedFiberManager,
};

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod collections;

pub mod runtime;

#[macro_use]
extern crate log;

pub use crate::{
    collections::spinlock::{
        SpinLock,
        SpinLockGuard,
    },
    runtime::{
        fail::Fail,
        scheduler::{
            operations,
            DisableInterruption,
            FiberHandle,
            FiberId,
            FiberState,
            RestoreInterruption,
            RoundRobin,
            SchedulerConfig,
            SchedulingAlgorithm,
            SharedFiber,
            SharedFiberManager,
        },
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the calling test otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        let (left, right) = (&$left, &$right);
        if *left != *right {
            ::anyhow::bail!(
                "ensure failed: `{} == {}` (left={:?}, right={:?})",
                stringify!($left),
                stringify!($right),
                left,
                right
            );
        }
    }};
}

/// Ensures that two expressions are not equal, bailing out of the calling test otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr) => {{
        let (left, right) = (&$left, &$right);
        if *left == *right {
            ::anyhow::bail!(
                "ensure failed: `{} != {}` (left={:?}, right={:?})",
                stringify!($left),
                stringify!($right),
                left,
                right
            );
        }
    }};
}

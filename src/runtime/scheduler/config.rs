// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::limits;
use ::std::{
    env,
    time::Duration,
};

//==============================================================================
// Structures
//==============================================================================

/// Tunables of a fiber manager.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on how long the driving thread sleeps with nothing runnable.
    pub wait_interval: Duration,
    /// Stack size given to fibers spawned without an explicit size.
    pub stack_size: usize,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl SchedulerConfig {
    /// Builds a configuration from the environment, falling back to the defaults for unset or
    /// unparsable variables.
    pub fn from_env() -> Self {
        let mut config: SchedulerConfig = SchedulerConfig::default();
        if let Ok(value) = env::var("STRAND_WAIT_INTERVAL_MS") {
            match value.parse::<u64>() {
                Ok(ms) => config.wait_interval = Duration::from_millis(ms),
                Err(_) => warn!("from_env(): ignoring invalid STRAND_WAIT_INTERVAL_MS (value={:?})", value),
            }
        }
        if let Ok(value) = env::var("STRAND_STACK_SIZE") {
            match value.parse::<usize>() {
                Ok(size) => config.stack_size = size,
                Err(_) => warn!("from_env(): ignoring invalid STRAND_STACK_SIZE (value={:?})", value),
            }
        }
        config
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_interval: limits::DEFAULT_WAIT_INTERVAL,
            stack_size: limits::DEFAULT_STACK_SIZE,
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::SchedulerConfig;
    use crate::runtime::limits;
    use ::anyhow::Result;
    use ::std::time::Duration;

    #[test]
    fn default_matches_limits() -> Result<()> {
        let config: SchedulerConfig = SchedulerConfig::default();
        crate::ensure_eq!(config.wait_interval, limits::DEFAULT_WAIT_INTERVAL);
        crate::ensure_eq!(config.stack_size, limits::DEFAULT_STACK_SIZE);
        Ok(())
    }

    #[test]
    fn from_env_overrides_defaults() -> Result<()> {
        std::env::set_var("STRAND_WAIT_INTERVAL_MS", "25");
        std::env::set_var("STRAND_STACK_SIZE", "262144");
        let config: SchedulerConfig = SchedulerConfig::from_env();
        std::env::remove_var("STRAND_WAIT_INTERVAL_MS");
        std::env::remove_var("STRAND_STACK_SIZE");

        crate::ensure_eq!(config.wait_interval, Duration::from_millis(25));
        crate::ensure_eq!(config.stack_size, 262144);

        Ok(())
    }
}

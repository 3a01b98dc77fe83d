//! Loop configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! ```rust,ignore
//! use evloop_runtime::config::LoopConfig;
//!
//! // Process-wide table, built from the environment on first use
//! let config = LoopConfig::global();
//!
//! // Or customize programmatically for a private loop
//! let config = LoopConfig::from_env().max_events(16).trace_dispatch(true);
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use evloop_core::env::{env_get, env_get_bool};

/// Default epoll event buffer size per wait
pub const DEFAULT_MAX_EVENTS: usize = 64;

/// Dispatcher configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Events fetched from the kernel per wait (epoll backend)
    pub max_events: usize,
    /// Log every dispatched callback at trace level
    pub trace_dispatch: bool,
    /// Extra wait added to millisecond-rounded timeouts (poll backend)
    pub timer_slack: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            trace_dispatch: false,
            timer_slack: Duration::ZERO,
        }
    }
}

impl LoopConfig {
    /// Library defaults overridden by environment variables
    ///
    /// - `EVL_MAX_EVENTS` - epoll event buffer size (min 1)
    /// - `EVL_TRACE_DISPATCH` - trace each callback (0/1)
    /// - `EVL_TIMER_SLACK_US` - poll backend wait slack in microseconds
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_events: env_get("EVL_MAX_EVENTS", defaults.max_events).max(1),
            trace_dispatch: env_get_bool("EVL_TRACE_DISPATCH", defaults.trace_dispatch),
            timer_slack: Duration::from_micros(env_get("EVL_TIMER_SLACK_US", 0u64)),
        }
    }

    /// Process-wide configuration, read from the environment once
    pub fn global() -> &'static LoopConfig {
        static GLOBAL: OnceLock<LoopConfig> = OnceLock::new();
        GLOBAL.get_or_init(LoopConfig::from_env)
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n.max(1);
        self
    }

    pub fn trace_dispatch(mut self, enabled: bool) -> Self {
        self.trace_dispatch = enabled;
        self
    }

    pub fn timer_slack(mut self, slack: Duration) -> Self {
        self.timer_slack = slack;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LoopConfig::default()
            .max_events(0)
            .trace_dispatch(true)
            .timer_slack(Duration::from_micros(250));
        assert_eq!(config.max_events, 1);
        assert!(config.trace_dispatch);
        assert_eq!(config.timer_slack, Duration::from_micros(250));
    }

    #[test]
    fn test_global_is_stable() {
        let a = LoopConfig::global() as *const LoopConfig;
        let b = LoopConfig::global() as *const LoopConfig;
        assert_eq!(a, b);
        assert!(LoopConfig::global().max_events >= 1);
    }
}

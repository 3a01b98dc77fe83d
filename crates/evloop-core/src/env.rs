//! Environment variable utilities
//!
//! ```ignore
//! use evloop_core::env::{env_get, env_get_bool};
//!
//! let max_events: usize = env_get("EVL_MAX_EVENTS", 64);
//! let trace = env_get_bool("EVL_TRACE_DISPATCH", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or malformed
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`; `None` when unset or malformed
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true
///
/// Any other value is false; `default` applies only when unset.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__EVL_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<u32>("__EVL_TEST_UNSET__").is_none());
        assert!(env_get_bool("__EVL_TEST_UNSET__", true));
    }

    #[test]
    fn test_env_get_set_and_invalid() {
        std::env::set_var("__EVL_TEST_NUM__", " 128 ");
        assert_eq!(env_get::<usize>("__EVL_TEST_NUM__", 0), 128);

        std::env::set_var("__EVL_TEST_NUM__", "lots");
        assert_eq!(env_get::<usize>("__EVL_TEST_NUM__", 7), 7);
        std::env::remove_var("__EVL_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (val, expected) in [("1", true), ("YES", true), ("on", true), ("0", false), ("nope", false)] {
            std::env::set_var("__EVL_TEST_BOOL__", val);
            assert_eq!(env_get_bool("__EVL_TEST_BOOL__", !expected), expected, "value {:?}", val);
        }
        std::env::remove_var("__EVL_TEST_BOOL__");
    }
}

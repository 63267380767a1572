//! Environment variable helpers
//!
//! Generic `env_get<T>` parses a variable with a fallback default. Used by
//! the logging macros and by the runtime configuration.
//!
//! # Usage
//!
//! ```ignore
//! use pkit_core::env::{env_get, env_get_bool};
//!
//! let stack: usize = env_get("PKIT_WORKER_STACK_SIZE", 64 * 1024);
//! let flush = env_get_bool("PKIT_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Parse variable `key` as `T`, or return `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Boolean variable: "1", "true", "yes", "on" (any case) mean true
///
/// A set variable with any other value is false; unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` when the variable is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable name, tests run in parallel

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__PKIT_TEST_UNSET_1__", 42);
        assert_eq!(val, 42);
        assert!(!env_is_set("__PKIT_TEST_UNSET_1__"));
        assert_eq!(env_get_str("__PKIT_TEST_UNSET_1__", "dflt"), "dflt");
    }

    #[test]
    fn test_env_get_parsed() {
        std::env::set_var("__PKIT_TEST_NUM__", " 123 ");
        let val: usize = env_get("__PKIT_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__PKIT_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__PKIT_TEST_BAD__", "not_a_number");
        let val: u64 = env_get("__PKIT_TEST_BAD__", 99);
        assert_eq!(val, 99);
        let opt: Option<u64> = env_get_opt("__PKIT_TEST_BAD__");
        assert!(opt.is_none());
        std::env::remove_var("__PKIT_TEST_BAD__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, expect) in [("1", true), ("TRUE", true), ("yes", true), ("on", true), ("0", false), ("garbage", false)] {
            std::env::set_var("__PKIT_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__PKIT_TEST_BOOL__", !expect), expect, "value {:?}", raw);
        }
        std::env::remove_var("__PKIT_TEST_BOOL__");
        assert!(env_get_bool("__PKIT_TEST_BOOL__", true));
    }
}

//! Environment variable parsing helpers
//!
//! ```ignore
//! use webd_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("WEBD_WORKERS", 4);
//! let flush: bool = env_get_bool("WEBD_LOG_FLUSH", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Works with any type that implements `FromStr`; unset or unparseable
/// values fall back to the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Everything else (including unset) returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let v: usize = env_get("WEBD_TEST_UNSET_VAR_XYZ", 7);
        assert_eq!(v, 7);
    }

    #[test]
    fn test_env_get_parse() {
        std::env::set_var("WEBD_TEST_PARSE_VAR", "123");
        let v: u64 = env_get("WEBD_TEST_PARSE_VAR", 0);
        assert_eq!(v, 123);
        std::env::remove_var("WEBD_TEST_PARSE_VAR");
    }

    #[test]
    fn test_env_get_bool() {
        std::env::set_var("WEBD_TEST_BOOL_VAR", "yes");
        assert!(env_get_bool("WEBD_TEST_BOOL_VAR", false));
        std::env::set_var("WEBD_TEST_BOOL_VAR", "nope");
        assert!(!env_get_bool("WEBD_TEST_BOOL_VAR", true));
        std::env::remove_var("WEBD_TEST_BOOL_VAR");
    }
}

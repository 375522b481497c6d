//! Environment variable utilities
//!
//! Typed lookups with defaults, used by the config layers of the runtime,
//! net and http crates.
//!
//! ```ignore
//! use fiberio_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let contexts: usize = env_get("FIO_NUM_CONTEXTS", 4);
//! let signals = env_get_bool("FIO_HANDLE_SIGNALS", true);
//! let timeout = env_get_millis("FIO_CONNECT_TIMEOUT_MS", 2000);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as `T`, or `default` when unset or
/// unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// "1", "true", "yes", "on" (any case) are true, "0", "false", "no", "off"
/// are false. Anything else, including unset, yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Get environment variable as optional value.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable holding a millisecond count as a `Duration`.
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

//! Environment variable parsing utilities.
//!
//! Type-safe helpers for reading replay configuration from the environment
//! with default values.
//!
//! # Example
//!
//! ```
//! use avm_replay_types::env_utils::{env_bool_or, env_var};
//!
//! let stop_on_entry = env_bool_or("AVM_REPLAY_STOP_ON_ENTRY", true);
//! let root: Option<String> = env_var("AVM_REPLAY_SOURCE_ROOT");
//! ```

use std::str::FromStr;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parse an environment variable with a default value.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Check if an environment variable is set to a truthy value.
///
/// Returns `true` if the variable is set to "1", "true", "yes", or "on" (case-insensitive).
pub fn env_bool(key: &str) -> bool {
    std::env::var(key).ok().map(|v| is_truthy(&v)).unwrap_or(false)
}

/// Check if an environment variable is set to a truthy value, with a default
/// used when the variable is absent.
pub fn env_bool_or(key: &str, default: bool) -> bool {
    match std::env::var(key).ok() {
        Some(v) => is_truthy(&v),
        None => default,
    }
}

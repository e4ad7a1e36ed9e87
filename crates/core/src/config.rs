//! Environment variable parsing shared by the API and worker configs.
//!
//! Missing variables fall back to the supplied default; present but
//! unparseable values are reported as [`CoreError::Validation`] so the
//! binaries fail fast at startup instead of running with a silent default.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::CoreError;

/// Read `key` and parse it, returning `default` when unset.
pub fn env_or<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

/// Read `key` and parse it, returning `None` when unset or blank.
pub fn env_opt<T>(key: &str) -> Result<Option<T>, CoreError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CoreError::Validation(format!("{key} has invalid value '{raw}': {e}"))),
        Err(_) => Ok(None),
    }
}

/// Read a comma-separated list, dropping empty items.
pub fn env_list(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

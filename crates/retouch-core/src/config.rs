//! Session configuration loaded from environment variables.
//!
//! All settings have sensible defaults so an editor session can start with
//! zero configuration.

use std::path::PathBuf;

use retouch_shared::constants::{DEFAULT_CACHE_MAX_BYTES, DEFAULT_CACHE_MAX_ENTRIES};
use retouch_store::EvictionPolicy;

/// Editor session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// SQLite database file holding history and cached results.
    /// Env: `RETOUCH_DB_PATH`
    /// Default: platform data directory (see `retouch_store::Database::new`).
    pub db_path: Option<PathBuf>,

    /// Whether every history mutation is written through to storage so a
    /// reload restores the session.
    /// Env: `RETOUCH_PERSIST_HISTORY` (true/false)
    /// Default: `true`
    pub persist_history: bool,

    /// Result cache limits, applied after each cache write.
    /// Env: `RETOUCH_CACHE_MAX_ENTRIES`, `RETOUCH_CACHE_MAX_BYTES`
    /// (`0` = unlimited)
    /// Default: 512 entries, 1 GiB
    pub cache_policy: EvictionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            persist_history: true,
            cache_policy: EvictionPolicy {
                max_entries: Some(DEFAULT_CACHE_MAX_ENTRIES),
                max_bytes: Some(DEFAULT_CACHE_MAX_BYTES),
            },
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = var("RETOUCH_DB_PATH") {
            if !path.trim().is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = var("RETOUCH_PERSIST_HISTORY") {
            config.persist_history = val != "false" && val != "0";
        }

        if let Some(val) = var("RETOUCH_CACHE_MAX_ENTRIES") {
            match val.parse::<usize>() {
                Ok(0) => config.cache_policy.max_entries = None,
                Ok(n) => config.cache_policy.max_entries = Some(n),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid RETOUCH_CACHE_MAX_ENTRIES, using default");
                }
            }
        }

        if let Some(val) = var("RETOUCH_CACHE_MAX_BYTES") {
            match val.parse::<u64>() {
                Ok(0) => config.cache_policy.max_bytes = None,
                Ok(n) => config.cache_policy.max_bytes = Some(n),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid RETOUCH_CACHE_MAX_BYTES, using default");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> SessionConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SessionConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.db_path.is_none());
        assert!(config.persist_history);
        assert_eq!(
            config.cache_policy.max_entries,
            Some(DEFAULT_CACHE_MAX_ENTRIES)
        );
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = from_map(&[
            ("RETOUCH_DB_PATH", "/tmp/retouch.db"),
            ("RETOUCH_PERSIST_HISTORY", "false"),
            ("RETOUCH_CACHE_MAX_ENTRIES", "10"),
            ("RETOUCH_CACHE_MAX_BYTES", "0"),
        ]);

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/retouch.db")));
        assert!(!config.persist_history);
        assert_eq!(config.cache_policy.max_entries, Some(10));
        assert_eq!(config.cache_policy.max_bytes, None);
    }

    #[test]
    fn test_invalid_number_keeps_default() {
        let config = from_map(&[("RETOUCH_CACHE_MAX_ENTRIES", "lots")]);
        assert_eq!(
            config.cache_policy.max_entries,
            Some(DEFAULT_CACHE_MAX_ENTRIES)
        );
    }
}

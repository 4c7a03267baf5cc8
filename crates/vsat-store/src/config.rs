//! Result store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the store root.
pub const ROOT_ENV: &str = "VSAT_RESULT_ROOT";

/// Environment variable overriding the poll interval (milliseconds).
pub const POLL_INTERVAL_ENV: &str = "VSAT_POLL_INTERVAL_MS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Result store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one `<task_uuid>.json` document per record.
    pub root: PathBuf,

    /// How often a blocking read re-checks a record written by another process.
    pub poll_interval: Duration,
}

impl StoreConfig {
    /// Create a config rooted at `root` with the default poll interval.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Defaults overridden by `VSAT_RESULT_ROOT` and `VSAT_POLL_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var(ROOT_ENV) {
            config.root = PathBuf::from(root);
        }

        if let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) {
            match raw.parse::<u64>() {
                Ok(0) => {
                    tracing::warn!(value = %raw, "Ignoring {}: must be at least 1", POLL_INTERVAL_ENV)
                }
                Ok(ms) => config.poll_interval = Duration::from_millis(ms),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring invalid {}", POLL_INTERVAL_ENV)
                }
            }
        }

        config
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("vsat-results"),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.root.ends_with("vsat-results"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_from_env() {
        // Only test in this crate that touches the process environment.
        std::env::set_var(ROOT_ENV, "/srv/vsat");
        std::env::set_var(POLL_INTERVAL_ENV, "40");
        let config = StoreConfig::from_env();
        assert_eq!(config.root, PathBuf::from("/srv/vsat"));
        assert_eq!(config.poll_interval, Duration::from_millis(40));

        for rejected in ["0", "-5", "soon"] {
            std::env::set_var(POLL_INTERVAL_ENV, rejected);
            assert_eq!(
                StoreConfig::from_env().poll_interval,
                Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                "{rejected:?} should fall back to the default"
            );
        }

        std::env::remove_var(ROOT_ENV);
        std::env::remove_var(POLL_INTERVAL_ENV);
        let config = StoreConfig::from_env();
        assert_eq!(config.root, StoreConfig::default().root);
        assert_eq!(config.poll_interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new("/var/lib/vsat").with_poll_interval(Duration::from_millis(10));
        assert_eq!(config.root, PathBuf::from("/var/lib/vsat"));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }
}

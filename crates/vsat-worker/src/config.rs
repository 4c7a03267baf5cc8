//! Worker pool configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use vsat_store::StoreConfig;

/// Environment variable overriding the number of workers.
pub const WORKERS_ENV: &str = "VSAT_WORKERS";

/// Environment variable overriding the stop timeout (seconds).
pub const STOP_TIMEOUT_ENV: &str = "VSAT_STOP_TIMEOUT_SECS";

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Result store settings.
    pub store: StoreConfig,

    /// Number of workers in the pool.
    pub num_workers: usize,

    /// How long `stop` waits for each worker.
    pub stop_timeout: Duration,
}

impl Config {
    /// Defaults overridden from the environment.
    pub fn from_env() -> Self {
        let mut config = Self {
            store: StoreConfig::from_env(),
            ..Self::default()
        };

        if let Some(n) = parse_env::<NonZeroUsize>(WORKERS_ENV) {
            config.num_workers = n.get();
        }
        if let Some(secs) = parse_env::<u64>(STOP_TIMEOUT_ENV) {
            config.stop_timeout = Duration::from_secs(secs);
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            num_workers: 1,
            stop_timeout: Duration::from_secs(30),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "Ignoring invalid {}", name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.stop_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_env() {
        // Only test in this crate that touches the process environment.
        std::env::set_var(WORKERS_ENV, "20");
        std::env::set_var(STOP_TIMEOUT_ENV, "5");
        let config = Config::from_env();
        assert_eq!(config.num_workers, 20);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));

        for rejected in ["0", "-1", "many"] {
            std::env::set_var(WORKERS_ENV, rejected);
            assert_eq!(Config::from_env().num_workers, 1, "{rejected:?} should be ignored");
        }

        std::env::set_var(STOP_TIMEOUT_ENV, "later");
        assert_eq!(Config::from_env().stop_timeout, Duration::from_secs(30));

        std::env::remove_var(WORKERS_ENV);
        std::env::remove_var(STOP_TIMEOUT_ENV);
        let config = Config::from_env();
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.stop_timeout, Duration::from_secs(30));
    }
}

//! Runner configuration.

use serde::Deserialize;
use thiserror::Error;

/// Environment variable read by [`RunnerConfig::from_env`] for the concurrency ceiling.
pub const ENV_MAX_CONCURRENCY: &str = "TASKFLOW_MAX_CONCURRENCY";

/// Environment variable read by [`RunnerConfig::from_env`] to enable debug logging.
pub const ENV_DEBUG: &str = "TASKFLOW_DEBUG";

const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Error raised by invalid configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A runner with no workers would accept work and never run it.
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Configuration for a [`Runner`](crate::Runner).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum number of workers running tasks at once.
    pub max_concurrency: usize,
    /// Emit `debug!` events for worker lifecycle and task completion.
    pub debug_logging: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            debug_logging: false,
        }
    }
}

impl RunnerConfig {
    /// Set the concurrency ceiling.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Enable or disable debug logging.
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Check the configuration for values the runner cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Build a configuration from defaults overridden by the process environment.
    ///
    /// Reads [`ENV_MAX_CONCURRENCY`] and [`ENV_DEBUG`]. Unset variables keep
    /// their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            config.max_concurrency = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_MAX_CONCURRENCY,
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(ENV_DEBUG) {
            config.debug_logging = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_DEBUG,
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

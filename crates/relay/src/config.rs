//! Relay timing configuration.
//!
//! Defaults carry the reference timings; `from_env()` overlays `RELAY_*`
//! variables and fails fast on unparsable values.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Fallback re-check interval for a waiting submit.
    pub poll_interval: Duration,
    /// Ceiling on how long a submit waits for its result.
    pub wait_timeout: Duration,
    /// How often the executor is expected to poll. Owned by the executor;
    /// used here only to sanity-check the staleness threshold.
    pub executor_poll_interval: Duration,
    /// Executor counts as connected if it polled more recently than this.
    pub staleness_threshold: Duration,
    /// Extra time an unclaimed result is kept beyond `wait_timeout`.
    pub result_grace: Duration,
    pub sweep_interval: Duration,
    /// Reject deposits for ids that no submit is waiting on.
    pub reject_unknown_deposits: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            wait_timeout: Duration::from_secs(30),
            executor_poll_interval: Duration::from_millis(500),
            staleness_threshold: Duration::from_secs(3),
            result_grace: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            reject_unknown_deposits: false,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            poll_interval: millis(&lookup, "RELAY_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval),
            wait_timeout: seconds(&lookup, "RELAY_WAIT_TIMEOUT_SECS")?
                .unwrap_or(defaults.wait_timeout),
            executor_poll_interval: millis(&lookup, "RELAY_EXECUTOR_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.executor_poll_interval),
            staleness_threshold: seconds(&lookup, "RELAY_STALENESS_SECS")?
                .unwrap_or(defaults.staleness_threshold),
            result_grace: seconds(&lookup, "RELAY_RESULT_GRACE_SECS")?
                .unwrap_or(defaults.result_grace),
            sweep_interval: seconds(&lookup, "RELAY_SWEEP_INTERVAL_SECS")?
                .unwrap_or(defaults.sweep_interval),
            reject_unknown_deposits: flag(&lookup, "RELAY_REJECT_UNKNOWN_DEPOSITS")?
                .unwrap_or(defaults.reject_unknown_deposits),
        };

        for (var, value) in [
            ("RELAY_POLL_INTERVAL_MS", config.poll_interval),
            ("RELAY_WAIT_TIMEOUT_SECS", config.wait_timeout),
            ("RELAY_SWEEP_INTERVAL_SECS", config.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Zero { var });
            }
        }

        if config
            .wait_timeout
            .checked_add(config.result_grace)
            .is_none()
        {
            return Err(ConfigError::Invalid {
                var: "RELAY_RESULT_GRACE_SECS",
                expected: "small enough that wait timeout plus grace fits in a duration",
                value: config.result_grace.as_secs_f64().to_string(),
            });
        }

        if config.staleness_threshold <= config.executor_poll_interval {
            tracing::warn!(
                staleness_ms = config.staleness_threshold.as_millis(),
                executor_poll_ms = config.executor_poll_interval.as_millis(),
                "Staleness threshold does not exceed executor poll cadence, status will flap"
            );
        }

        Ok(config)
    }

    /// Age after which an unclaimed result is purged.
    pub fn result_retention(&self) -> Duration {
        self.wait_timeout.saturating_add(self.result_grace)
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    var,
                    expected: "a whole number of milliseconds",
                    value,
                })
        })
        .transpose()
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .ok_or(ConfigError::Invalid {
                    var,
                    expected: "a non-negative number of seconds",
                    value,
                })
        })
        .transpose()
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    lookup(var)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                expected: "a boolean",
                value,
            }),
        })
        .transpose()
}

//! Environment-driven runtime configuration.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Scheduler Loop period, in minutes. Never zero.
    pub sweep_interval_minutes: u64,
    /// Minimum time between two notifications for the same task.
    pub notify_min_gap_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            sweep_interval_minutes: 5,
            notify_min_gap_ms: 86_400_000,
        }
    }
}

impl Config {
    /// Reads the process environment; unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with variables supplied by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            host: try_load(&lookup, "TASKBELL_HOST", defaults.host)?,
            port: try_load(&lookup, "PORT", defaults.port)?,
            sweep_interval_minutes: try_load(
                &lookup,
                "SWEEP_INTERVAL_MINUTES",
                defaults.sweep_interval_minutes,
            )?,
            notify_min_gap_ms: try_load(&lookup, "NOTIFY_MIN_GAP_MS", defaults.notify_min_gap_ms)?,
        };

        if config.sweep_interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "SWEEP_INTERVAL_MINUTES",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_sweep_interval_minutes(mut self, minutes: u64) -> Self {
        self.sweep_interval_minutes = minutes.max(1);
        self
    }

    pub fn with_notify_min_gap_ms(mut self, ms: u64) -> Self {
        self.notify_min_gap_ms = ms;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes.saturating_mul(60))
    }

    pub fn min_gap(&self) -> TimeDelta {
        TimeDelta::try_milliseconds(i64::try_from(self.notify_min_gap_ms).unwrap_or(i64::MAX))
            .unwrap_or(TimeDelta::MAX)
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return Ok(default);
    };
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.min_gap(), TimeDelta::hours(24));
        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("SWEEP_INTERVAL_MINUTES", " 1 "),
            ("NOTIFY_MIN_GAP_MS", "60000"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.min_gap(), TimeDelta::minutes(1));
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[("SWEEP_INTERVAL_MINUTES", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SWEEP_INTERVAL_MINUTES", .. }));
    }
}

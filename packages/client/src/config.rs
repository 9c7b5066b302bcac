//! Data-source configuration.

use std::time::Duration;

use jobs_core::RetryConfig;

pub const DEFAULT_API_BASE_URL: &str = "https://localhost:5001";
pub const DEFAULT_PUSH_URL: &str = "wss://localhost:5001/JobSignalRHub";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {var}={value} (expected {expected})")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Which implementation backs the job store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataSource {
    /// The real backend over HTTP and WebSocket.
    Remote,
    /// The in-process simulator.
    #[default]
    Simulated,
}

/// Where and how to reach the job backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub api_base_url: String,
    pub push_url: String,
    pub data_source: DataSource,
    pub retry: RetryConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            data_source: DataSource::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a config for the real backend.
    pub fn remote(api_base_url: impl Into<String>, push_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            push_url: push_url.into(),
            data_source: DataSource::Remote,
            retry: RetryConfig::default(),
        }
    }

    /// Create a config for the simulator.
    pub fn simulated() -> Self {
        Self::default()
    }

    pub fn with_data_source(mut self, data_source: DataSource) -> Self {
        self.data_source = data_source;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `JOBS_API_BASE_URL` (default: `https://localhost:5001`)
    /// - `JOBS_PUSH_URL` (default: `wss://localhost:5001/JobSignalRHub`)
    /// - `JOBS_USE_MOCK_DATA` (anything but `false` selects the simulator)
    /// - `JOBS_MAX_RETRIES` (default: 3)
    /// - `JOBS_RETRY_DELAY_MS` (default: 1000)
    /// - `JOBS_BACKOFF_MULTIPLIER` (default: 2)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).and_then(non_empty);

        let data_source = match var("JOBS_USE_MOCK_DATA") {
            Some(flag) if flag.eq_ignore_ascii_case("false") => DataSource::Remote,
            _ => DataSource::Simulated,
        };

        let defaults = RetryConfig::default();
        let max_retries = match var("JOBS_MAX_RETRIES") {
            Some(v) => parse_number("JOBS_MAX_RETRIES", v)?,
            None => defaults.max_retries,
        };
        let base_delay = match var("JOBS_RETRY_DELAY_MS") {
            Some(v) => Duration::from_millis(parse_number("JOBS_RETRY_DELAY_MS", v)?),
            None => defaults.base_delay,
        };
        let multiplier = match var("JOBS_BACKOFF_MULTIPLIER") {
            Some(v) => parse_number("JOBS_BACKOFF_MULTIPLIER", v)?,
            None => defaults.multiplier,
        };

        Ok(Self {
            api_base_url: var("JOBS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            push_url: var("JOBS_PUSH_URL").unwrap_or_else(|| DEFAULT_PUSH_URL.to_string()),
            data_source,
            retry: RetryConfig::new(max_retries, base_delay, multiplier),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError {
        var,
        value,
        expected: "a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_select_the_simulator() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.data_source, DataSource::Simulated);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn only_false_selects_the_backend() {
        let remote = ServiceConfig::from_lookup(lookup(&[("JOBS_USE_MOCK_DATA", "FALSE")])).unwrap();
        assert_eq!(remote.data_source, DataSource::Remote);

        let other = ServiceConfig::from_lookup(lookup(&[("JOBS_USE_MOCK_DATA", "no")])).unwrap();
        assert_eq!(other.data_source, DataSource::Simulated);
    }

    #[test]
    fn reads_urls_and_retry_tuning() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("JOBS_API_BASE_URL", "http://jobs.internal:8080"),
            ("JOBS_PUSH_URL", " ws://jobs.internal:8080/hub "),
            ("JOBS_MAX_RETRIES", "5"),
            ("JOBS_RETRY_DELAY_MS", "250"),
            ("JOBS_BACKOFF_MULTIPLIER", "3"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "http://jobs.internal:8080");
        assert_eq!(config.push_url, "ws://jobs.internal:8080/hub");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.multiplier, 3);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let err = ServiceConfig::from_lookup(lookup(&[("JOBS_MAX_RETRIES", "lots")])).unwrap_err();
        assert_eq!(err.var, "JOBS_MAX_RETRIES");
        assert_eq!(err.to_string(), "invalid JOBS_MAX_RETRIES=lots (expected a non-negative integer)");
    }
}

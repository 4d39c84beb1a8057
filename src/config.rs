//! Configuration loaded from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator_core::window;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Environment tag stamped on every emitted rollup.
    pub agent_env: String,
    /// Hostname stamped on every emitted rollup.
    pub agent_hostname: String,
    /// Width of one aggregation window.
    pub bucket_window: Duration,
    /// Cadence of the elapsed-window check.
    pub flush_interval: Duration,
    /// Bound of the ingest queue, in pending client payloads.
    pub channel_capacity: usize,
    /// JSONL stream of inbound client payloads.
    pub input_stream_path: PathBuf,
    /// JSONL file receiving emitted rollups.
    pub rollup_output_path: PathBuf,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent_env = env::var("STATFLOW_ENV").unwrap_or_else(|_| "none".to_string());

        let agent_hostname = env::var("STATFLOW_HOSTNAME")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        let bucket_window_secs = parse_positive(
            "BUCKET_WINDOW_SECS",
            env::var("BUCKET_WINDOW_SECS").ok(),
            window::BUCKET_DURATION.as_secs(),
        )?;
        let flush_interval_secs = parse_positive(
            "FLUSH_INTERVAL_SECS",
            env::var("FLUSH_INTERVAL_SECS").ok(),
            window::FLUSH_INTERVAL.as_secs(),
        )?;
        let channel_capacity = parse_positive(
            "INGEST_CHANNEL_CAPACITY",
            env::var("INGEST_CHANNEL_CAPACITY").ok(),
            10,
        )? as usize;

        let input_stream_path = env::var("INPUT_STREAM_PATH")
            .unwrap_or_else(|_| "streams/client_stats.jsonl".to_string())
            .into();
        let rollup_output_path = env::var("ROLLUP_OUTPUT_PATH")
            .unwrap_or_else(|_| "streams/rollups.jsonl".to_string())
            .into();

        Ok(Self {
            agent_env,
            agent_hostname,
            bucket_window: Duration::from_secs(bucket_window_secs),
            flush_interval: Duration::from_secs(flush_interval_secs),
            channel_capacity,
            input_stream_path,
            rollup_output_path,
        })
    }
}

fn parse_positive(name: &str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let value = match raw {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} must be an integer, got '{}'", name, raw)))?,
        None => default,
    };
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!("{} must be non-zero", name)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive_defaults_when_unset() {
        assert_eq!(parse_positive("X", None, 10).unwrap(), 10);
    }

    #[test]
    fn test_parse_positive_accepts_valid_values() {
        assert_eq!(parse_positive("X", Some("30".to_string()), 10).unwrap(), 30);
    }

    #[test]
    fn test_parse_positive_rejects_zero_and_garbage() {
        assert!(matches!(
            parse_positive("X", Some("0".to_string()), 10),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            parse_positive("X", Some("ten".to_string()), 10),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}

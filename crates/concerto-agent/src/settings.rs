//! Runtime limits shared by every execution of an application.

use std::time::Duration;

use concerto_core::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Limits applied by the executor and the pattern engine.
///
/// Durations use the humantime format (`60s`, `200ms`, `1m 30s`) when read
/// from a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Maximum number of agents on one agent-as-tool call chain, including
    /// the agent the chain started from
    pub max_call_depth: usize,
    /// Model turns per agent execution before the answer is truncated
    pub max_iterations: u32,
    #[serde(with = "humantime_format")]
    pub model_timeout: Duration,
    #[serde(with = "humantime_format")]
    pub tool_timeout: Duration,
    /// Retries after the first attempt for retryable model failures
    pub model_retries: u32,
    /// Base delay of the exponential backoff between model retries
    #[serde(with = "humantime_format")]
    pub retry_backoff: Duration,
    /// Number of history messages shown to the model; `None` shows all
    pub history_window: Option<usize>,
    /// Default cap on concurrently running parallel tasks; `None` is unbounded
    pub max_in_flight: Option<usize>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_call_depth: 4,
            max_iterations: 8,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            model_retries: 2,
            retry_backoff: Duration::from_millis(200),
            history_window: Some(20),
            max_in_flight: None,
        }
    }
}

impl RuntimeSettings {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_model_retries(mut self, retries: u32) -> Self {
        self.model_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Reject settings the runtime cannot honor.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::invalid_setting("max_call_depth", "must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid_setting("max_iterations", "must be at least 1"));
        }
        if self.model_timeout.is_zero() {
            return Err(ConfigError::invalid_setting("model_timeout", "must be greater than zero"));
        }
        if self.tool_timeout.is_zero() {
            return Err(ConfigError::invalid_setting("tool_timeout", "must be greater than zero"));
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::invalid_setting("max_in_flight", "must be at least 1"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.retry_backoff.saturating_mul(factor)
    }
}

mod humantime_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

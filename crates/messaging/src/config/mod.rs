//! Substrate configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use loader::{ConfigError, load_config, load_config_from_str, load_default_config};

fn default_confirm_timeout_ms() -> u64 {
    120_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_stream_queue_group() -> String {
    "storage".to_string()
}

fn default_command_queue_group() -> String {
    "command".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_agents() -> usize {
    marketbus_core::DEFAULT_AGENT_COUNT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// How long a batch producer waits for the consumer's ready signal
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    /// Round-trip limit for command requests
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Queue group shared by stream consumers
    #[serde(default = "default_stream_queue_group")]
    pub stream_queue_group: String,
    /// Queue group shared by command listeners
    #[serde(default = "default_command_queue_group")]
    pub command_queue_group: String,
    /// Capacity of handler and agent channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_agents")]
    pub default_agents: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: default_confirm_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            stream_queue_group: default_stream_queue_group(),
            command_queue_group: default_command_queue_group(),
            channel_capacity: default_channel_capacity(),
            default_agents: default_agents(),
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl BusConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout_ms = millis(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirm_timeout_ms == 0 {
            return Err(ConfigError::Invalid("confirm_timeout_ms must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be positive".into()));
        }
        if self.default_agents == 0 {
            return Err(ConfigError::Invalid("default_agents must be positive".into()));
        }
        if self.stream_queue_group.is_empty() || self.command_queue_group.is_empty() {
            return Err(ConfigError::Invalid("queue group names must not be empty".into()));
        }
        Ok(())
    }
}

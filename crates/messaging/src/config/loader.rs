use std::path::Path;
use thiserror::Error;

use super::BusConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load and validate substrate configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BusConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load and validate configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<BusConfig, ConfigError> {
    let config: BusConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<BusConfig, ConfigError> {
    let default_config = include_str!("bus_config.json");
    load_config_from_str(default_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_load_default_config() {
        let config = load_default_config().unwrap();
        assert_eq!(config, BusConfig::default());
        assert_eq!(config.confirm_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = load_config_from_str(r#"{"confirm_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.confirm_timeout(), Duration::from_millis(500));
        assert_eq!(config.stream_queue_group, "storage");
        assert_eq!(config.command_queue_group, "command");
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            load_config_from_str(r#"{"channel_capacity": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            load_config_from_str(r#"{"command_queue_group": ""}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            load_config_from_str("not json"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/bus_config.json"),
            Err(ConfigError::IoError(_))
        ));
    }
}

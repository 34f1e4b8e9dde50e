//! Configuration for the troublewatch agent.

use crate::classify::DEFAULT_DISTRESS_LABELS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Stability window capacity (labels kept for majority voting)
    pub window_capacity: usize,

    /// How long distress must persist before a trouble report fires
    #[serde(with = "duration_ms_serde")]
    pub confirm_after: Duration,

    /// Interval between frame-sampling ticks
    #[serde(with = "duration_ms_serde")]
    pub sample_period: Duration,

    /// Labels counted as distress
    pub distress_labels: Vec<String>,

    /// Base URL of the expression classifier service
    pub classifier_url: String,

    /// Base URL of the presence authority
    pub authority_url: String,

    /// Path for storing state and session stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("troublewatch");

        Self {
            window_capacity: 3,
            confirm_after: Duration::from_millis(2000),
            sample_period: Duration::from_millis(2000),
            distress_labels: DEFAULT_DISTRESS_LABELS
                .iter()
                .map(|l| l.to_string())
                .collect(),
            classifier_url: "http://127.0.0.1:8080".to_string(),
            authority_url: "http://127.0.0.1:8080".to_string(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("troublewatch")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Whether a label counts as distress under this configuration.
    pub fn is_distress(&self, label: &str) -> bool {
        self.distress_labels.iter().any(|l| l == label)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for sub-second Durations (stored as milliseconds).
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window_capacity, 3);
        assert_eq!(config.confirm_after, Duration::from_millis(2000));
        assert_eq!(config.sample_period, Duration::from_millis(2000));
        assert!(config.is_distress("sad"));
        assert!(!config.is_distress("happy"));
        assert!(!config.is_distress("neutral"));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = Config {
            confirm_after: Duration::from_millis(1500),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.confirm_after, Duration::from_millis(1500));
        assert!(json.contains("\"confirm_after\":1500"));
    }

    #[test]
    fn test_custom_distress_set() {
        let mut config = Config::default();
        config.distress_labels = vec!["perplexed".to_string()];
        assert!(config.is_distress("perplexed"));
        assert!(!config.is_distress("sad"));
    }
}

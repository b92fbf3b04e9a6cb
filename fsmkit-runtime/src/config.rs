//! Runtime configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FSMKIT_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event queue configuration.
    pub queue: QueueConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FSMKIT_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.queue.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue.capacity must be at least 1".to_string(),
            ));
        }
        if self.queue.class_workers == 0 {
            return Err(ConfigError::ValidationError(
                "queue.class_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a subject's events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Events run on the caller's thread of control and return the resulting state.
    #[default]
    Immediate,
    /// Events are buffered and run by background workers.
    Queued,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Immediate => f.write_str("immediate"),
            DispatchMode::Queued => f.write_str("queued"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" => Ok(DispatchMode::Immediate),
            "queued" => Ok(DispatchMode::Queued),
            other => Err(format!("unknown dispatch mode '{}'", other)),
        }
    }
}

/// Event queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded buffer size of each queue.
    pub capacity: usize,
    /// Workers servicing one per-class queue.
    pub class_workers: usize,
    /// Mode used when a caller does not choose one.
    pub default_mode: DispatchMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            class_workers: 1,
            default_mode: DispatchMode::Immediate,
        }
    }
}

impl QueueConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(capacity) = std::env::var("FSMKIT_QUEUE_CAPACITY") {
            if let Ok(n) = capacity.parse() {
                self.capacity = n;
            }
        }

        if let Ok(workers) = std::env::var("FSMKIT_CLASS_WORKERS") {
            if let Ok(n) = workers.parse() {
                self.class_workers = n;
            }
        }

        if let Ok(mode) = std::env::var("FSMKIT_DEFAULT_MODE") {
            match mode.parse() {
                Ok(mode) => self.default_mode = mode,
                Err(e) => tracing::warn!("ignoring FSMKIT_DEFAULT_MODE: {}", e),
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FSMKIT_LOG") {
            if !level.is_empty() {
                self.level = level;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.queue.capacity, 64);
        assert_eq!(config.queue.class_workers, 1);
        assert_eq!(config.queue.default_mode, DispatchMode::Immediate);
        assert_eq!(config.logging.level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.queue.default_mode = DispatchMode::Queued;
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.queue.default_mode, DispatchMode::Queued);
        assert_eq!(parsed.queue.capacity, config.queue.capacity);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsmkit.yaml");
        std::fs::write(&path, "queue:\n  capacity: 8\n  default_mode: queued\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.queue.class_workers, 1);
        assert_eq!(config.queue.default_mode, DispatchMode::Queued);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/fsmkit.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(..))));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = Config::default();
        config.queue.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.queue.class_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("Queued".parse::<DispatchMode>(), Ok(DispatchMode::Queued));
        assert_eq!(
            "immediate".parse::<DispatchMode>(),
            Ok(DispatchMode::Immediate)
        );
        assert!("eventually".parse::<DispatchMode>().is_err());
    }
}

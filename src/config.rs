//! Configuration for the presence session agent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default RSSI threshold in dBm for session initiation.
pub const DEFAULT_RSSI_THRESHOLD: i16 = -50;
/// Default session identifier length in bytes (hex-encoded to twice this).
pub const DEFAULT_SESSION_ID_LENGTH: usize = 8;
/// Default reinitiation holdoff in milliseconds.
pub const DEFAULT_REINITIATION_HOLDOFF_MS: u64 = 10_000;

/// Main configuration for the session agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Signal strength a record must reach to initiate a session (dBm)
    pub rssi_threshold: i16,

    /// Random bytes in a session identifier
    pub session_id_length: usize,

    /// Minimum silence after a session's last initiation refresh before a
    /// new above-threshold sighting starts a fresh session (ms)
    pub reinitiation_holdoff_ms: u64,

    /// Device identifiers whose sessions persist across address cycling
    pub whitelisted_device_ids: Vec<String>,

    /// Property filter for anonymous session initiation
    pub filter: FilterSpec,

    /// Whether to write per-session CSV log files
    pub session_logging_enabled: bool,

    /// Directory for per-session CSV log files
    pub log_path: PathBuf,

    /// Path for storing state and processing stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("presence-session-agent");

        Self {
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            session_id_length: DEFAULT_SESSION_ID_LENGTH,
            reinitiation_holdoff_ms: DEFAULT_REINITIATION_HOLDOFF_MS,
            whitelisted_device_ids: Vec::new(),
            filter: FilterSpec::default(),
            session_logging_enabled: false,
            log_path: data_dir.join("sessions"),
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
            .join("presence-session-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if self.session_logging_enabled {
            std::fs::create_dir_all(&self.log_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Validate configuration values, failing fast at construction time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id_length == 0 {
            return Err(ConfigError::Invalid(
                "session_id_length must be at least 1 byte".to_string(),
            ));
        }
        if !(-127..=20).contains(&self.rssi_threshold) {
            return Err(ConfigError::Invalid(format!(
                "rssi_threshold {} dBm is outside the plausible range [-127, 20]",
                self.rssi_threshold
            )));
        }
        Ok(())
    }
}

/// Filter specification: property name to accepted value(s).
///
/// An empty filter accepts every record. Properties are combined with
/// logical OR: the first configured property that matches admits the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec {
    pub properties: HashMap<String, AcceptedValues>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Accept records whose `property` matches any of `values`.
    pub fn with_property(
        mut self,
        property: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.properties.insert(
            property.into(),
            AcceptedValues::Many(values.into_iter().map(Into::into).collect()),
        );
        self
    }
}

/// Accepted value(s) for one filter property.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AcceptedValues {
    One(String),
    Many(Vec<String>),
}

impl AcceptedValues {
    /// Whether `candidate` is among the accepted values.
    pub fn accepts(&self, candidate: &str) -> bool {
        match self {
            AcceptedValues::One(value) => value == candidate,
            AcceptedValues::Many(values) => values.iter().any(|v| v == candidate),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

//! Configuration for the Motion Sensor Agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default dataset backend.
pub const DEFAULT_BACKEND_URL: &str = "https://edge-ml-beta.dmz.teco.edu";

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dataset backend base URL
    pub backend_url: String,

    /// Device API key for the dataset backend
    pub api_key: String,

    /// Which sensors to subscribe to
    pub sensors: SensorSelection,

    /// Period of the classification prediction loop
    #[serde(with = "duration_serde")]
    pub prediction_interval: Duration,

    /// Model file per classify-capable sensor
    pub models: BTreeMap<String, PathBuf>,

    /// User agent of the device page, used for device tags
    pub user_agent: Option<String>,

    /// Path for locally exported datasets
    pub export_path: PathBuf,

    /// Path for storing state and session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-sensor-agent");

        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            api_key: String::new(),
            sensors: SensorSelection::default(),
            prediction_interval: Duration::from_millis(1000),
            models: BTreeMap::new(),
            user_agent: None,
            export_path: data_dir.join("datasets"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults if absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-sensor-agent")
            .join("config.json")
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the sessions cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prediction_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "prediction_interval must be greater than zero".to_string(),
            ));
        }
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend_url is empty".to_string()));
        }
        if !self.sensors.any_enabled() {
            return Err(ConfigError::Invalid("no sensors enabled".to_string()));
        }
        Ok(())
    }
}

/// Which sensors to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSelection {
    pub orientation: bool,
    pub motion: bool,
}

impl Default for SensorSelection {
    fn default() -> Self {
        Self {
            orientation: true,
            motion: true,
        }
    }
}

impl SensorSelection {
    /// Parse a sensor selection from a comma-separated string.
    ///
    /// Accepts the event names (`deviceorientation`, `devicemotion`), the
    /// short forms `orientation` and `motion`, or `all`.
    pub fn from_csv(s: &str) -> Self {
        let sensors: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |names: &[&str]| sensors.iter().any(|s| s == "all" || names.contains(&s.as_str()));

        Self {
            orientation: has(&["deviceorientation", "orientation"]),
            motion: has(&["devicemotion", "motion"]),
        }
    }

    /// Check if at least one sensor is enabled.
    pub fn any_enabled(&self) -> bool {
        self.orientation || self.motion
    }

    /// Whether a sensor name is enabled. Unknown names are never included.
    pub fn includes(&self, sensor: &str) -> bool {
        match sensor {
            crate::sensor::DEVICE_ORIENTATION => self.orientation,
            crate::sensor::DEVICE_MOTION => self.motion,
            _ => false,
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

/// Serde support for Duration, in milliseconds.
mod duration_serde {
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

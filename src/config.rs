//! Station configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via LOCKPROV_CONFIG or --config)
//! 3. Environment variables

use lockprov_device::{TransportConfig, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Station configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identity and transport timing.
    pub device: DeviceConfig,
    /// Lock record persistence.
    pub records: RecordsConfig,
    /// Progress event fan-out.
    pub progress: ProgressConfig,
}

impl Config {
    /// Loads configuration from `path` (or `LOCKPROV_CONFIG`), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var("LOCKPROV_CONFIG").ok().map(PathBuf::from);

        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

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

    fn apply_env_overrides(&mut self) {
        self.device.apply_env_overrides();
        self.records.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "device.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.device.read_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "device.read_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        if self.progress.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "progress.channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// USB vendor ID of the provisioning interface.
    pub vendor_id: u16,
    /// USB product ID of the provisioning interface.
    pub product_id: u16,
    /// Presence polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Response deadline in milliseconds. Unset waits indefinitely.
    pub read_timeout_ms: Option<u64>,
    /// Reject responses whose CRC trailer does not match.
    pub verify_response_checksum: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            poll_interval_ms: 100,
            read_timeout_ms: None,
            verify_response_checksum: false,
        }
    }
}

impl DeviceConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("LOCKPROV_VENDOR_ID") {
            if let Some(parsed) = parse_device_id(&id) {
                self.vendor_id = parsed;
            }
        }

        if let Ok(id) = std::env::var("LOCKPROV_PRODUCT_ID") {
            if let Some(parsed) = parse_device_id(&id) {
                self.product_id = parsed;
            }
        }

        if let Ok(interval) = std::env::var("LOCKPROV_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.poll_interval_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("LOCKPROV_READ_TIMEOUT_MS") {
            // Empty or zero clears the deadline
            match timeout.parse::<u64>() {
                Ok(0) => self.read_timeout_ms = None,
                Ok(ms) => self.read_timeout_ms = Some(ms),
                Err(_) if timeout.is_empty() => self.read_timeout_ms = None,
                Err(_) => {}
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Builds the transport configuration for this device.
    pub fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig::new()
            .with_device_id(self.vendor_id, self.product_id)
            .with_poll_interval(self.poll_interval())
            .with_checksum_verification(self.verify_response_checksum);
        if let Some(timeout) = self.read_timeout() {
            config = config.with_read_timeout(timeout);
        }
        config
    }
}

/// Lock record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// JSON file holding lock records. Unset keeps records in memory only.
    pub path: Option<PathBuf>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("./data/locks.json")),
        }
    }
}

impl RecordsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("LOCKPROV_RECORDS_PATH") {
            self.path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
    }
}

/// Progress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Events buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Parses a USB ID given as decimal or `0x`-prefixed hex.
fn parse_device_id(value: &str) -> Option<u16> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
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
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.vendor_id, 0x2FE3);
        assert_eq!(config.device.product_id, 0x0100);
        assert_eq!(config.device.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.device.read_timeout(), None);
        assert_eq!(config.progress.channel_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "device:\n  product_id: 512\n  read_timeout_ms: 5000\nrecords:\n  path: /var/lib/lockprov/locks.json"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.device.vendor_id, 0x2FE3);
        assert_eq!(config.device.product_id, 0x0200);
        assert_eq!(config.device.read_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            config.records.path,
            Some(PathBuf::from("/var/lib/lockprov/locks.json"))
        );
        assert_eq!(config.progress.channel_capacity, 1024);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/lockprov.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(..))));
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "device: [not, a, map]").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(..))));
        assert!(result
            .unwrap_err()
            .to_string()
            .starts_with("failed to parse config file"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.device.read_timeout_ms = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.device.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id("0x2FE3"), Some(0x2FE3));
        assert_eq!(parse_device_id("0X0100"), Some(0x0100));
        assert_eq!(parse_device_id("256"), Some(256));
        assert_eq!(parse_device_id(" 0x10 "), Some(0x10));
        assert_eq!(parse_device_id("0x1FFFF"), None);
        assert_eq!(parse_device_id("lock"), None);
    }

    #[test]
    fn test_transport_config() {
        let mut device = DeviceConfig::default();
        device.read_timeout_ms = Some(1500);
        device.verify_response_checksum = true;

        let transport = device.transport_config();
        assert_eq!(transport.vendor_id, 0x2FE3);
        assert_eq!(transport.read_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(transport.poll_interval, Duration::from_millis(100));
        assert!(transport.verify_response_checksum);
    }
}

//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `co2-host.toml`.
//!     loads configuration from file or falls back to defaults.
//!     every section and field is optional; the defaults match a stock Pi
//!     with the MH-Z19 on the primary UART and a broker on localhost.
//!
//! structure:
//!     - SerialConfig: UART device the MH-Z19 hangs off.
//!     - PollingConfig: Seconds between polls.
//!     - SensorConfig: Model name stamped on published payloads.
//!     - BrokerConfig: MQTT endpoint, identity and topic.
//!     - LoggingConfig: Default log filter.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub serial: SerialConfig,
    pub polling: PollingConfig,
    pub sensor: SensorConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    pub device: PathBuf,
    pub baud_rate: u32,
    /// 0 blocks until the sensor answers; otherwise at least
    /// `MIN_READ_TIMEOUT_MS`, the uart's timing granularity
    pub read_timeout_ms: u64,
}

pub const MIN_READ_TIMEOUT_MS: u64 = 100;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyAMA0"),
            baud_rate: 9600,
            read_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 2 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorConfig {
    pub model: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { model: "MH-Z19".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 1883,
            client_id: "co2_sensor_publisher".to_string(),
            topic: "sensor/co2".to_string(),
            keep_alive_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: HostConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        if config.polling.interval_seconds == 0 {
            anyhow::bail!("polling.interval_seconds must be at least 1");
        }
        if (1..MIN_READ_TIMEOUT_MS).contains(&config.serial.read_timeout_ms) {
            anyhow::bail!(
                "serial.read_timeout_ms must be 0 (no timeout) or at least {}, got {}",
                MIN_READ_TIMEOUT_MS,
                config.serial.read_timeout_ms
            );
        }
        Ok(config)
    }

    /// Load with default fallback.
    /// runs before logging is up, so the outcome is returned as a note
    /// for the caller to log.
    pub fn load_or_default() -> (Self, String) {
        let paths = [
            PathBuf::from("config").join("co2-host.toml"),
            PathBuf::from("..").join("config").join("co2-host.toml"),
        ];

        let mut notes = Vec::new();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        notes.push(format!("Loaded from {}", path.display()));
                        return (config, notes.join("; "));
                    }
                    Err(e) => {
                        notes.push(format!("Warning: Failed to load {}: {}", path.display(), e));
                    }
                }
            }
        }

        notes.push("Warning: No usable config file found - using defaults".to_string());
        (Self::default(), notes.join("; "))
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("[CONFIG] Serial: {} @ {} baud", self.serial.device.display(), self.serial.baud_rate);
        tracing::info!("[CONFIG] Poll Interval: {}s", self.polling.interval_seconds);
        tracing::info!("[CONFIG] Sensor: {}", self.sensor.model);
        if self.broker.enabled {
            tracing::info!("[CONFIG] MQTT Broker: {}:{}", self.broker.host, self.broker.port);
            tracing::info!("[CONFIG] MQTT Topic: {}", self.broker.topic);
        } else {
            tracing::info!("[CONFIG] MQTT: disabled (console only)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = HostConfig::parse("").unwrap();
        assert_eq!(config.serial.device, PathBuf::from("/dev/ttyAMA0"));
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.read_timeout_ms, 0);
        assert_eq!(config.polling.interval_seconds, 2);
        assert_eq!(config.sensor.model, "MH-Z19");
        assert!(!config.broker.enabled);
        assert_eq!(config.broker.topic, "sensor/co2");
        assert_eq!(config.broker.client_id, "co2_sensor_publisher");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = HostConfig::parse(
            r#"
            [broker]
            enabled = true
            host = "10.0.0.5"

            [serial]
            device = "/dev/serial0"
            "#,
        )
        .unwrap();

        assert!(config.broker.enabled);
        assert_eq!(config.broker.host, "10.0.0.5");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.serial.device, PathBuf::from("/dev/serial0"));
        assert_eq!(config.serial.baud_rate, 9600);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = HostConfig::parse("[polling]\ninterval_seconds = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_seconds"));
    }

    #[test]
    fn read_timeout_below_uart_granularity_is_rejected() {
        for ms in [1, 50, 99] {
            let err = HostConfig::parse(&format!("[serial]\nread_timeout_ms = {ms}\n")).unwrap_err();
            assert!(err.to_string().contains("read_timeout_ms"), "{err}");
        }

        for ms in [0, 100, 1500, 60_000] {
            let config = HostConfig::parse(&format!("[serial]\nread_timeout_ms = {ms}\n")).unwrap();
            assert_eq!(config.serial.read_timeout_ms, ms);
        }
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(HostConfig::parse("[broker\nenabled = yes").is_err());
    }

    #[test]
    fn shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join("co2-host.toml");
        let config = HostConfig::load(path).unwrap();
        assert_eq!(config.broker.topic, "sensor/co2");
        assert_eq!(config.polling.interval_seconds, 2);
    }
}

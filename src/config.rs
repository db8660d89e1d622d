//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub session: SessionConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Default budget for a correlated request/response exchange
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Session-layer timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Overall deadline when waiting for the board to start answering
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Pause between connection probes
    #[serde(default = "default_connect_retry_interval_ms")]
    pub connect_retry_interval_ms: u64,

    /// Deadline for the blocking arm/disarm confirmation wait
    #[serde(default = "default_arm_timeout_ms")]
    pub arm_timeout_ms: u64,

    /// Pause between status polls during the confirmation wait
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_request_timeout_ms() -> u64 { 500 }

fn default_connect_timeout_ms() -> u64 { 30_000 }
fn default_connect_retry_interval_ms() -> u64 { 1_000 }
fn default_arm_timeout_ms() -> u64 { 5_000 }
fn default_status_poll_interval_ms() -> u64 { 100 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_retry_interval_ms: default_connect_retry_interval_ms(),
            arm_timeout_ms: default_arm_timeout_ms(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl SerialConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    pub fn arm_timeout(&self) -> Duration {
        Duration::from_millis(self.arm_timeout_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(crate::error::MspBridgeError::Config(
                toml::de::Error::custom("serial port cannot be empty"),
            ));
        }

        // A zero request timeout would make "use the default" mean "no wait"
        if self.serial.request_timeout_ms == 0 || self.serial.request_timeout_ms > 10_000 {
            return Err(crate::error::MspBridgeError::Config(
                toml::de::Error::custom("request_timeout_ms must be between 1 and 10000"),
            ));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(crate::error::MspBridgeError::Config(toml::de::Error::custom(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600",
            )));
        }

        if self.session.connect_timeout_ms == 0 || self.session.connect_timeout_ms > 300_000 {
            return Err(crate::error::MspBridgeError::Config(
                toml::de::Error::custom("connect_timeout_ms must be between 1 and 300000"),
            ));
        }

        if self.session.connect_retry_interval_ms == 0
            || self.session.connect_retry_interval_ms > 60_000
        {
            return Err(crate::error::MspBridgeError::Config(
                toml::de::Error::custom("connect_retry_interval_ms must be between 1 and 60000"),
            ));
        }

        if self.session.arm_timeout_ms == 0 || self.session.arm_timeout_ms > 60_000 {
            return Err(crate::error::MspBridgeError::Config(
                toml::de::Error::custom("arm_timeout_ms must be between 1 and 60000"),
            ));
        }

        if self.session.status_poll_interval_ms == 0
            || self.session.status_poll_interval_ms >= self.session.arm_timeout_ms
        {
            return Err(crate::error::MspBridgeError::Config(toml::de::Error::custom(
                "status_poll_interval_ms must be non-zero and shorter than arm_timeout_ms",
            )));
        }

        Ok(())
    }
}

const VALID_BAUD_RATES: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
];

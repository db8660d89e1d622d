//! # Error Types
//!
//! Custom error types for MSP Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for MSP Bridge
#[derive(Debug, Error)]
pub enum MspBridgeError {
    /// MSP protocol errors
    #[error("MSP protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No usable serial device found
    #[error("No flight controller found at: {0}")]
    SerialPortNotFound(String),

    /// A correlated reply did not arrive within the request budget
    #[error("No response to request id {id} within timeout")]
    RequestTimeout { id: u8 },

    /// The firmware answered with an error frame
    #[error("Firmware rejected message id {id}")]
    CommandRejected { id: u8 },
}

/// Result type alias for MSP Bridge
pub type Result<T> = std::result::Result<T, MspBridgeError>;

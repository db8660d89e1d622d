//! # Serial Communication Module
//!
//! Handles the serial link to the flight controller.
//!
//! This module handles:
//! - Opening the port at the configured baud rate (default 115,200)
//! - 8N1 framing with no flow control, as MSP expects
//! - Auto-detection across common device paths
//! - The [`SerialPortIO`](port_trait::SerialPortIO) seam used by the client

pub mod port_trait;

use crate::error::{MspBridgeError, Result};
use port_trait::{SerialPortIO, TokioSerialPort};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Default MSP baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default flight-controller device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common for MSP boards)
    "/dev/ttyACM0", // USB CDC devices
];

/// MSP serial port handler.
///
/// Manages the connection to the flight controller board.
pub struct MspSerial {
    /// Serial port handle
    port: TokioSerialPort,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for MspSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MspSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl MspSerial {
    /// Open a connection to the flight controller.
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Link speed, conventionally 115,200 for MSP
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = Self::open_port(path, baud_rate)?;
        info!("Opened flight controller device at {}", path);
        Ok(Self {
            port: TokioSerialPort::new(port),
            device_path: path.to_string(),
        })
    }

    /// Open the first device that responds from the default path list.
    pub fn open_auto(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the first path that can be opened from `paths`.
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened flight controller device at {}", path);
                    return Ok(Self {
                        port: TokioSerialPort::new(port),
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(MspBridgeError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with MSP settings (8N1, no flow control).
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| MspBridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Consume the handler, yielding the port object the client drives.
    pub fn into_port(self) -> Box<dyn SerialPortIO> {
        Box::new(self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_BAUD_RATE, 115_200);
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 2);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyUSB0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = MspSerial::open_with_paths(invalid_paths, DEFAULT_BAUD_RATE);

        assert!(result.is_err());
        match result.unwrap_err() {
            MspBridgeError::SerialPortNotFound(msg) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        let result = MspSerial::open_with_paths(empty_paths, DEFAULT_BAUD_RATE);

        assert!(matches!(
            result.unwrap_err(),
            MspBridgeError::SerialPortNotFound(_)
        ));
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = MspSerial::open_port("/dev/nonexistent_serial_device_12345", 115_200);

        assert!(result.is_err());
        match result.unwrap_err() {
            MspBridgeError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    // Integration test - only runs if a flight controller is connected
    #[test]
    #[ignore] // Run with: cargo test -- --ignored
    fn test_open_with_real_hardware() {
        if let Ok(serial) = MspSerial::open_auto(DEFAULT_BAUD_RATE) {
            let path = serial.device_path();
            assert!(
                path == "/dev/ttyUSB0" || path == "/dev/ttyACM0",
                "Unexpected device path: {}",
                path
            );
        } else {
            println!("No flight controller detected (this is OK for CI/CD)");
        }
    }
}

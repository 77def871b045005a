//! # Serial Communication Module
//!
//! Handles the serial link to the tribometer board.
//!
//! This module handles:
//! - Enumerating candidate serial ports
//! - Opening a port at the configured baud rate (8N1)
//! - The write-side trait used by the session to send commands

pub mod port_trait;

use crate::error::{CaptureError, Result};
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

/// Default baud rate of the tribometer firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// List serial port device names available on this machine
///
/// # Errors
///
/// Returns error if the platform port enumeration fails
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| CaptureError::Serial(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Open a serial port with tribometer settings (8N1)
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyACM0" or "COM3")
/// * `baud_rate` - Baud rate, normally [`DEFAULT_BAUD_RATE`]
///
/// # Errors
///
/// Returns error if the port cannot be opened
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    debug!("Opening serial port {} at {} baud", path, baud_rate);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| CaptureError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_baud_rate() {
        assert_eq!(DEFAULT_BAUD_RATE, 115_200, "Tribometer firmware runs at 115200 baud");
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = open_port("/dev/nonexistent_serial_device_12345", DEFAULT_BAUD_RATE);

        assert!(result.is_err());
        match result.unwrap_err() {
            CaptureError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[test]
    fn test_list_ports_does_not_panic() {
        // Enumeration result depends on the host; it must simply not fail
        // catastrophically on a machine with no serial hardware.
        let result = list_ports();
        if let Ok(ports) = result {
            for name in ports {
                assert!(!name.is_empty());
            }
        }
    }
}

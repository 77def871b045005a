//! # Error Types
//!
//! Custom error types for tribo-capture using `thiserror`.

use thiserror::Error;

/// Main error type for tribo-capture
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Serial port errors (open, enumerate, read, write)
    #[error("Serial error: {0}")]
    Serial(String),

    /// No usable serial port among the given candidates
    #[error("No serial port found (tried: {0})")]
    SerialPortNotFound(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Connection already established
    #[error("Already connected")]
    AlreadyConnected,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tribo-capture
pub type Result<T> = std::result::Result<T, CaptureError>;

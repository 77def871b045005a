//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Baud rate of the tribometer firmware
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Delay after opening the port, while the board resets
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Size of the read buffer handed to the serial stream
    #[serde(default = "default_read_buf_size")]
    pub read_buf_size: usize,
}

/// CSV output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// File name of the results CSV
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Directory for the default destination (current dir when empty)
    #[serde(default)]
    pub dir: String,

    /// Fallback directory tried when every default candidate is locked
    /// (system temp dir when empty)
    #[serde(default)]
    pub fallback_dir: String,

    /// Number of numbered sibling files tried per directory
    #[serde(default = "default_max_alt_files")]
    pub max_alt_files: usize,
}

/// Diagnostic log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// High-water mark of the in-memory diagnostic ring
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,

    /// Number of entries retained after an eviction pass
    #[serde(default = "default_log_trim_to")]
    pub trim_to: usize,

    /// Best-effort plain-text mirror of the diagnostic log
    #[serde(default = "default_log_file")]
    pub file: String,
}

// Default value functions

fn default_baud_rate() -> u32 {
    115_200
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_read_buf_size() -> usize {
    256
}

fn default_file_name() -> String {
    "resultados_tribometro.csv".to_string()
}

fn default_max_alt_files() -> usize {
    5
}

fn default_log_capacity() -> usize {
    1000
}

fn default_log_trim_to() -> usize {
    800
}

fn default_log_file() -> String {
    "tribo_capture.log".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            settle_delay_ms: default_settle_delay_ms(),
            read_buf_size: default_read_buf_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            dir: String::new(),
            fallback_dir: String::new(),
            max_alt_files: default_max_alt_files(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
            trim_to: default_log_trim_to(),
            file: default_log_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            output: OutputConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the default CSV destination path
    pub fn default_output_path(&self) -> PathBuf {
        if self.output.dir.is_empty() {
            PathBuf::from(&self.output.file_name)
        } else {
            Path::new(&self.output.dir).join(&self.output.file_name)
        }
    }

    /// Resolve the fallback-directory CSV destination path
    pub fn fallback_output_path(&self) -> PathBuf {
        let dir = if self.output.fallback_dir.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.output.fallback_dir)
        };
        dir.join(&self.output.file_name)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("baud_rate must be greater than 0")
            ));
        }

        if self.serial.settle_delay_ms > 30_000 {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("settle_delay_ms must be at most 30000")
            ));
        }

        if self.serial.read_buf_size == 0 {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("read_buf_size must be greater than 0")
            ));
        }

        if self.output.file_name.is_empty() {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("file_name must not be empty")
            ));
        }

        if self.output.max_alt_files == 0 || self.output.max_alt_files > 100 {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("max_alt_files must be between 1 and 100")
            ));
        }

        if self.log.capacity == 0 {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("log capacity must be greater than 0")
            ));
        }

        if self.log.trim_to >= self.log.capacity {
            return Err(crate::error::CaptureError::Config(
                toml::de::Error::custom("log trim_to must be less than capacity")
            ));
        }

        Ok(())
    }
}

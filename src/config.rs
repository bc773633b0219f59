//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Line parameters (9600-8-N-1) are compiled in and cannot be configured.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{LinkError, Result};
use crate::protocol::Opcode;
use crate::serial::{BackendChoice, PortFilter, Timeouts};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default)]
    pub backend: BackendChoice,

    /// Port to connect to on startup; empty means wait for a connect request
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Pause after a permission-gated open
    #[serde(default = "default_open_settle_ms")]
    pub open_settle_ms: u64,
}

/// Permission-gated backend configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebConfig {
    /// Filters applied when asking for a new port
    #[serde(default)]
    pub filters: Vec<PortFilter>,

    /// Devices treated as already granted
    #[serde(default)]
    pub granted: Vec<PortFilter>,
}

/// Wire protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    #[serde(default = "default_opcode")]
    pub opcode: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_write_timeout_ms() -> u64 { 3000 }
fn default_settle_delay_ms() -> u64 { 50 }

fn default_open_settle_ms() -> u64 { 100 }

fn default_opcode() -> String { "5".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::default(),
            port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            open_settle_ms: default_open_settle_ms(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self { opcode: default_opcode() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use store_serial::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Timing contract for the connection manager
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.serial.connect_timeout_ms),
            write: Duration::from_millis(self.serial.write_timeout_ms),
            settle: Duration::from_millis(self.serial.settle_delay_ms),
        }
    }

    /// Opcode used for selection commands
    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::parse(&self.protocol.opcode)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.serial.open_settle_ms)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if let Some(port) = &self.serial.port {
            if port.trim().is_empty() {
                return Err(invalid("serial port cannot be blank when set"));
            }
        }

        if self.serial.connect_timeout_ms == 0 || self.serial.connect_timeout_ms > 30000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 30000"));
        }

        if self.serial.write_timeout_ms == 0 || self.serial.write_timeout_ms > 30000 {
            return Err(invalid("write_timeout_ms must be between 1 and 30000"));
        }

        if self.serial.settle_delay_ms > 1000 {
            return Err(invalid("settle_delay_ms must be between 0 and 1000"));
        }

        if self.serial.open_settle_ms > 1000 {
            return Err(invalid("open_settle_ms must be between 0 and 1000"));
        }

        if self.opcode().is_err() {
            return Err(invalid("protocol opcode must be a single digit"));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(invalid(format!(
                "logging level {:?} is not a valid filter",
                self.logging.level
            )));
        }

        if let Some(dir) = &self.logging.log_dir {
            if dir.trim().is_empty() {
                return Err(invalid("log_dir cannot be blank when set"));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> LinkError {
    LinkError::Config(toml::de::Error::custom(message))
}

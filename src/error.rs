//! # Error Types
//!
//! Custom error types for the serial link using `thiserror`.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the serial link
#[derive(Debug, Error)]
pub enum LinkError {
    /// The host has no serial support at all
    #[error("Serial capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Discovery returned nothing or the user declined the prompt
    #[error("No port selected")]
    NoPortSelected,

    /// Opening the port did not complete in time
    #[error("Connection timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Opening the port failed
    #[error("Failed to open port: {0}")]
    ConnectFailed(String),

    /// An operation needed an open connection and there was none
    #[error("Not connected")]
    NotConnected,

    /// A write did not flush before its deadline
    #[error("Write timeout after {0:?}")]
    WriteTimeout(Duration),

    /// Low-level transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value has no representation in the wire protocol
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl LinkError {
    /// Whether this error leaves the connection unusable until reopened
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, LinkError::Io(_) | LinkError::WriteTimeout(_))
    }
}

/// Result type alias for the serial link
pub type Result<T> = std::result::Result<T, LinkError>;

//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;

use super::LineSettings;
use crate::error::Result;

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Release the underlying OS resource
    ///
    /// Called at most once per handle by the connection manager.
    async fn close(&mut self) -> io::Result<()>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: Option<tokio_serial::SerialStream>,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port: Some(port) }
    }

    fn stream(&mut self) -> io::Result<&mut tokio_serial::SerialStream> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port already closed"))
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.stream()?.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.stream()?.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        // Dropping the stream closes the file descriptor / COM handle
        drop(self.port.take());
        Ok(())
    }
}

/// A discoverable serial endpoint, before a connection is opened
///
/// For native enumeration `path` is the OS device path. Permission-gated
/// backends cannot see device paths and use a placeholder instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub path: String,
}

impl PortDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Which family of backend a transport belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OS serial-device registry
    Native,
    /// Permission-gated host (Web Serial style)
    Web,
}

/// Backend capability: discovery plus opening ports
///
/// The connection manager and write channel are written once against this
/// trait; each backend only knows how to find and open ports.
#[async_trait]
pub trait PortTransport: Send + Sync {
    /// Backend family
    fn kind(&self) -> BackendKind;

    /// Enumerate ports without side effects visible to the user
    ///
    /// "No device" is an empty list, never an error.
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Ask the host for a new port (may surface a permission prompt)
    ///
    /// Returns `Ok(None)` when the user declines or the backend has no prompt.
    async fn request_port(&self) -> Result<Option<PortDescriptor>> {
        Ok(None)
    }

    /// Granted ports first; if there are none and `allow_prompt` is set,
    /// request exactly one port
    async fn discover(&self, allow_prompt: bool) -> Result<Vec<PortDescriptor>> {
        let ports = self.list_ports().await?;
        if !ports.is_empty() || !allow_prompt {
            return Ok(ports);
        }

        Ok(self.request_port().await?.into_iter().collect())
    }

    /// Open a port with fixed line settings
    async fn open(
        &self,
        descriptor: &PortDescriptor,
        settings: &LineSettings,
    ) -> Result<Box<dyn SerialPortIO>>;
}

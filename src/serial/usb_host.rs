//! USB-filter serial host
//!
//! A `SerialHost` for the server process. Ports count as granted when their
//! USB identity matches one of the operator's pre-granted filters; a request
//! picks the first attached USB device passing the request filters. Nothing
//! attached (or nothing matching) behaves like a dismissed prompt.

use async_trait::async_trait;
use std::io;
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::debug;

use super::native::{enumerate_ports, open_port};
use super::port_trait::{SerialPortIO, TokioSerialPort};
use super::web::{HostPort, PortFilter, SerialHost};
use super::LineSettings;

/// Host granting USB serial devices by VID/PID
#[derive(Debug, Clone, Default)]
pub struct UsbSerialHost {
    granted: Vec<PortFilter>,
}

impl UsbSerialHost {
    /// Create a host that treats devices matching `granted` as already permitted
    pub fn new(granted: Vec<PortFilter>) -> Self {
        Self { granted }
    }
}

/// Check if a serial port passes any of the filters
///
/// Only USB ports carry a VID/PID; other port types never match.
fn matches_any(port: &SerialPortInfo, filters: &[PortFilter]) -> bool {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            filters.is_empty() || filters.iter().any(|f| f.matches(usb.vid, usb.pid))
        }
        _ => false,
    }
}

#[async_trait]
impl SerialHost for UsbSerialHost {
    /// Platforms with a serial-device registry
    ///
    /// Answered without touching the OS; enumeration failures surface from
    /// `get_ports` / `request_port` instead.
    fn is_supported(&self) -> bool {
        cfg!(any(unix, windows))
    }

    async fn get_ports(&self) -> io::Result<Vec<HostPort>> {
        if self.granted.is_empty() {
            return Ok(Vec::new());
        }

        let ports = enumerate_ports().await?
            .into_iter()
            .filter(|p| matches_any(p, &self.granted))
            .map(|p| HostPort::new(p.port_name))
            .collect();
        Ok(ports)
    }

    async fn request_port(&self, filters: &[PortFilter]) -> io::Result<HostPort> {
        let port = enumerate_ports().await?
            .into_iter()
            .find(|p| matches_any(p, filters))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no matching device attached"))?;

        debug!("Request matched {}", port.port_name);
        Ok(HostPort::new(port.port_name))
    }

    async fn open(&self, port: &HostPort, settings: &LineSettings) -> io::Result<Box<dyn SerialPortIO>> {
        let stream = open_port(port.id(), settings).map_err(|e| io::Error::other(e.to_string()))?;
        Ok(Box::new(TokioSerialPort::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::UsbPortInfo;

    fn usb_port(name: &str, vid: u16, pid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    #[test]
    fn test_usb_port_matches_filter() {
        let port = usb_port("/dev/ttyACM0", 0x2341, 0x0043);
        assert!(matches_any(&port, &[PortFilter::new(0x2341, 0x0043)]));
        assert!(!matches_any(&port, &[PortFilter::new(0x1a86, 0x7523)]));
    }

    #[test]
    fn test_empty_filters_match_any_usb_port() {
        let port = usb_port("/dev/ttyUSB0", 0x1a86, 0x7523);
        assert!(matches_any(&port, &[]));
    }

    #[test]
    fn test_non_usb_port_never_matches() {
        let port = SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        };
        assert!(!matches_any(&port, &[]));
        assert!(!matches_any(&port, &[PortFilter::default()]));
    }

    #[tokio::test]
    async fn test_no_grants_means_no_granted_ports() {
        let host = UsbSerialHost::new(Vec::new());
        assert!(host.get_ports().await.unwrap().is_empty());
    }
}

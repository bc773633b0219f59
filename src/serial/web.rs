//! # Permission-Gated Serial Backend
//!
//! Web Serial style discovery: the host only exposes ports the user has
//! granted, never reveals device paths, and can prompt for one new port.
//!
//! The host side (`SerialHost`) is a trait so the same discovery and capture
//! logic runs against any permission-gated binding. `UsbSerialHost` in
//! `usb_host.rs` is the binding used by the bridge binary.

use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::port_trait::{BackendKind, PortDescriptor, PortTransport, SerialPortIO};
use super::LineSettings;
use crate::error::{LinkError, Result};

/// Path reported for every permission-gated port
///
/// The host API does not expose device paths, so descriptors from this
/// backend cannot be told apart by path.
pub const WEB_SERIAL_PORT_PATH: &str = "Web Serial Port";

/// Pause after opening before the writer is used
pub const DEFAULT_OPEN_SETTLE: Duration = Duration::from_millis(100);

/// USB identity filter used when requesting a port
///
/// An empty filter matches any USB serial device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PortFilter {
    #[serde(default)]
    pub usb_vendor_id: Option<u16>,

    #[serde(default)]
    pub usb_product_id: Option<u16>,
}

impl PortFilter {
    pub fn new(usb_vendor_id: u16, usb_product_id: u16) -> Self {
        Self {
            usb_vendor_id: Some(usb_vendor_id),
            usb_product_id: Some(usb_product_id),
        }
    }

    /// Whether a USB device with this VID/PID passes the filter
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.usb_vendor_id.map_or(true, |v| v == vid)
            && self.usb_product_id.map_or(true, |p| p == pid)
    }
}

/// Opaque handle to a port the host has granted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    id: String,
}

impl HostPort {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Host-internal identifier; never shown to callers as a path
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A permission-gated serial host (the `navigator.serial` shape)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialHost: Send + Sync {
    /// Whether the host has any serial capability
    fn is_supported(&self) -> bool;

    /// Ports the user has already granted
    async fn get_ports(&self) -> io::Result<Vec<HostPort>>;

    /// Prompt for exactly one port; an error means dismissed or denied
    async fn request_port(&self, filters: &[PortFilter]) -> io::Result<HostPort>;

    /// Open a granted port
    async fn open(&self, port: &HostPort, settings: &LineSettings) -> io::Result<Box<dyn SerialPortIO>>;
}

/// Serial backend over a permission-gated host
///
/// `discover` and `request_port` capture the handle the next `open` will use.
/// `list_ports` is a pure query; an `open` with nothing captured falls back to
/// the last granted port.
pub struct WebSerialTransport<H: SerialHost> {
    host: H,
    filters: Vec<PortFilter>,
    open_settle: Duration,
    captured: Mutex<Option<HostPort>>,
}

impl<H: SerialHost> WebSerialTransport<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            filters: Vec::new(),
            open_settle: DEFAULT_OPEN_SETTLE,
            captured: Mutex::new(None),
        }
    }

    /// Filters passed to the host when prompting
    pub fn with_filters(mut self, filters: Vec<PortFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_open_settle(mut self, open_settle: Duration) -> Self {
        self.open_settle = open_settle;
        self
    }

    /// Whether discovery has captured a handle for the next open
    pub fn has_captured_port(&self) -> bool {
        self.captured_port().is_some()
    }

    fn ensure_supported(&self) -> Result<()> {
        if self.host.is_supported() {
            Ok(())
        } else {
            Err(LinkError::CapabilityUnavailable(
                "Web Serial API is not supported on this host".to_string(),
            ))
        }
    }

    /// Ports the host reports as granted; a failed query counts as none
    async fn granted_ports(&self) -> Result<Vec<HostPort>> {
        self.ensure_supported()?;

        match self.host.get_ports().await {
            Ok(ports) => Ok(ports),
            Err(e) => {
                warn!("Error listing granted ports: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn capture(&self, port: HostPort) {
        debug!("Captured granted port {}", port.id());
        *self.captured.lock().unwrap_or_else(|e| e.into_inner()) = Some(port);
    }

    fn captured_port(&self) -> Option<HostPort> {
        self.captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn placeholder() -> PortDescriptor {
    PortDescriptor::new(WEB_SERIAL_PORT_PATH)
}

#[async_trait]
impl<H: SerialHost> PortTransport for WebSerialTransport<H> {
    fn kind(&self) -> BackendKind {
        BackendKind::Web
    }

    /// Already-granted ports, as placeholder descriptors
    ///
    /// Pure query; nothing is captured for the next open.
    async fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = self.granted_ports().await?;
        Ok(ports.iter().map(|_| placeholder()).collect())
    }

    /// Granted ports first, otherwise one prompt when allowed
    ///
    /// The last granted port (or the prompted one) is captured for `open`.
    async fn discover(&self, allow_prompt: bool) -> Result<Vec<PortDescriptor>> {
        let ports = self.granted_ports().await?;
        let descriptors: Vec<PortDescriptor> = ports.iter().map(|_| placeholder()).collect();

        if let Some(last) = ports.into_iter().last() {
            self.capture(last);
            return Ok(descriptors);
        }

        if !allow_prompt {
            return Ok(descriptors);
        }

        Ok(self.request_port().await?.into_iter().collect())
    }

    /// Prompt the user for one port
    ///
    /// A dismissed prompt or denied permission is routine and yields `None`.
    async fn request_port(&self) -> Result<Option<PortDescriptor>> {
        self.ensure_supported()?;

        match self.host.request_port(&self.filters).await {
            Ok(port) => {
                self.capture(port);
                Ok(Some(placeholder()))
            }
            Err(e) => {
                warn!("No port selected or permission denied: {}", e);
                Ok(None)
            }
        }
    }

    async fn open(
        &self,
        _descriptor: &PortDescriptor,
        settings: &LineSettings,
    ) -> Result<Box<dyn SerialPortIO>> {
        self.ensure_supported()?;

        let port = match self.captured_port() {
            Some(port) => port,
            None => self
                .granted_ports()
                .await?
                .pop()
                .ok_or(LinkError::NoPortSelected)?,
        };
        let handle = self
            .host
            .open(&port, settings)
            .await
            .map_err(|e| LinkError::ConnectFailed(e.to_string()))?;

        // Give the device time to finish opening before the first write
        tokio::time::sleep(self.open_settle).await;

        info!("Opened granted port {}", port.id());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::MockSerialPort;
    use crate::serial::LINE_SETTINGS;

    fn transport(host: MockSerialHost) -> WebSerialTransport<MockSerialHost> {
        WebSerialTransport::new(host).with_open_settle(Duration::ZERO)
    }

    #[test]
    fn test_port_filter_matching() {
        let any = PortFilter::default();
        assert!(any.matches(0x2341, 0x0043));

        let uno = PortFilter::new(0x2341, 0x0043);
        assert!(uno.matches(0x2341, 0x0043));
        assert!(!uno.matches(0x2341, 0x0001));
        assert!(!uno.matches(0x1a86, 0x0043));

        let vendor_only = PortFilter {
            usb_vendor_id: Some(0x2341),
            usb_product_id: None,
        };
        assert!(vendor_only.matches(0x2341, 0x9999));
    }

    #[tokio::test]
    async fn test_unsupported_host_is_hard_failure() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(false);
        host.expect_get_ports().never();
        host.expect_request_port().never();

        let transport = transport(host);
        assert!(matches!(
            transport.list_ports().await,
            Err(LinkError::CapabilityUnavailable(_))
        ));
        assert!(matches!(
            transport.discover(true).await,
            Err(LinkError::CapabilityUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_granted_port_is_listed_and_captured() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports()
            .times(1)
            .returning(|| Ok(vec![HostPort::new("usb-1")]));
        host.expect_request_port().never();

        let transport = transport(host);
        let ports = transport.discover(true).await.unwrap();

        assert_eq!(ports, vec![PortDescriptor::new(WEB_SERIAL_PORT_PATH)]);
        assert!(transport.has_captured_port());
    }

    #[tokio::test]
    async fn test_prompt_used_when_nothing_granted() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports().returning(|| Ok(Vec::new()));
        host.expect_request_port()
            .times(1)
            .returning(|_| Ok(HostPort::new("usb-2")));

        let transport = transport(host);
        let ports = transport.discover(true).await.unwrap();

        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].path, WEB_SERIAL_PORT_PATH);
        assert!(transport.has_captured_port());
    }

    #[tokio::test]
    async fn test_denied_prompt_yields_empty_list() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports().returning(|| Ok(Vec::new()));
        host.expect_request_port().times(1).returning(|_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "user dismissed"))
        });

        let transport = transport(host);
        let ports = transport.discover(true).await.unwrap();

        assert!(ports.is_empty());
        assert!(!transport.has_captured_port());
    }

    #[tokio::test]
    async fn test_prompt_receives_configured_filters() {
        let filters = vec![PortFilter::new(0x2341, 0x0043)];

        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_request_port()
            .withf(|filters| filters.len() == 1 && filters[0] == PortFilter::new(0x2341, 0x0043))
            .times(1)
            .returning(|_| Ok(HostPort::new("usb-3")));

        let transport = transport(host).with_filters(filters);
        let port = transport.request_port().await.unwrap();
        assert!(port.is_some());
    }

    #[tokio::test]
    async fn test_list_ports_does_not_capture() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports()
            .times(2)
            .returning(|| Ok(vec![HostPort::new("usb-a"), HostPort::new("usb-b")]));
        host.expect_request_port().never();

        let transport = transport(host);
        let first = transport.list_ports().await.unwrap();
        let second = transport.list_ports().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(!transport.has_captured_port());
    }

    #[tokio::test]
    async fn test_discover_captures_last_granted_port() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports()
            .returning(|| Ok(vec![HostPort::new("usb-a"), HostPort::new("usb-b")]));
        host.expect_open()
            .withf(|port, _| port.id() == "usb-b")
            .times(1)
            .returning(|_, _| Ok(Box::new(MockSerialPort::new("usb-b"))));

        let transport = transport(host);
        let ports = transport.discover(false).await.unwrap();
        assert_eq!(ports.len(), 2);
        assert!(transport.has_captured_port());

        assert!(transport.open(&ports[0], &LINE_SETTINGS).await.is_ok());
    }

    #[tokio::test]
    async fn test_open_without_any_port_is_no_port_selected() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports().returning(|| Ok(Vec::new()));
        host.expect_open().never();

        let transport = transport(host);
        let result = transport
            .open(&PortDescriptor::new(WEB_SERIAL_PORT_PATH), &LINE_SETTINGS)
            .await;
        assert!(matches!(result, Err(LinkError::NoPortSelected)));
    }

    #[tokio::test]
    async fn test_open_after_listing_uses_granted_port() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports()
            .returning(|| Ok(vec![HostPort::new("usb-4")]));
        host.expect_open()
            .withf(|port, settings| port.id() == "usb-4" && settings.baud_rate == 9600)
            .times(1)
            .returning(|_, _| Ok(Box::new(MockSerialPort::new("usb-4"))));

        let transport = transport(host);
        let ports = transport.list_ports().await.unwrap();
        let handle = transport.open(&ports[0], &LINE_SETTINGS).await;
        assert!(handle.is_ok());
    }

    #[tokio::test]
    async fn test_host_open_failure_is_connect_failed() {
        let mut host = MockSerialHost::new();
        host.expect_is_supported().return_const(true);
        host.expect_get_ports()
            .returning(|| Ok(vec![HostPort::new("usb-5")]));
        host.expect_open().returning(|_, _| {
            Err(io::Error::new(io::ErrorKind::Other, "device busy"))
        });

        let transport = transport(host);
        let ports = transport.list_ports().await.unwrap();
        let result = transport.open(&ports[0], &LINE_SETTINGS).await;

        match result {
            Err(LinkError::ConnectFailed(msg)) => assert!(msg.contains("device busy")),
            other => panic!("Expected ConnectFailed, got: {:?}", other.map(|_| ())),
        }
    }
}

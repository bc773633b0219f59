//! End-to-end tests through the public API
//!
//! Every scenario runs against the in-crate mock doubles, so no device is
//! needed. Time is paused; the settle and open delays auto-advance.

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use store_serial::bridge::{self, Request};
use store_serial::error::LinkError;
use store_serial::selection::{SelectionService, SendError};
use store_serial::serial::mock::{MockSerialPort, MockTransport, PortEvent};
use store_serial::serial::{
    ConnectionManager, ConnectionState, HostPort, LineSettings, PortDescriptor, PortFilter,
    PortTransport, SerialHost, SerialPortIO, Timeouts, WebSerialTransport, WEB_SERIAL_PORT_PATH,
};

fn service(transport: Arc<dyn PortTransport>) -> SelectionService {
    SelectionService::new(Arc::new(ConnectionManager::new(transport, Timeouts::default())))
}

/// Host with a fixed set of granted ports and an optional prompt answer
struct FakeHost {
    granted: Vec<HostPort>,
    prompt: Option<HostPort>,
    opened: Mutex<Vec<MockSerialPort>>,
}

impl FakeHost {
    fn new(granted: &[&str], prompt: Option<&str>) -> Self {
        Self {
            granted: granted.iter().map(|id| HostPort::new(*id)).collect(),
            prompt: prompt.map(HostPort::new),
            opened: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SerialHost for FakeHost {
    fn is_supported(&self) -> bool {
        true
    }

    async fn get_ports(&self) -> io::Result<Vec<HostPort>> {
        Ok(self.granted.clone())
    }

    async fn request_port(&self, _filters: &[PortFilter]) -> io::Result<HostPort> {
        self.prompt
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "prompt dismissed"))
    }

    async fn open(&self, port: &HostPort, _settings: &LineSettings) -> io::Result<Box<dyn SerialPortIO>> {
        let handle = MockSerialPort::new(port.id());
        self.opened.lock().unwrap().push(handle.clone());
        Ok(Box::new(handle))
    }
}

#[tokio::test(start_paused = true)]
async fn test_discover_connect_send_disconnect() {
    let transport = Arc::new(MockTransport::with_ports(&["/dev/ttyACM0"]));
    let service = service(transport.clone());

    let listing = service.list_ports().await.unwrap();
    assert_eq!(listing.ports, vec![PortDescriptor::new("/dev/ttyACM0")]);

    let opened = service.connect(listing.ports.first().cloned()).await.unwrap();
    assert_eq!(opened.path, "/dev/ttyACM0");
    assert_eq!(service.state(), ConnectionState::Open);

    service.send_selection(7, 2).await.unwrap();

    service.disconnect().await.unwrap();
    service.disconnect().await.unwrap();
    assert_eq!(service.state(), ConnectionState::Closed);

    let port = transport.last_port().unwrap();
    assert_eq!(port.written_lines(), vec!["5*7*2*\n".to_string()]);
    assert_eq!(port.close_count(), 1);
    assert_eq!(
        transport.events(),
        vec![
            PortEvent::Opened("/dev/ttyACM0".to_string()),
            PortEvent::Closed("/dev/ttyACM0".to_string()),
        ]
    );

    let after = service.send_selection(7, 2).await;
    assert!(matches!(after, Err(SendError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_web_backend_prompts_when_nothing_granted() {
    let transport = Arc::new(
        WebSerialTransport::new(FakeHost::new(&[], Some("usb-2341-0043")))
            .with_open_settle(Duration::from_millis(100)),
    );
    let service = service(transport.clone());

    let listing = service.list_ports().await.unwrap();
    assert!(listing.ports.is_empty());
    assert!(!listing.use_web_serial);

    let opened = service.connect(None).await.unwrap();
    assert_eq!(opened.path, WEB_SERIAL_PORT_PATH);
    assert!(transport.has_captured_port());

    service.send_selection(12, 1).await.unwrap();
    service.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_web_backend_declined_prompt() {
    let transport = Arc::new(WebSerialTransport::new(FakeHost::new(&[], None)));
    let service = service(transport);

    let result = service.connect(None).await;
    assert!(matches!(result, Err(LinkError::NoPortSelected)));
    assert_eq!(service.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_write_fault_requires_reconnect() {
    let transport = Arc::new(MockTransport::with_ports(&["COM4"]));
    let service = service(transport.clone());
    service.connect(None).await.unwrap();

    transport.last_port().unwrap().set_stall_writes(true);
    let stalled = service.send_selection(1, 1).await;
    assert!(matches!(
        stalled,
        Err(SendError::SendFailed(LinkError::WriteTimeout(_)))
    ));
    assert_eq!(service.state(), ConnectionState::Faulted);

    service.connect(None).await.unwrap();
    service.send_selection(1, 1).await.unwrap();

    let ports = transport.opened_ports();
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[0].close_count(), 1);
    assert_eq!(ports[1].written_lines(), vec!["5*1*1*\n".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_bridge_session() {
    let transport = Arc::new(MockTransport::with_ports(&["/dev/ttyUSB1"]));
    let service = service(transport.clone());

    let response = bridge::handle_request(&service, Request::Connect { path: None }).await;
    assert!(response.ok);
    assert_eq!(response.port.as_deref(), Some("/dev/ttyUSB1"));

    let response = bridge::handle_request(&service, Request::Send { id: 0, quantity: 1 }).await;
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("Invalid product selection"));

    let response = bridge::handle_request(&service, Request::Send { id: 3, quantity: 4 }).await;
    assert!(response.ok);

    let response = bridge::handle_request(&service, Request::Disconnect).await;
    assert!(response.ok);
    assert_eq!(response.state, ConnectionState::Closed);

    assert_eq!(
        transport.last_port().unwrap().written_lines(),
        vec!["5*3*4*\n".to_string()]
    );
}

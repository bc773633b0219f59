//! Mock serial backend for testing.
//!
//! Provides a `MockSerialPort` that records written bytes and a
//! `MockTransport` that hands those ports out, so the connection manager can
//! be exercised without hardware. Both support error injection and stalls.
//!
//! Built for unit tests, and for integration tests through the `test-util`
//! feature.

use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::port_trait::{BackendKind, PortDescriptor, PortTransport, SerialPortIO};
use super::LineSettings;
use crate::error::{LinkError, Result};

/// Lifecycle events observed by the mock backend, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Opened(String),
    Closed(String),
}

/// Mock serial port for testing
#[derive(Clone)]
pub struct MockSerialPort {
    path: String,
    pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
    pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
    pub flush_error: Arc<Mutex<Option<io::ErrorKind>>>,
    stall_writes: Arc<AtomicBool>,
    close_count: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<PortEvent>>>,
}

impl MockSerialPort {
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_events(path, Arc::new(Mutex::new(Vec::new())))
    }

    fn with_events(path: impl Into<String>, events: Arc<Mutex<Vec<PortEvent>>>) -> Self {
        Self {
            path: path.into(),
            written_data: Arc::new(Mutex::new(Vec::new())),
            write_error: Arc::new(Mutex::new(None)),
            flush_error: Arc::new(Mutex::new(None)),
            stall_writes: Arc::new(AtomicBool::new(false)),
            close_count: Arc::new(AtomicUsize::new(0)),
            events,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get_written_data(&self) -> Vec<Vec<u8>> {
        self.written_data.lock().unwrap().clone()
    }

    /// Written chunks decoded as text lines
    pub fn written_lines(&self) -> Vec<String> {
        self.get_written_data()
            .into_iter()
            .map(|chunk| String::from_utf8_lossy(&chunk).into_owned())
            .collect()
    }

    pub fn set_write_error(&self, error: io::ErrorKind) {
        *self.write_error.lock().unwrap() = Some(error);
    }

    pub fn set_flush_error(&self, error: io::ErrorKind) {
        *self.flush_error.lock().unwrap() = Some(error);
    }

    /// Make every subsequent write hang forever
    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    /// How many times the port was released
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SerialPortIO for MockSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = *self.write_error.lock().unwrap() {
            return Err(io::Error::new(error, "Mock write error"));
        }
        self.written_data.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if let Some(error) = *self.flush_error.lock().unwrap() {
            return Err(io::Error::new(error, "Mock flush error"));
        }
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(PortEvent::Closed(self.path.clone()));
        Ok(())
    }
}

/// Mock backend handing out `MockSerialPort`s
pub struct MockTransport {
    kind: BackendKind,
    ports: Mutex<Vec<PortDescriptor>>,
    requestable: Mutex<Option<PortDescriptor>>,
    request_count: AtomicUsize,
    list_count: AtomicUsize,
    open_error: Mutex<Option<io::ErrorKind>>,
    stall_open: AtomicBool,
    opened: Mutex<Vec<MockSerialPort>>,
    events: Arc<Mutex<Vec<PortEvent>>>,
}

impl MockTransport {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            ports: Mutex::new(Vec::new()),
            requestable: Mutex::new(None),
            request_count: AtomicUsize::new(0),
            list_count: AtomicUsize::new(0),
            open_error: Mutex::new(None),
            stall_open: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Native-style mock listing the given paths
    pub fn with_ports(paths: &[&str]) -> Self {
        let transport = Self::new(BackendKind::Native);
        *transport.ports.lock().unwrap() = paths.iter().map(|p| PortDescriptor::new(*p)).collect();
        transport
    }

    /// Port returned by the next `request_port` (None = user declined)
    pub fn set_requestable(&self, path: Option<&str>) {
        *self.requestable.lock().unwrap() = path.map(PortDescriptor::new);
    }

    pub fn set_open_error(&self, error: Option<io::ErrorKind>) {
        *self.open_error.lock().unwrap() = error;
    }

    /// Make every subsequent open hang forever
    pub fn set_stall_open(&self, stall: bool) {
        self.stall_open.store(stall, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    /// Every port handed out so far, oldest first
    pub fn opened_ports(&self) -> Vec<MockSerialPort> {
        self.opened.lock().unwrap().clone()
    }

    /// Most recently opened port
    pub fn last_port(&self) -> Option<MockSerialPort> {
        self.opened.lock().unwrap().last().cloned()
    }

    pub fn events(&self) -> Vec<PortEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortTransport for MockTransport {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.ports.lock().unwrap().clone())
    }

    async fn request_port(&self) -> Result<Option<PortDescriptor>> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.requestable.lock().unwrap().clone())
    }

    async fn open(
        &self,
        descriptor: &PortDescriptor,
        _settings: &LineSettings,
    ) -> Result<Box<dyn SerialPortIO>> {
        if self.stall_open.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = *self.open_error.lock().unwrap() {
            return Err(LinkError::ConnectFailed(format!(
                "{}: {}",
                descriptor.path,
                io::Error::from(error)
            )));
        }

        let port = MockSerialPort::with_events(descriptor.path.clone(), self.events.clone());
        self.events
            .lock()
            .unwrap()
            .push(PortEvent::Opened(descriptor.path.clone()));
        self.opened.lock().unwrap().push(port.clone());

        Ok(Box::new(port))
    }
}

//! # Connection Lifecycle Manager
//!
//! Owns the single active serial connection and the write channel on top of it.
//!
//! ## States
//!
//! ```text
//! Closed --open--> Opening --ok--> Open --close--> Closed
//!                     |              |
//!                     +--fail/timeout--> Closed
//!                                    +--write I/O error / timeout--> Faulted
//! ```
//!
//! `Faulted` counts as closed for every check; the port handle is released as
//! soon as the fault is seen so nothing retries against a dead port.
//!
//! ## Write serialization
//!
//! The port slot sits behind a `tokio::sync::Mutex`, which hands out the lock
//! in FIFO order. Concurrent writes therefore queue behind each other and
//! reach the firmware in the order they were issued. The write deadline
//! starts once a write owns the port; queueing time is not counted.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::port_trait::{PortDescriptor, PortTransport, SerialPortIO};
use super::LINE_SETTINGS;
use crate::error::{LinkError, Result};

/// Default time allowed for a port to open
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for a single write to flush
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default pause after each write so the firmware's read loop keeps up
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
    Faulted,
}

/// Timing contract of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub write: Duration,
    pub settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
            settle: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Encoded bytes of one command plus the deadline for flushing them
#[derive(Debug, Clone)]
pub struct WriteRequest {
    payload: Bytes,
    deadline: Duration,
}

impl WriteRequest {
    pub fn new(payload: Bytes, deadline: Duration) -> Self {
        Self { payload, deadline }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// The open port and, for diagnostics only, where it came from
struct ActivePort {
    io: Box<dyn SerialPortIO>,
    path: String,
}

/// Owner of the single active connection
///
/// Construct one per process (or per controller) and share it via `Arc`.
/// Callers never see the port handle.
pub struct ConnectionManager {
    transport: Arc<dyn PortTransport>,
    timeouts: Timeouts,
    slot: Mutex<Option<ActivePort>>,
    state: watch::Sender<ConnectionState>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.transport.kind())
            .field("state", &self.state())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PortTransport>, timeouts: Timeouts) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            transport,
            timeouts,
            slot: Mutex::new(None),
            state,
        }
    }

    /// The backend this manager opens ports through
    pub fn transport(&self) -> &Arc<dyn PortTransport> {
        &self.transport
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch lifecycle changes (e.g. to drive a "Connected" indicator)
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Path or label of the open port, for diagnostics
    pub async fn active_path(&self) -> Option<String> {
        self.slot.lock().await.as_ref().map(|port| port.path.clone())
    }

    /// Enumerate ports on the backend (no prompt)
    ///
    /// Bounded by the connect timeout; a backend that does not answer in time
    /// is reported as having no ports.
    pub async fn list_ports(&self) -> Result<Vec<PortDescriptor>> {
        match timeout(self.timeouts.connect, self.transport.list_ports()).await {
            Ok(listed) => listed,
            Err(_) => {
                warn!("Port enumeration timed out after {:?}", self.timeouts.connect);
                Ok(Vec::new())
            }
        }
    }

    /// Explicitly ask the backend for a new device
    ///
    /// On permission-gated backends this may show a prompt.
    pub async fn request_port(&self) -> Result<Option<PortDescriptor>> {
        self.transport.request_port().await
    }

    /// Open a connection, replacing any open one
    ///
    /// The previous port is fully released before the new one is opened, so
    /// two ports are never open at once.
    ///
    /// # Errors
    ///
    /// - `ConnectTimeout` - The backend did not open the port in time
    /// - `ConnectFailed` / `NoPortSelected` - The backend refused
    ///
    /// The state is `Closed` after any failure. Nothing is retried.
    pub async fn open(&self, descriptor: &PortDescriptor) -> Result<()> {
        let mut slot = self.slot.lock().await;

        if let Some(previous) = slot.take() {
            info!("Closing {} before opening {}", previous.path, descriptor.path);
            if let Err(e) = Self::release(previous).await {
                warn!("Error while closing previous port: {}", e);
            }
            self.set_state(ConnectionState::Closed);
        }

        self.set_state(ConnectionState::Opening);
        debug!("Opening {}", descriptor.path);

        let opened = timeout(
            self.timeouts.connect,
            self.transport.open(descriptor, &LINE_SETTINGS),
        )
        .await;

        match opened {
            Ok(Ok(io)) => {
                *slot = Some(ActivePort {
                    io,
                    path: descriptor.path.clone(),
                });
                self.set_state(ConnectionState::Open);
                info!("Connected to {}", descriptor.path);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Closed);
                error!("Connection to {} failed: {}", descriptor.path, e);
                Err(e)
            }
            Err(_) => {
                self.set_state(ConnectionState::Closed);
                error!(
                    "Connection to {} timed out after {:?}",
                    descriptor.path, self.timeouts.connect
                );
                Err(LinkError::ConnectTimeout(self.timeouts.connect))
            }
        }
    }

    /// Close the connection
    ///
    /// Idempotent: closing when nothing is open is a no-op. A faulted
    /// connection is moved back to `Closed`.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;

        let result = match slot.take() {
            Some(port) => {
                let path = port.path.clone();
                let result = Self::release(port).await;
                info!("Disconnected from {}", path);
                result
            }
            None => Ok(()),
        };

        self.set_state(ConnectionState::Closed);
        result
    }

    /// Write bytes to the open connection
    ///
    /// Success means the bytes were written and flushed within the write
    /// deadline and the settle delay has elapsed. The firmware sends no
    /// acknowledgement.
    ///
    /// # Errors
    ///
    /// - `NotConnected` - Nothing is open; no I/O is attempted
    /// - `WriteTimeout` - The write did not flush in time; the connection is faulted
    /// - `Io` - The port failed; the connection is faulted
    pub async fn write(&self, payload: Bytes) -> Result<()> {
        if !self.is_open() {
            return Err(LinkError::NotConnected);
        }

        let request = WriteRequest::new(payload, self.timeouts.write);
        let mut slot = self.slot.lock().await;

        let port = match slot.as_mut() {
            Some(port) => port,
            None => return Err(LinkError::NotConnected),
        };

        let outcome = timeout(request.deadline(), async {
            port.io.write_all(request.payload()).await?;
            port.io.flush().await
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                debug!("Sent {} bytes to {}", request.payload().len(), port.path);
                sleep(self.timeouts.settle).await;
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Write to {} failed: {}", port.path, e);
                self.fault(&mut slot).await;
                Err(LinkError::Io(e))
            }
            Err(_) => {
                warn!(
                    "Write to {} timed out after {:?}",
                    port.path,
                    request.deadline()
                );
                self.fault(&mut slot).await;
                Err(LinkError::WriteTimeout(request.deadline()))
            }
        }
    }

    /// Drop a port that failed mid-write and mark the connection faulted
    async fn fault(&self, slot: &mut MutexGuard<'_, Option<ActivePort>>) {
        if let Some(port) = slot.take() {
            if let Err(e) = Self::release(port).await {
                warn!("Error while releasing faulted port: {}", e);
            }
        }
        self.set_state(ConnectionState::Faulted);
    }

    /// Release a port; the handle is dropped on every path
    async fn release(mut port: ActivePort) -> Result<()> {
        port.io.close().await?;
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

//! # Selection Service
//!
//! The request/response surface the product UI uses: list ports, connect,
//! send "product selected" commands, disconnect.
//!
//! Connecting is always an explicit action. `send_selection` never opens a
//! port on its own; on a permission-gated backend that would mean surfacing a
//! prompt the user did not ask for.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{LinkError, Result};
use crate::protocol::{encode_frame, Command, Opcode};
use crate::serial::{BackendKind, ConnectionManager, ConnectionState, PortDescriptor};

/// Result of a port listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortListing {
    pub ports: Vec<PortDescriptor>,

    /// Native enumeration found nothing; the caller should offer the
    /// permission-gated path instead
    pub use_web_serial: bool,
}

/// Failure of a single selection send
#[derive(Debug, Error)]
pub enum SendError {
    /// No connection is open; connect first
    #[error("Not connected")]
    NotConnected,

    /// The selection cannot be expressed in the wire protocol
    #[error("Invalid selection: {0}")]
    Encode(#[source] LinkError),

    /// The transport failed to deliver the command
    #[error("Send failed: {0}")]
    SendFailed(#[source] LinkError),
}

impl SendError {
    /// Short message suitable for a toast in the UI
    pub fn user_message(&self) -> &'static str {
        match self {
            SendError::NotConnected => "Please connect to Arduino first",
            SendError::Encode(_) => "Invalid product selection",
            SendError::SendFailed(_) => "Failed to send to Arduino",
        }
    }
}

/// Client-facing command API
#[derive(Debug, Clone)]
pub struct SelectionService {
    manager: Arc<ConnectionManager>,
    opcode: Opcode,
}

impl SelectionService {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self::with_opcode(manager, Opcode::SELECT)
    }

    /// Use a different opcode for selection commands
    pub fn with_opcode(manager: Arc<ConnectionManager>, opcode: Opcode) -> Self {
        Self { manager, opcode }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Enumerate ports without prompting
    pub async fn list_ports(&self) -> Result<PortListing> {
        let ports = self.manager.list_ports().await?;
        let use_web_serial =
            ports.is_empty() && self.manager.transport().kind() == BackendKind::Native;

        Ok(PortListing {
            ports,
            use_web_serial,
        })
    }

    /// Ask the backend for a new device
    ///
    /// # Errors
    ///
    /// Returns `NoPortSelected` if the user declined or nothing is available.
    pub async fn request_port(&self) -> Result<PortDescriptor> {
        self.manager
            .request_port()
            .await?
            .ok_or(LinkError::NoPortSelected)
    }

    /// Open a connection
    ///
    /// With no descriptor, discovery runs (prompting if nothing is granted)
    /// and the first port found is opened.
    ///
    /// # Returns
    ///
    /// * `Result<PortDescriptor>` - The descriptor that was opened
    pub async fn connect(&self, descriptor: Option<PortDescriptor>) -> Result<PortDescriptor> {
        let descriptor = match descriptor {
            Some(descriptor) => descriptor,
            None => self
                .manager
                .transport()
                .discover(true)
                .await?
                .into_iter()
                .next()
                .ok_or(LinkError::NoPortSelected)?,
        };

        self.manager.open(&descriptor).await?;
        info!("Connected to Arduino at {}", descriptor.path);
        Ok(descriptor)
    }

    /// Tell the firmware a product was selected
    ///
    /// Writes exactly one command line; never retries and never connects.
    ///
    /// # Errors
    ///
    /// - `NotConnected` - No open connection (including after a fault)
    /// - `Encode` - `product_id` / `quantity` have no wire representation
    /// - `SendFailed` - The write timed out or the port failed
    pub async fn send_selection(&self, product_id: i64, quantity: i64) -> std::result::Result<(), SendError> {
        if !self.manager.is_open() {
            return Err(SendError::NotConnected);
        }

        let command =
            Command::from_signed(self.opcode, product_id, quantity).map_err(SendError::Encode)?;

        match self.manager.write(encode_frame(&command)).await {
            Ok(()) => {
                debug!("Selection sent: product {} x{}", product_id, quantity);
                Ok(())
            }
            Err(LinkError::NotConnected) => Err(SendError::NotConnected),
            Err(e) if e.is_connection_fault() => {
                error!("Connection lost sending product {}, reconnect required: {}", product_id, e);
                Err(SendError::SendFailed(e))
            }
            Err(e) => {
                warn!("Failed to send selection for product {}: {}", product_id, e);
                Err(SendError::SendFailed(e))
            }
        }
    }

    /// Close the connection; safe to call repeatedly
    pub async fn disconnect(&self) -> Result<()> {
        self.manager.close().await
    }
}

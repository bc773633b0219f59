//! # Serial Communication Module
//!
//! Handles the serial link to the store's Arduino.
//!
//! This module handles:
//! - Opening the port at 9600 baud, 8N1, no flow control
//! - Port discovery through two backends (native OS registry, permission-gated host)
//! - The single active connection and its write channel
//! - Fault recovery by invalidating the connection

pub mod connection;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod native;
pub mod port_trait;
pub mod usb_host;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

pub use connection::{ConnectionManager, ConnectionState, Timeouts, WriteRequest};
pub use native::NativeTransport;
pub use port_trait::{BackendKind, PortDescriptor, PortTransport, SerialPortIO, TokioSerialPort};
pub use usb_host::UsbSerialHost;
pub use web::{HostPort, PortFilter, SerialHost, WebSerialTransport, WEB_SERIAL_PORT_PATH};

use crate::error::Result;

/// Baud rate expected by the firmware
pub const BAUD_RATE: u32 = 9600;

/// Line parameters passed at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

/// The only line settings the firmware understands (9600-8-N-1)
pub const LINE_SETTINGS: LineSettings = LineSettings {
    baud_rate: BAUD_RATE,
    data_bits: tokio_serial::DataBits::Eight,
    stop_bits: tokio_serial::StopBits::One,
    parity: tokio_serial::Parity::None,
    flow_control: tokio_serial::FlowControl::None,
};

/// Backend choice at the composition root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Native when it finds devices, otherwise the permission-gated backend
    #[default]
    Auto,
    Native,
    Web,
}

/// Build the transport for the configured backend
///
/// # Arguments
///
/// * `choice` - Requested backend
/// * `granted` - Filters treated as pre-granted by the permission-gated host
/// * `filters` - Filters used when the permission-gated host is asked for a port
/// * `open_settle` - Pause after a permission-gated open
pub async fn select_transport(
    choice: BackendChoice,
    granted: Vec<PortFilter>,
    filters: Vec<PortFilter>,
    open_settle: Duration,
) -> Result<Arc<dyn PortTransport>> {
    let web = move || -> Arc<dyn PortTransport> {
        Arc::new(
            WebSerialTransport::new(UsbSerialHost::new(granted))
                .with_filters(filters)
                .with_open_settle(open_settle),
        )
    };

    let transport = match choice {
        BackendChoice::Native => Arc::new(NativeTransport::new()) as Arc<dyn PortTransport>,
        BackendChoice::Web => web(),
        BackendChoice::Auto => {
            let native = NativeTransport::new();
            if native.list_ports().await?.is_empty() {
                info!("No native serial devices, using permission-gated backend");
                web()
            } else {
                Arc::new(native) as Arc<dyn PortTransport>
            }
        }
    };

    info!("Serial backend: {:?}", transport.kind());
    Ok(transport)
}

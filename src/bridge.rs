//! # Request Bridge
//!
//! JSON-lines boundary in front of `SelectionService`. Each input line is one
//! request, each output line one response:
//!
//! ```text
//! {"op":"connect","path":"/dev/ttyACM0"}
//! {"ok":true,"port":"/dev/ttyACM0","state":"open","at":"2024-05-01T12:00:00+00:00"}
//! {"op":"send","id":7,"quantity":2}
//! {"ok":true,"state":"open","at":"2024-05-01T12:00:01+00:00"}
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::LinkError;
use crate::selection::{PortListing, SelectionService};
use crate::serial::{ConnectionState, PortDescriptor};

/// One bridge request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListPorts,
    RequestPort,
    Connect {
        #[serde(default)]
        path: Option<String>,
    },
    Send {
        id: i64,
        quantity: i64,
    },
    Disconnect,
    Status,
}

/// One bridge response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,

    /// User-facing failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortDescriptor>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_web_serial: Option<bool>,

    /// Port involved in the request, or the active port for `status`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    pub state: ConnectionState,

    /// RFC 3339 timestamp
    pub at: String,
}

impl Response {
    fn success(state: ConnectionState) -> Self {
        Self {
            ok: true,
            error: None,
            ports: None,
            use_web_serial: None,
            port: None,
            state,
            at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn failure(state: ConnectionState, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::success(state)
        }
    }

    fn with_listing(mut self, listing: PortListing) -> Self {
        self.ports = Some(listing.ports);
        self.use_web_serial = Some(listing.use_web_serial);
        self
    }

    fn with_port(mut self, port: Option<String>) -> Self {
        self.port = port;
        self
    }
}

fn connect_message(error: &LinkError) -> String {
    match error {
        LinkError::NoPortSelected => "No port selected".to_string(),
        other => format!("Failed to connect: {}", other),
    }
}

/// Execute one request against the service
pub async fn handle_request(service: &SelectionService, request: Request) -> Response {
    debug!("Bridge request: {:?}", request);

    match request {
        Request::ListPorts => match service.list_ports().await {
            Ok(listing) => Response::success(service.state()).with_listing(listing),
            Err(e) => Response::failure(service.state(), format!("Failed to list ports: {}", e)),
        },

        Request::RequestPort => match service.request_port().await {
            Ok(descriptor) => Response::success(service.state()).with_port(Some(descriptor.path)),
            Err(e) => Response::failure(service.state(), connect_message(&e)),
        },

        Request::Connect { path } => match service.connect(path.map(PortDescriptor::new)).await {
            Ok(descriptor) => Response::success(service.state()).with_port(Some(descriptor.path)),
            Err(e) => {
                warn!("Connect request failed: {}", e);
                Response::failure(service.state(), connect_message(&e))
            }
        },

        Request::Send { id, quantity } => match service.send_selection(id, quantity).await {
            Ok(()) => Response::success(service.state()),
            Err(e) => Response::failure(service.state(), e.user_message()),
        },

        Request::Disconnect => match service.disconnect().await {
            Ok(()) => Response::success(service.state()),
            Err(e) => Response::failure(service.state(), format!("Failed to disconnect: {}", e)),
        },

        Request::Status => {
            let port = service.manager().active_path().await;
            Response::success(service.state()).with_port(port)
        }
    }
}

/// Parse and execute one request line
pub async fn handle_line(service: &SelectionService, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle_request(service, request).await,
        Err(e) => Response::failure(service.state(), format!("Invalid request: {}", e)),
    }
}

/// Lines buffered between the reader thread and the bridge
const LINE_QUEUE_DEPTH: usize = 16;

/// Parse, execute and answer one line; blank lines get no response
async fn respond<W>(service: &SelectionService, line: &str, writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if line.trim().is_empty() {
        return Ok(());
    }

    let response = handle_line(service, line).await;
    let mut encoded = serde_json::to_vec(&response)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

/// Serve requests until `reader` reaches EOF
///
/// Every response is flushed before the next request is read.
pub async fn run<R, W>(service: &SelectionService, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        respond(service, &line, &mut writer).await?;
    }

    debug!("Bridge input closed");
    Ok(())
}

/// Serve requests arriving on `lines` until every sender is gone
pub async fn serve<W>(
    service: &SelectionService,
    mut lines: mpsc::Receiver<io::Result<String>>,
    mut writer: W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        respond(service, &line?, &mut writer).await?;
    }

    debug!("Bridge input closed");
    Ok(())
}

/// Read lines from a blocking source on a dedicated OS thread
///
/// The thread stops at EOF, after a read error, or once the receiver is
/// dropped. It is never joined: a read parked on an open pipe does not hold
/// up runtime shutdown.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: io::BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("bridge-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;

    Ok(rx)
}

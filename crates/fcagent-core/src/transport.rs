//! Agent endpoint addressing and dialing.
//!
//! The agent inside the VM is reached over vsock (context id + port). A TCP
//! endpoint is also accepted, which is handy when the agent's port is
//! forwarded to the host or when running against a local test agent.

use std::fmt;
use std::io;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Error;

/// A byte stream that can be both read and written.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + ?Sized> DuplexStream for T {}

/// Type-erased duplex stream handed out by dialers and connectors.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Where the agent (or one of its IO ports) listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Vsock { cid: u32, port: u32 },
    Tcp { host: String, port: u32 },
}

impl Endpoint {
    /// Same host, different port. Used to address the per-stream IO ports.
    #[must_use]
    pub fn with_port(&self, port: u32) -> Self {
        match self {
            Self::Vsock { cid, .. } => Self::Vsock { cid: *cid, port },
            Self::Tcp { host, .. } => Self::Tcp {
                host: host.clone(),
                port,
            },
        }
    }

    pub const fn port(&self) -> u32 {
        match self {
            Self::Vsock { port, .. } | Self::Tcp { port, .. } => *port,
        }
    }

    /// Open a connection to this endpoint.
    pub async fn dial(&self) -> io::Result<BoxedStream> {
        match self {
            Self::Tcp { host, port } => {
                let port = u16::try_from(*port).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("port {port} out of range"))
                })?;
                let stream = TcpStream::connect((host.as_str(), port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            Self::Vsock { cid, port } => dial_vsock(*cid, *port).await,
        }
    }
}

#[cfg(target_os = "linux")]
async fn dial_vsock(cid: u32, port: u32) -> io::Result<BoxedStream> {
    let stream =
        tokio_vsock::VsockStream::connect(tokio_vsock::VsockAddr::new(cid, port)).await?;
    Ok(Box::new(stream))
}

#[cfg(not(target_os = "linux"))]
#[allow(clippy::unused_async)]
async fn dial_vsock(_cid: u32, _port: u32) -> io::Result<BoxedStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "vsock is only available on Linux",
    ))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vsock { cid, port } => write!(f, "vsock://{cid}:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// Parses `vsock://<cid>:<port>`, `tcp://<host>:<port>` or bare `<host>:<port>`
/// (TCP).
impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidEndpoint(s.to_string());
        let (scheme, rest) = s.split_once("://").unwrap_or(("tcp", s));
        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let port: u32 = port.parse().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        match scheme {
            "vsock" => Ok(Self::Vsock {
                cid: host.parse().map_err(|_| invalid())?,
                port,
            }),
            "tcp" => {
                if port > u32::from(u16::MAX) {
                    return Err(invalid());
                }
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(invalid()),
        }
    }
}

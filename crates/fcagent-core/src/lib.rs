//! fcagent Core Library
//!
//! Shared functionality for the fcagent client:
//! - Standard stream relay between local handles and a remote process
//! - Agent endpoint addressing and dialing (vsock, TCP)
//! - Configuration loading
//! - Common error types and tracing setup

pub mod config;
pub mod error;
pub mod io;
pub mod tracing_init;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use io::{ConnectorPair, IoConnector, IoProxySet, RelayConfig, RelayError, Signal};
pub use transport::{BoxedStream, DuplexStream, Endpoint};

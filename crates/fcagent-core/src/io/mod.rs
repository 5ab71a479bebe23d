//! Standard stream relay.
//!
//! A [`IoProxySet`] owns up to three [`ConnectorPair`]s (stdin, stdout,
//! stderr). Starting the set runs one stream proxy per pair: both ends are
//! acquired concurrently, then bytes are copied from the read end to the
//! write end until EOF, an error, or the process-exit grace period runs out.
//! Outcomes are folded into two single-delivery [`Signal`]s: one for
//! initialization and one for copying.

mod connector;
mod error;
mod proxy;
mod set;

pub use connector::{ConnectorPair, ConnectorResult, DialOptions, IoConnector, StdioStream};
pub use error::{CloseError, ConnectorError, RelayError, is_closed_error};
pub use set::{
    DEFAULT_BUFFER_SIZE, DEFAULT_IO_FLUSH_TIMEOUT, IoProxySet, RelayConfig, Signal,
};

//! Relay error types and close-error classification.

use std::fmt;
use std::io;

/// Messages produced when a stream is read or written after it was closed,
/// either by the exit watcher or by the peer going away.
const CLOSED_CONNECTION_PATTERNS: [&str; 2] =
    ["use of closed network connection", "file already closed"];

/// Failure to acquire one end of a connector pair.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("connector cancelled")]
    Cancelled,

    #[error("connector dropped without producing a stream")]
    Dropped,
}

/// Errors surfaced on relay signals.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("error initializing io: {0}")]
    Init(#[source] ConnectorError),

    #[error("error copying io: {0}")]
    Copy(#[source] io::Error),

    #[error("io relay task ended without reporting an outcome")]
    Aborted,
}

/// Every error hit while closing a set of streams.
#[derive(Debug, thiserror::Error)]
#[error("{} error(s) occurred closing io streams{}", .0.len(), Causes(.0))]
pub struct CloseError(pub Vec<io::Error>);

struct Causes<'a>(&'a [io::Error]);

impl fmt::Display for Causes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|err| write!(f, "; {err}"))
    }
}

/// Whether a copy error is the benign result of a stream being closed
/// underneath the copy loop.
pub fn is_closed_error(err: &io::Error) -> bool {
    let msg = err.to_string();
    CLOSED_CONNECTION_PATTERNS
        .iter()
        .any(|pattern| msg.contains(pattern))
}

/// Shutdown errors that only mean the stream was already closed.
pub(crate) fn is_already_closed(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::NotConnected) || is_closed_error(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_connection_messages_are_benign() {
        let err = io::Error::other("read tcp: use of closed network connection");
        assert!(is_closed_error(&err));
        let err = io::Error::other("read /dev/stdin: file already closed");
        assert!(is_closed_error(&err));
    }

    #[test]
    fn other_errors_are_not_benign() {
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer");
        assert!(!is_closed_error(&err));
    }

    #[test]
    fn not_connected_on_shutdown_is_already_closed() {
        let err = io::Error::from(io::ErrorKind::NotConnected);
        assert!(is_already_closed(&err));
    }

    #[test]
    fn close_error_lists_every_cause() {
        let err = CloseError(vec![io::Error::other("a"), io::Error::other("b")]);
        assert_eq!(err.to_string(), "2 error(s) occurred closing io streams; a; b");
    }

    #[test]
    fn init_error_wraps_connector_message() {
        let err = RelayError::Init(ConnectorError::Io(io::Error::other("dial failed")));
        assert_eq!(err.to_string(), "error initializing io: dial failed");
    }
}

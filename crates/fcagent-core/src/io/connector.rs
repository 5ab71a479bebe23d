//! Connectors: deferred acquisition of one end of a relay.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};

use super::error::ConnectorError;
use crate::transport::{BoxedStream, DuplexStream, Endpoint};

/// Outcome of a single connector invocation.
pub type ConnectorResult = Result<BoxedStream, ConnectorError>;

type AcquireFn =
    Box<dyn FnOnce(CancellationToken, Span) -> oneshot::Receiver<ConnectorResult> + Send>;

/// A capability that yields one end of a duplex stream, once.
///
/// Invoking a connector never blocks: the acquisition runs on its own task
/// and the result is delivered on a oneshot channel. Cancelling the token
/// aborts an in-flight acquisition and delivers [`ConnectorError::Cancelled`].
pub struct IoConnector {
    acquire: AcquireFn,
}

impl IoConnector {
    pub fn new<F>(acquire: F) -> Self
    where
        F: FnOnce(CancellationToken, Span) -> oneshot::Receiver<ConnectorResult> + Send + 'static,
    {
        Self {
            acquire: Box::new(acquire),
        }
    }

    /// Run `connect` on a spawned task, racing it against cancellation.
    pub fn from_fn<F, Fut>(connect: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ConnectorResult> + Send + 'static,
    {
        Self::new(move |cancel, span| {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(
                async move {
                    let result = tokio::select! {
                        result = connect(cancel.clone()) => result,
                        () = cancel.cancelled() => Err(ConnectorError::Cancelled),
                    };
                    if tx.send(result).is_err() {
                        debug!("connector result dropped, receiver gone");
                    }
                }
                .instrument(span),
            );
            rx
        })
    }

    /// An already-open stream. The result is available immediately.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: DuplexStream + 'static,
    {
        Self::new(move |_cancel, _span| {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Ok(Box::new(stream) as BoxedStream));
            rx
        })
    }

    /// The local process's standard input. Closing it through the relay
    /// leaves the real handle open.
    pub fn stdin() -> Self {
        Self::from_stream(StdioStream::new(tokio::io::stdin(), tokio::io::sink()))
    }

    /// The local process's standard output.
    pub fn stdout() -> Self {
        Self::from_stream(StdioStream::new(tokio::io::empty(), tokio::io::stdout()))
    }

    /// The local process's standard error.
    pub fn stderr() -> Self {
        Self::from_stream(StdioStream::new(tokio::io::empty(), tokio::io::stderr()))
    }

    /// Dial `endpoint`, retrying while the remote side is not listening yet.
    pub fn dial(endpoint: Endpoint, options: DialOptions) -> Self {
        Self::from_fn(move |cancel| async move {
            let mut attempt = 1;
            loop {
                match endpoint.dial().await {
                    Ok(stream) => {
                        debug!(%endpoint, attempt, "io stream connected");
                        return Ok(stream);
                    }
                    Err(e) if attempt < options.attempts => {
                        debug!(%endpoint, attempt, error = %e, "io dial failed, retrying");
                    }
                    Err(e) => {
                        warn!(%endpoint, attempt, error = %e, "io dial failed");
                        return Err(ConnectorError::Io(e));
                    }
                }
                attempt += 1;
                tokio::select! {
                    () = tokio::time::sleep(options.backoff) => {}
                    () = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                }
            }
        })
    }

    pub(crate) fn acquire(
        self,
        cancel: CancellationToken,
        span: Span,
    ) -> oneshot::Receiver<ConnectorResult> {
        (self.acquire)(cancel, span)
    }
}

impl std::fmt::Debug for IoConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoConnector").finish_non_exhaustive()
    }
}

/// Retry policy for [`IoConnector::dial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialOptions {
    /// Total connection attempts, including the first.
    pub attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Binds the read end and write end of one relay direction.
#[derive(Debug)]
pub struct ConnectorPair {
    pub read: IoConnector,
    pub write: IoConnector,
}

impl ConnectorPair {
    pub const fn new(read: IoConnector, write: IoConnector) -> Self {
        Self { read, write }
    }
}

/// Joins a reader and a writer into one duplex stream whose shutdown only
/// flushes. Used for process-wide handles the relay must not close.
pub struct StdioStream<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StdioStream<R, W> {
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: AsyncRead + Unpin, W: Unpin> AsyncRead for StdioStream<R, W> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl<R: Unpin, W: AsyncWrite + Unpin> AsyncWrite for StdioStream<R, W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn from_stream_delivers_immediately() {
        let (local, _remote) = tokio::io::duplex(64);
        let rx = IoConnector::from_stream(local).acquire(CancellationToken::new(), Span::none());
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn from_fn_reports_cancellation() {
        let cancel = CancellationToken::new();
        let connector = IoConnector::from_fn(|_| std::future::pending());
        let rx = connector.acquire(cancel.clone(), Span::none());
        cancel.cancel();
        match rx.await.unwrap() {
            Err(ConnectorError::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn dial_gives_up_after_attempts() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port: u32::from(port),
        };
        let options = DialOptions {
            attempts: 2,
            backoff: Duration::from_millis(1),
        };
        let rx = IoConnector::dial(endpoint, options).acquire(CancellationToken::new(), Span::none());
        assert!(matches!(rx.await.unwrap(), Err(ConnectorError::Io(_))));
    }

    #[tokio::test]
    async fn stdio_stream_shutdown_keeps_writer_usable() {
        let (writer, mut peer) = tokio::io::duplex(64);
        let mut stream = StdioStream::new(tokio::io::empty(), writer);
        stream.write_all(b"a").await.unwrap();
        stream.shutdown().await.unwrap();
        stream.write_all(b"b").await.unwrap();
        drop(stream);
        let mut out = Vec::new();
        peer.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ab");
    }
}

//! Per-direction stream proxy: acquire both ends, then copy.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span};

use super::connector::{ConnectorPair, ConnectorResult};
use super::error::{CloseError, ConnectorError, RelayError, is_already_closed, is_closed_error};
use crate::transport::BoxedStream;

/// Receivers for one proxy's phase outcomes.
///
/// `copy_done` is dropped without a value when initialization failed or the
/// copy ended cleanly; callers treat a closed channel as success.
pub(crate) struct ProxyHandles {
    pub init_done: oneshot::Receiver<Result<(), RelayError>>,
    pub copy_done: oneshot::Receiver<Result<(), RelayError>>,
}

impl ConnectorPair {
    /// Start relaying this pair.
    ///
    /// Both connectors are invoked before this returns; everything else runs
    /// on a spawned task. Once `exit` is cancelled, the streams are force
    /// closed after `timeout_after_exit` unless the copy ended on its own.
    pub(crate) fn proxy(
        self,
        exit: CancellationToken,
        timeout_after_exit: Duration,
        buffer_size: usize,
        span: Span,
    ) -> ProxyHandles {
        let (init_tx, init_done) = oneshot::channel();
        let (copy_tx, copy_done) = oneshot::channel();

        // Aborts acquisitions still in flight once this proxy is finished.
        let io_cancel = CancellationToken::new();
        let reader_rx = self.read.acquire(
            io_cancel.clone(),
            info_span!(parent: &span, "connector", direction = "read"),
        );
        let writer_rx = self.write.acquire(
            io_cancel.clone(),
            info_span!(parent: &span, "connector", direction = "write"),
        );

        tokio::spawn(
            async move {
                let _cancel_on_exit = io_cancel.drop_guard();

                let Some((reader, writer)) = initialize(reader_rx, writer_rx, init_tx).await
                else {
                    return;
                };

                if let Err(e) =
                    copy_until_exit(reader, writer, exit, timeout_after_exit, buffer_size).await
                {
                    let _ = copy_tx.send(Err(e));
                }
            }
            .instrument(span),
        );

        ProxyHandles {
            init_done,
            copy_done,
        }
    }
}

/// Wait for both connector results. The first failure is sent on `init_tx`
/// right away; both results are still drained so a stream that did connect
/// gets closed.
async fn initialize(
    mut reader_rx: oneshot::Receiver<ConnectorResult>,
    mut writer_rx: oneshot::Receiver<ConnectorResult>,
    init_tx: oneshot::Sender<Result<(), RelayError>>,
) -> Option<(BoxedStream, BoxedStream)> {
    let mut init_tx = Some(init_tx);
    let mut reader = None;
    let mut writer = None;
    let mut reader_done = false;
    let mut writer_done = false;

    while !(reader_done && writer_done) {
        let outcome = tokio::select! {
            result = &mut reader_rx, if !reader_done => {
                reader_done = true;
                flatten(result).map(|stream| reader = Some(stream))
            }
            result = &mut writer_rx, if !writer_done => {
                writer_done = true;
                flatten(result).map(|stream| writer = Some(stream))
            }
        };

        if let Err(e) = outcome {
            let err = RelayError::Init(e);
            error!(error = %err, "io initialization failed");
            if let Some(tx) = init_tx.take() {
                let _ = tx.send(Err(err));
            }
        }
    }

    match (init_tx, reader, writer) {
        (Some(tx), Some(reader), Some(writer)) => {
            let _ = tx.send(Ok(()));
            Some((reader, writer))
        }
        (_, reader, writer) => {
            log_close(reader.into_iter().chain(writer).collect()).await;
            None
        }
    }
}

fn flatten(result: Result<ConnectorResult, oneshot::error::RecvError>) -> ConnectorResult {
    result.unwrap_or_else(|_| Err(ConnectorError::Dropped))
}

/// Copy phase. Benign closed-stream errors are logged and swallowed.
async fn copy_until_exit(
    mut reader: BoxedStream,
    mut writer: BoxedStream,
    exit: CancellationToken,
    timeout_after_exit: Duration,
    buffer_size: usize,
) -> Result<(), RelayError> {
    let finished = CancellationToken::new();
    let force_close = CancellationToken::new();
    tokio::spawn(
        watch_exit(
            exit,
            timeout_after_exit,
            finished.clone(),
            force_close.clone(),
        )
        .in_current_span(),
    );
    let _finished = finished.drop_guard();

    debug!("begin copying io");
    let mut copied = 0u64;
    let result = tokio::select! {
        result = copy_chunks(&mut reader, &mut writer, buffer_size, &mut copied) => result,
        () = force_close.cancelled() => {
            info!("io stream still open after process exit, closing");
            Ok(())
        }
    };
    debug!(bytes = copied, "end copying io");

    log_close(vec![reader, writer]).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if is_closed_error(&e) => {
            info!(error = %e, "connection was closed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "error copying io");
            Err(RelayError::Copy(e))
        }
    }
}

/// Force-close trigger: fires `timeout_after_exit` after `exit` is
/// cancelled, unless the copy reports `finished` first.
async fn watch_exit(
    exit: CancellationToken,
    timeout_after_exit: Duration,
    finished: CancellationToken,
    force_close: CancellationToken,
) {
    tokio::select! {
        () = exit.cancelled() => {}
        () = finished.cancelled() => return,
    }
    debug!(?timeout_after_exit, "process exited, waiting for io to drain");
    tokio::select! {
        () = tokio::time::sleep(timeout_after_exit) => force_close.cancel(),
        () = finished.cancelled() => {}
    }
}

async fn copy_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    copied: &mut u64,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    // A zero-length read buffer would look like EOF.
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}

/// Shut down every stream, folding failures into one logged [`CloseError`].
async fn log_close(streams: Vec<BoxedStream>) {
    let mut errors = Vec::new();
    for mut stream in streams {
        if let Err(e) = stream.shutdown().await
            && !is_already_closed(&e)
        {
            errors.push(e);
        }
    }
    if !errors.is_empty() {
        error!(error = %CloseError(errors), "error closing io stream");
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;

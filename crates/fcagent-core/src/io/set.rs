//! The stdin/stdout/stderr proxy set and its aggregate signals.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use super::connector::ConnectorPair;
use super::error::RelayError;
use super::proxy::ProxyHandles;

/// Once the process exits, how long stdout/stderr may keep draining before
/// they are closed.
pub const DEFAULT_IO_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunk size of each copy loop.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Relay tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Grace period for stdin after exit. Zero: the process cannot read it.
    pub stdin_grace: Duration,
    /// Grace period for stdout and stderr after exit.
    pub output_grace: Duration,
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stdin_grace: Duration::ZERO,
            output_grace: DEFAULT_IO_FLUSH_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Single-delivery aggregate outcome. Reading it consumes the handle.
#[derive(Debug)]
pub struct Signal {
    rx: oneshot::Receiver<Result<(), RelayError>>,
}

impl Signal {
    pub async fn recv(self) -> Result<(), RelayError> {
        self.rx.await.unwrap_or(Err(RelayError::Aborted))
    }
}

/// Relays up to three standard streams of one remote process.
#[derive(Debug)]
pub struct IoProxySet {
    stdin: Mutex<Option<ConnectorPair>>,
    stdout: Mutex<Option<ConnectorPair>>,
    stderr: Mutex<Option<ConnectorPair>>,
    config: RelayConfig,
    /// Set by `close()`; callers on other tasks poll it through `is_open()`.
    closed: Mutex<bool>,
}

impl IoProxySet {
    /// A `None` pair means that stream is not relayed.
    pub fn new(
        stdin: Option<ConnectorPair>,
        stdout: Option<ConnectorPair>,
        stderr: Option<ConnectorPair>,
    ) -> Self {
        Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            stderr: Mutex::new(stderr),
            config: RelayConfig::default(),
            closed: Mutex::new(false),
        }
    }

    #[must_use]
    pub const fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Start relaying every configured stream and return `(init_done,
    /// copy_done)`.
    ///
    /// `proc_exit` is cancelled by the caller when the remote process exits.
    /// The copy streams watch a child of it, which is additionally
    /// cancelled on the first copy failure and once all copies are done;
    /// cancellation only starts each stream's grace timer.
    ///
    /// The connector pairs are consumed: a second call relays nothing.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, proc_exit: &CancellationToken) -> (Signal, Signal) {
        let relay = proc_exit.child_token();
        let mut init_set = JoinSet::new();
        let mut copy_set = JoinSet::new();

        let streams = [
            ("stdin", take_pair(&mut self.stdin), self.config.stdin_grace),
            ("stdout", take_pair(&mut self.stdout), self.config.output_grace),
            ("stderr", take_pair(&mut self.stderr), self.config.output_grace),
        ];
        for (name, pair, grace) in streams {
            let Some(pair) = pair else {
                debug!(stream = name, "skipping proxy io for unset stream");
                continue;
            };
            let ProxyHandles {
                init_done,
                copy_done,
            } = pair.proxy(
                relay.clone(),
                grace,
                self.config.buffer_size,
                info_span!("io_proxy", stream = name),
            );
            init_set.spawn(async move { init_done.await.unwrap_or(Err(RelayError::Aborted)) });
            // A proxy that never started copying drops its sender.
            copy_set.spawn(async move { copy_done.await.unwrap_or(Ok(())) });
        }

        let (init_tx, init_rx) = oneshot::channel();
        tokio::spawn(
            async move {
                let _ = init_tx.send(first_error(init_set, None).await);
            }
            .instrument(info_span!("io_init_join")),
        );

        let (copy_tx, copy_rx) = oneshot::channel();
        tokio::spawn(
            async move {
                let result = first_error(copy_set, Some(&relay)).await;
                relay.cancel();
                let _ = copy_tx.send(result);
            }
            .instrument(info_span!("io_copy_join")),
        );

        (Signal { rx: init_rx }, Signal { rx: copy_rx })
    }

    /// Mark the relay closed. Streams close on their own.
    pub fn close(&self) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn is_open(&self) -> bool {
        !*self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn take_pair(slot: &mut Mutex<Option<ConnectorPair>>) -> Option<ConnectorPair> {
    slot.get_mut().unwrap_or_else(PoisonError::into_inner).take()
}

/// Wait for every task and keep the first error. Later errors are logged.
async fn first_error(
    mut set: JoinSet<Result<(), RelayError>>,
    cancel_on_error: Option<&CancellationToken>,
) -> Result<(), RelayError> {
    let mut first = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap_or_else(|e| {
            warn!(error = %e, "io relay task failed");
            Err(RelayError::Aborted)
        });
        let Err(err) = result else {
            continue;
        };
        if first.is_none() {
            if let Some(token) = cancel_on_error {
                token.cancel();
            }
            first = Some(err);
        } else {
            warn!(error = %err, "additional io relay error");
        }
    }
    first.map_or(Ok(()), Err)
}

//! Local terminal handling for `exec --tty`.

use std::io::IsTerminal;
use std::sync::Arc;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{debug, warn};

use fcagent_core::IoProxySet;
use fcagent_proto::methods::{RESIZE_PTY, TASK_SERVICE};
use fcagent_proto::task::ResizePtyRequest;

use crate::connection::{AgentConnection, ConnectionError};

/// Keeps the local terminal in raw mode until dropped.
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Enter raw mode when stdin is a terminal; `Ok(None)` otherwise.
    pub fn enable() -> std::io::Result<Option<Self>> {
        if !std::io::stdin().is_terminal() {
            debug!("stdin is not a terminal, leaving it as is");
            return Ok(None);
        }
        enable_raw_mode()?;
        Ok(Some(Self(())))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

/// Current local terminal size as `(width, height)`.
pub fn size() -> std::io::Result<(u16, u16)> {
    crossterm::terminal::size()
}

/// Identifies the remote process whose pty gets resized.
#[derive(Debug, Clone)]
pub struct PtyTarget {
    pub container_id: String,
    pub exec_id: String,
}

impl PtyTarget {
    fn request(&self, (width, height): (u16, u16)) -> ResizePtyRequest {
        ResizePtyRequest {
            id: self.container_id.clone(),
            exec_id: self.exec_id.clone(),
            width: u32::from(width),
            height: u32::from(height),
        }
    }
}

/// Send the local terminal size to the remote pty.
pub async fn resize_pty(
    conn: &AgentConnection,
    target: &PtyTarget,
    size: (u16, u16),
) -> Result<(), ConnectionError> {
    conn.call::<_, ()>(TASK_SERVICE, RESIZE_PTY, &target.request(size))
        .await
}

/// Forward every SIGWINCH as a ResizePty call. With a relay, forwarding
/// stops once it is closed; without one it runs until the task is aborted.
#[cfg(unix)]
pub async fn watch_window_size(
    conn: Arc<AgentConnection>,
    target: PtyTarget,
    proxy: Option<Arc<IoProxySet>>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut winch = signal(SignalKind::window_change())?;
    while relay_open(proxy.as_deref()) {
        if winch.recv().await.is_none() {
            break;
        }
        if !relay_open(proxy.as_deref()) {
            break;
        }
        let current = size()?;
        debug!(width = current.0, height = current.1, "terminal resized");
        resize_pty(&conn, &target, current).await?;
    }
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
pub async fn watch_window_size(
    _conn: Arc<AgentConnection>,
    _target: PtyTarget,
    _proxy: Option<Arc<IoProxySet>>,
) -> anyhow::Result<()> {
    Ok(())
}

fn relay_open(proxy: Option<&IoProxySet>) -> bool {
    proxy.is_none_or(IoProxySet::is_open)
}

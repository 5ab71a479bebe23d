//! `exec` subcommand: run a process in an existing container and optionally
//! relay its standard streams to this terminal.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fcagent_core::config::IoConfig;
use fcagent_core::io::{ConnectorPair, IoConnector, IoProxySet};
use fcagent_core::transport::Endpoint;
use fcagent_proto::methods::{EXEC, START, TASK_SERVICE, WAIT};
use fcagent_proto::task::{
    ExecProcessRequest, StartRequest, StartResponse, WaitRequest, WaitResponse,
};
use fcagent_proto::{Any, ExtraData};

use crate::connection::AgentConnection;
use crate::oci;
use crate::terminal::{self, PtyTarget, RawModeGuard};

/// Arguments of `fcagent exec`.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container to run the process in
    #[arg(long)]
    pub container_id: String,
    /// Execution id (random when omitted)
    #[arg(long)]
    pub exec_id: Option<String>,
    /// Standard output URI for the agent (default file:///tmp/<exec-id>.stdout)
    #[arg(long)]
    pub stdout: Option<String>,
    /// Standard error URI for the agent (default file:///tmp/<exec-id>.stderr)
    #[arg(long)]
    pub stderr: Option<String>,
    /// Allocate a terminal
    #[arg(long)]
    pub tty: bool,
    /// Relay stdin/stdout/stderr through the agent's IO proxy
    #[arg(long)]
    pub io: bool,
    #[arg(long, default_value_t = 0)]
    pub uid: u32,
    #[arg(long, default_value_t = 0)]
    pub gid: u32,
    /// Working directory of the process
    #[arg(long, default_value = "/")]
    pub cwd: String,
    /// Grant every capability
    #[arg(long = "priv")]
    pub privileged: bool,
    /// Command to run
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}

/// Port allocation failure.
#[derive(Debug, thiserror::Error)]
pub enum PortAllocationError {
    #[error("overflow of vsock ports")]
    Overflow,
}

/// Hands out consecutive vsock ports starting at a floor.
#[derive(Debug)]
pub struct PortAllocator {
    min_port: u32,
    allocated: u32,
}

/// The three per-exec IO ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoPorts {
    pub stdin: u32,
    pub stdout: u32,
    pub stderr: u32,
}

impl PortAllocator {
    pub const fn new(min_port: u32) -> Self {
        Self {
            min_port,
            allocated: 0,
        }
    }

    pub fn next_port(&mut self) -> Result<u32, PortAllocationError> {
        let port = self
            .min_port
            .checked_add(self.allocated)
            .filter(|port| *port != u32::MAX)
            .ok_or(PortAllocationError::Overflow)?;
        self.allocated += 1;
        Ok(port)
    }

    pub fn next_io_ports(&mut self) -> Result<IoPorts, PortAllocationError> {
        Ok(IoPorts {
            stdin: self.next_port()?,
            stdout: self.next_port()?,
            stderr: self.next_port()?,
        })
    }
}

/// Run `fcagent exec`.
pub async fn run(
    conn: Arc<AgentConnection>,
    endpoint: &Endpoint,
    io_config: &IoConfig,
    args: ExecArgs,
) -> anyhow::Result<()> {
    let exec_id = args
        .exec_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(exec_id = %exec_id, "Execution ID");

    let ports = PortAllocator::new(io_config.min_io_port).next_io_ports()?;
    let req = build_request(&args, &exec_id, ports)?;
    let target = PtyTarget {
        container_id: args.container_id.clone(),
        exec_id: exec_id.clone(),
    };

    // Exec does not return until the agent's IO proxy accepted a connection.
    let exec_call = tokio::spawn({
        let conn = Arc::clone(&conn);
        async move { conn.call::<_, ()>(TASK_SERVICE, EXEC, &req).await }
    });
    tokio::time::sleep(io_config.attach_delay()).await;

    let proc_exit = CancellationToken::new();
    let relay = if args.io {
        let mut proxy = IoProxySet::new(
            Some(ConnectorPair::new(
                IoConnector::stdin(),
                dial(endpoint, ports.stdin, io_config),
            )),
            Some(ConnectorPair::new(
                dial(endpoint, ports.stdout, io_config),
                IoConnector::stdout(),
            )),
            Some(ConnectorPair::new(
                dial(endpoint, ports.stderr, io_config),
                IoConnector::stderr(),
            )),
        )
        .with_config(io_config.relay_config());
        let (init_done, copy_done) = proxy.start(&proc_exit);
        init_done
            .recv()
            .await
            .context("failure starting io proxy")?;
        info!("Proxy attached");
        Some((Arc::new(proxy), copy_done))
    } else {
        None
    };

    exec_call
        .await
        .context("exec call task failed")?
        .context("failure in exec call")?;
    info!("Exec call successful, starting process");

    let raw_mode = if args.tty {
        RawModeGuard::enable().context("failure making terminal raw")?
    } else {
        None
    };
    let resize_watcher = raw_mode.as_ref().map(|_| {
        let conn = Arc::clone(&conn);
        let target = target.clone();
        let proxy = relay.as_ref().map(|(proxy, _)| Arc::clone(proxy));
        tokio::spawn(async move {
            if let Err(e) = terminal::watch_window_size(conn, target, proxy).await {
                warn!(error = %e, "window size forwarding stopped");
            }
        })
    });

    let start: StartResponse = conn
        .call(
            TASK_SERVICE,
            START,
            &StartRequest {
                id: args.container_id.clone(),
                exec_id: exec_id.clone(),
            },
        )
        .await
        .context("failure in start call")?;
    info!(pid = start.pid, "Command executed");

    if raw_mode.is_some() {
        match terminal::size() {
            Ok(size) => {
                if let Err(e) = terminal::resize_pty(&conn, &target, size).await {
                    warn!(error = %e, "failed to set initial terminal size");
                }
            }
            Err(e) => warn!(error = %e, "failed to read terminal size"),
        }
    }

    tokio::spawn(wait_for_exit(Arc::clone(&conn), target, proc_exit));

    let result = match relay {
        Some((proxy, copy_done)) => {
            let copied = copy_done.recv().await;
            proxy.close();
            copied.context("failure in io proxy")
        }
        None => Ok(()),
    };
    if let Some(watcher) = resize_watcher {
        watcher.abort();
    }
    drop(raw_mode);
    result
}

/// Build the Exec request. The process spec travels as JSON inside the
/// `runc_options` of an [`ExtraData`] that also names the IO ports.
pub fn build_request(
    args: &ExecArgs,
    exec_id: &str,
    ports: IoPorts,
) -> anyhow::Result<ExecProcessRequest> {
    let mut process = oci::Process::new(
        args.args.clone(),
        args.uid,
        args.gid,
        args.cwd.clone(),
        args.privileged,
    );
    if args.tty {
        process.env.push("TERM=xterm".to_string());
    }

    let extra = ExtraData {
        runc_options: Some(Any {
            type_url: String::new(),
            value: serde_json::to_vec(&process)?,
        }),
        stdin_port: ports.stdin,
        stdout_port: ports.stdout,
        stderr_port: ports.stderr,
        ..ExtraData::default()
    };

    let mut req = ExecProcessRequest {
        id: args.container_id.clone(),
        exec_id: exec_id.to_string(),
        terminal: args.tty,
        stdin: String::new(),
        stdout: args
            .stdout
            .clone()
            .unwrap_or_else(|| format!("file:///tmp/{exec_id}.stdout")),
        stderr: args
            .stderr
            .clone()
            .unwrap_or_else(|| format!("file:///tmp/{exec_id}.stderr")),
        spec: Some(extra.to_any()),
    };
    // The agent routes any stream named by a bare id through its IO proxy.
    if args.io {
        req.stdin = uuid::Uuid::new_v4().to_string();
        req.stdout = uuid::Uuid::new_v4().to_string();
        req.stderr = uuid::Uuid::new_v4().to_string();
    }
    Ok(req)
}

fn dial(endpoint: &Endpoint, port: u32, io_config: &IoConfig) -> IoConnector {
    IoConnector::dial(endpoint.with_port(port), io_config.dial_options())
}

/// Block on the Wait RPC, then signal process exit to the relay.
async fn wait_for_exit(conn: Arc<AgentConnection>, target: PtyTarget, proc_exit: CancellationToken) {
    let req = WaitRequest {
        id: target.container_id,
        exec_id: target.exec_id,
    };
    match conn.call::<_, WaitResponse>(TASK_SERVICE, WAIT, &req).await {
        Ok(res) => info!(exit_status = res.exit_status, "Process exited"),
        Err(e) => warn!(error = %e, "wait call failed"),
    }
    proc_exit.cancel();
}

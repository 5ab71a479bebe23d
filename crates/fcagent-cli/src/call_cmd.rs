//! `call` subcommand: invoke any known agent method with a JSON argument.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use anyhow::{Context, bail};
use clap::Args;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use fcagent_proto::methods::{
    METHOD_CLOSE_IO, METHOD_CONNECT, METHOD_CREATE, METHOD_DELETE, METHOD_EXEC, METHOD_KILL,
    METHOD_PAUSE, METHOD_PIDS, METHOD_RESIZE_PTY, METHOD_RESUME, METHOD_SHUTDOWN, METHOD_START,
    METHOD_STATE, METHOD_WAIT,
};
use fcagent_proto::task::{
    CloseIoRequest, ConnectRequest, ConnectResponse, CreateTaskRequest, CreateTaskResponse,
    DeleteRequest, DeleteResponse, ExecProcessRequest, KillRequest, PauseRequest, PidsRequest,
    PidsResponse, ResizePtyRequest, ResumeRequest, ShutdownRequest, StartRequest, StartResponse,
    StateRequest, StateResponse, WaitRequest, WaitResponse,
};

use crate::connection::AgentConnection;

/// Arguments of `fcagent call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Service name (e.g. containerd.task.v2.Task)
    #[arg(long)]
    pub service: String,
    /// Method name (e.g. State)
    #[arg(long)]
    pub method: String,
    /// Request as JSON; omitted means an empty request
    pub json: Option<String>,
}

/// Every `service/method` the `call` subcommand knows a request type for.
pub const KNOWN_METHODS: &[&str] = &[
    METHOD_STATE,
    METHOD_CREATE,
    METHOD_START,
    METHOD_DELETE,
    METHOD_PIDS,
    METHOD_PAUSE,
    METHOD_RESUME,
    METHOD_KILL,
    METHOD_EXEC,
    METHOD_RESIZE_PTY,
    METHOD_CLOSE_IO,
    METHOD_WAIT,
    METHOD_CONNECT,
    METHOD_SHUTDOWN,
];

/// Run `fcagent call`.
pub async fn run(conn: &AgentConnection, args: CallArgs) -> anyhow::Result<()> {
    let output = invoke(conn, &args.service, &args.method, args.json.as_deref()).await?;
    writeln!(io::stdout(), "{output}")?;
    Ok(())
}

/// Look up the request/response types for `service/method`, decode `json`
/// into the request, call the agent and render the response as JSON.
pub async fn invoke(
    conn: &AgentConnection,
    service: &str,
    method: &str,
    json: Option<&str>,
) -> anyhow::Result<String> {
    if service.is_empty() {
        bail!("no service defined");
    }
    if method.is_empty() {
        bail!("no method defined");
    }
    let key = format!("{service}/{method}");
    match key.as_str() {
        METHOD_STATE => call_json::<StateRequest, StateResponse>(conn, service, method, json).await,
        METHOD_CREATE => {
            call_json::<CreateTaskRequest, CreateTaskResponse>(conn, service, method, json).await
        }
        METHOD_START => call_json::<StartRequest, StartResponse>(conn, service, method, json).await,
        METHOD_DELETE => {
            call_json::<DeleteRequest, DeleteResponse>(conn, service, method, json).await
        }
        METHOD_PIDS => call_json::<PidsRequest, PidsResponse>(conn, service, method, json).await,
        METHOD_PAUSE => call_json::<PauseRequest, ()>(conn, service, method, json).await,
        METHOD_RESUME => call_json::<ResumeRequest, ()>(conn, service, method, json).await,
        METHOD_KILL => call_json::<KillRequest, ()>(conn, service, method, json).await,
        METHOD_EXEC => call_json::<ExecProcessRequest, ()>(conn, service, method, json).await,
        METHOD_RESIZE_PTY => call_json::<ResizePtyRequest, ()>(conn, service, method, json).await,
        METHOD_CLOSE_IO => call_json::<CloseIoRequest, ()>(conn, service, method, json).await,
        METHOD_WAIT => call_json::<WaitRequest, WaitResponse>(conn, service, method, json).await,
        METHOD_CONNECT => {
            call_json::<ConnectRequest, ConnectResponse>(conn, service, method, json).await
        }
        METHOD_SHUTDOWN => call_json::<ShutdownRequest, ()>(conn, service, method, json).await,
        _ => bail!("no request mapping defined for: {key}"),
    }
}

async fn call_json<Req, Res>(
    conn: &AgentConnection,
    service: &str,
    method: &str,
    json: Option<&str>,
) -> anyhow::Result<String>
where
    Req: Message + Default + DeserializeOwned,
    Res: Message + Default + Serialize,
{
    let req = parse_request::<Req>(json)?;
    let res: Res = conn
        .call(service, method, &req)
        .await
        .with_context(|| format!("failure in call to {service}/{method}"))?;
    info!(service, method, "call succeeded");
    Ok(serde_json::to_string(&res)?)
}

fn parse_request<Req: Default + DeserializeOwned>(json: Option<&str>) -> anyhow::Result<Req> {
    match json.map(str::trim) {
        None | Some("") => Ok(Req::default()),
        Some(input) => serde_json::from_str(input).context("failure unmarshalling input"),
    }
}

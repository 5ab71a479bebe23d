#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Subcommands against an in-memory fake agent speaking ttrpc.

use std::sync::Arc;

use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use fcagent_cli::call_cmd;
use fcagent_cli::connection::AgentConnection;
use fcagent_cli::exec_cmd::{self, ExecArgs};
use fcagent_core::config::IoConfig;
use fcagent_core::transport::Endpoint;
use fcagent_proto::task::{
    ExecProcessRequest, StartResponse, StateRequest, StateResponse, WaitResponse,
};
use fcagent_proto::ttrpc::{FrameHeader, MESSAGE_HEADER_LENGTH, MessageType, Request, Response};

/// Answer every request by method name and report each request seen.
async fn fake_agent(mut stream: DuplexStream, seen: mpsc::UnboundedSender<Request>) {
    loop {
        let mut buf = [0u8; MESSAGE_HEADER_LENGTH];
        if stream.read_exact(&mut buf).await.is_err() {
            return;
        }
        let header = FrameHeader::decode(&buf).unwrap();
        let mut payload = vec![0u8; header.length as usize];
        stream.read_exact(&mut payload).await.unwrap();
        let request = Request::decode(payload.as_slice()).unwrap();

        let body = match request.method.as_str() {
            "State" => {
                let req = StateRequest::decode(request.payload.as_slice()).unwrap();
                StateResponse {
                    id: req.id,
                    pid: 99,
                    ..StateResponse::default()
                }
                .encode_to_vec()
            }
            "Start" => StartResponse { pid: 7 }.encode_to_vec(),
            "Wait" => WaitResponse {
                exit_status: 0,
                exited_at: None,
            }
            .encode_to_vec(),
            _ => Vec::new(),
        };
        let _ = seen.send(request);

        let reply = Response {
            status: None,
            payload: body,
        }
        .encode_to_vec();
        let header = FrameHeader::new(
            u32::try_from(reply.len()).unwrap(),
            header.stream_id,
            MessageType::Response,
        );
        stream.write_all(&header.encode()).await.unwrap();
        stream.write_all(&reply).await.unwrap();
    }
}

fn connect() -> (AgentConnection, mpsc::UnboundedReceiver<Request>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(fake_agent(server, tx));
    (AgentConnection::from_stream(client), rx)
}

#[tokio::test]
async fn call_renders_response_as_json() {
    let (conn, mut seen) = connect();
    let output = call_cmd::invoke(
        &conn,
        "containerd.task.v2.Task",
        "State",
        Some(r#"{"id": "c1"}"#),
    )
    .await
    .unwrap();

    let json: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json["id"], "c1");
    assert_eq!(json["pid"], 99);
    assert_eq!(seen.recv().await.unwrap().method, "State");
}

#[tokio::test]
async fn exec_without_io_runs_exec_then_start() {
    let (conn, mut seen) = connect();
    let args = ExecArgs {
        container_id: "c1".into(),
        exec_id: Some("e1".into()),
        stdout: None,
        stderr: None,
        tty: false,
        io: false,
        uid: 0,
        gid: 0,
        cwd: "/".into(),
        privileged: false,
        args: vec!["true".into()],
    };
    let io = IoConfig {
        attach_delay_ms: 0,
        ..IoConfig::default()
    };
    let endpoint = Endpoint::Vsock { cid: 3, port: 10789 };

    exec_cmd::run(Arc::new(conn), &endpoint, &io, args)
        .await
        .unwrap();

    let exec = seen.recv().await.unwrap();
    assert_eq!(exec.method, "Exec");
    let req = ExecProcessRequest::decode(exec.payload.as_slice()).unwrap();
    assert_eq!(req.exec_id, "e1");
    assert_eq!(req.stdout, "file:///tmp/e1.stdout");

    assert_eq!(seen.recv().await.unwrap().method, "Start");
    assert_eq!(seen.recv().await.unwrap().method, "Wait");
}

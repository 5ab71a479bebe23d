#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{DuplexStream, ReadBuf};

use super::*;
use crate::io::IoConnector;

/// Stream whose reads always fail with the given message.
struct FailingReader {
    message: &'static str,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other(self.message)))
    }
}

impl AsyncWrite for FailingReader {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn failing_connector(message: &'static str) -> IoConnector {
    IoConnector::from_fn(move |_| async move {
        Err(ConnectorError::Io(io::Error::other(message)))
    })
}

fn start(pair: ConnectorPair, exit: &CancellationToken, grace: Duration) -> ProxyHandles {
    pair.proxy(exit.clone(), grace, 1024, Span::none())
}

async fn read_all(mut stream: DuplexStream) -> Vec<u8> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn copies_until_eof() {
    let (source, mut source_peer) = tokio::io::duplex(64);
    let (sink, sink_peer) = tokio::io::duplex(64);
    source_peer.write_all(b"hello").await.unwrap();
    drop(source_peer);

    let handles = start(
        ConnectorPair::new(IoConnector::from_stream(source), IoConnector::from_stream(sink)),
        &CancellationToken::new(),
        Duration::ZERO,
    );

    assert!(handles.init_done.await.unwrap().is_ok());
    assert!(handles.copy_done.await.is_err(), "clean copy reports nothing");
    assert_eq!(read_all(sink_peer).await, b"hello");
}

#[tokio::test]
async fn copies_more_than_one_chunk() {
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let (source, mut source_peer) = tokio::io::duplex(8192);
    let (sink, sink_peer) = tokio::io::duplex(8192);
    source_peer.write_all(&payload).await.unwrap();
    drop(source_peer);

    let handles = start(
        ConnectorPair::new(IoConnector::from_stream(source), IoConnector::from_stream(sink)),
        &CancellationToken::new(),
        Duration::ZERO,
    );

    assert!(handles.init_done.await.unwrap().is_ok());
    assert_eq!(read_all(sink_peer).await, payload);
}

#[tokio::test]
async fn failed_writer_closes_acquired_reader() {
    let (source, source_peer) = tokio::io::duplex(64);

    let handles = start(
        ConnectorPair::new(
            IoConnector::from_stream(source),
            failing_connector("dial refused"),
        ),
        &CancellationToken::new(),
        Duration::ZERO,
    );

    match handles.init_done.await.unwrap() {
        Err(RelayError::Init(e)) => assert_eq!(e.to_string(), "dial refused"),
        other => panic!("expected init error, got {other:?}"),
    }
    // The reader was shut down and dropped, so its peer sees EOF.
    assert!(read_all(source_peer).await.is_empty());
    assert!(
        handles.copy_done.await.is_err(),
        "no copy outcome after failed init"
    );
}

#[tokio::test]
async fn both_ends_failing_reports_one_error() {
    let handles = start(
        ConnectorPair::new(failing_connector("first"), failing_connector("second")),
        &CancellationToken::new(),
        Duration::ZERO,
    );

    let err = handles.init_done.await.unwrap().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("first") || msg.contains("second"), "{msg}");
    assert!(handles.copy_done.await.is_err());
}

#[tokio::test]
async fn closed_connection_error_is_not_reported() {
    for message in ["use of closed network connection", "file already closed"] {
        let (sink, _sink_peer) = tokio::io::duplex(64);
        let handles = start(
            ConnectorPair::new(
                IoConnector::from_stream(FailingReader { message }),
                IoConnector::from_stream(sink),
            ),
            &CancellationToken::new(),
            Duration::ZERO,
        );

        assert!(handles.init_done.await.unwrap().is_ok());
        assert!(handles.copy_done.await.is_err(), "{message} must be swallowed");
    }
}

#[tokio::test]
async fn other_copy_errors_are_reported() {
    let (sink, _sink_peer) = tokio::io::duplex(64);
    let handles = start(
        ConnectorPair::new(
            IoConnector::from_stream(FailingReader {
                message: "disk on fire",
            }),
            IoConnector::from_stream(sink),
        ),
        &CancellationToken::new(),
        Duration::ZERO,
    );

    assert!(handles.init_done.await.unwrap().is_ok());
    match handles.copy_done.await.unwrap() {
        Err(RelayError::Copy(e)) => assert_eq!(e.to_string(), "disk on fire"),
        other => panic!("expected copy error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn zero_grace_closes_right_after_exit() {
    let (source, _source_peer) = tokio::io::duplex(64);
    let (sink, mut sink_peer) = tokio::io::duplex(64);
    let exit = CancellationToken::new();

    let handles = start(
        ConnectorPair::new(IoConnector::from_stream(source), IoConnector::from_stream(sink)),
        &exit,
        Duration::ZERO,
    );
    assert!(handles.init_done.await.unwrap().is_ok());

    let mut buf = [0u8; 8];
    assert!(
        tokio::time::timeout(Duration::from_millis(1), sink_peer.read(&mut buf))
            .await
            .is_err(),
        "stream stays open before exit"
    );

    exit.cancel();
    let n = tokio::time::timeout(Duration::from_millis(1), sink_peer.read(&mut buf))
        .await
        .expect("closed without waiting")
        .unwrap();
    assert_eq!(n, 0);
    assert!(handles.copy_done.await.is_err(), "forced close is not a failure");
}

#[tokio::test(start_paused = true)]
async fn grace_period_keeps_stream_open_after_exit() {
    let (source, _source_peer) = tokio::io::duplex(64);
    let (sink, mut sink_peer) = tokio::io::duplex(64);
    let exit = CancellationToken::new();

    let handles = start(
        ConnectorPair::new(IoConnector::from_stream(source), IoConnector::from_stream(sink)),
        &exit,
        Duration::from_secs(5),
    );
    assert!(handles.init_done.await.unwrap().is_ok());
    exit.cancel();

    let mut buf = [0u8; 8];
    assert!(
        tokio::time::timeout(Duration::from_secs(4), sink_peer.read(&mut buf))
            .await
            .is_err(),
        "stream must stay open during the grace period"
    );
    let n = tokio::time::timeout(Duration::from_secs(2), sink_peer.read(&mut buf))
        .await
        .expect("closed once the grace period elapsed")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test(start_paused = true)]
async fn data_written_during_grace_is_relayed() {
    let (source, mut source_peer) = tokio::io::duplex(64);
    let (sink, mut sink_peer) = tokio::io::duplex(64);
    let exit = CancellationToken::new();

    let handles = start(
        ConnectorPair::new(IoConnector::from_stream(source), IoConnector::from_stream(sink)),
        &exit,
        Duration::from_secs(5),
    );
    assert!(handles.init_done.await.unwrap().is_ok());
    exit.cancel();

    source_peer.write_all(b"late").await.unwrap();
    drop(source_peer);

    let mut out = Vec::new();
    sink_peer.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"late");
    assert!(handles.copy_done.await.is_err());
}

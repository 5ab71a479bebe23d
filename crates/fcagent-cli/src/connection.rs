//! Agent connection client.
//!
//! A minimal ttrpc client: unary calls multiplexed over one stream. Each
//! call gets an odd stream id; a reader task routes responses back to the
//! waiting caller by id.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fcagent_core::transport::{BoxedStream, DuplexStream, Endpoint};
use fcagent_proto::ttrpc::{
    FrameError, FrameHeader, MESSAGE_HEADER_LENGTH, MESSAGE_LENGTH_MAX, MessageType, Request,
    Response,
};

/// Errors from agent calls.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to connect to agent at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("request of {0} bytes exceeds the ttrpc message limit")]
    TooLarge(usize),

    #[error("agent returned status {code}: {message}")]
    Status { code: i32, message: String },

    #[error("agent connection closed")]
    Closed,
}

/// Response waiters keyed by stream id. `None` once the reader has stopped.
type Pending = Arc<Mutex<Option<HashMap<u32, oneshot::Sender<Response>>>>>;

/// Client connection to the agent.
pub struct AgentConnection {
    writer: AsyncMutex<WriteHalf<BoxedStream>>,
    pending: Pending,
    next_stream_id: AtomicU32,
    reader: JoinHandle<()>,
}

impl AgentConnection {
    /// Dial the agent and start the response reader.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, ConnectionError> {
        let stream = endpoint
            .dial()
            .await
            .map_err(|source| ConnectionError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        info!(%endpoint, "Connected to agent");
        Ok(Self::from_stream(stream))
    }

    /// Run the client over an already-open stream.
    pub fn from_stream<S: DuplexStream + 'static>(stream: S) -> Self {
        let boxed: BoxedStream = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);
        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&pending)));
        Self {
            writer: AsyncMutex::new(write_half),
            pending,
            next_stream_id: AtomicU32::new(1),
            reader,
        }
    }

    /// Issue a unary call and decode its response.
    pub async fn call<Req, Res>(
        &self,
        service: &str,
        method: &str,
        req: &Req,
    ) -> Result<Res, ConnectionError>
    where
        Req: Message,
        Res: Message + Default,
    {
        let request = Request {
            service: service.to_string(),
            method: method.to_string(),
            payload: req.encode_to_vec(),
            ..Request::default()
        };
        let payload = request.encode_to_vec();
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MESSAGE_LENGTH_MAX)
            .ok_or(ConnectionError::TooLarge(payload.len()))?;

        let stream_id = self.next_stream_id.fetch_add(2, Ordering::Relaxed);
        let rx = self.register(stream_id)?;
        let _waiter = WaiterGuard {
            pending: &self.pending,
            stream_id,
        };
        debug!(service, method, stream_id, "sending ttrpc request");

        let header = FrameHeader::new(length, stream_id, MessageType::Request).encode();
        self.write_frame(&header, &payload).await?;

        let response = rx.await.map_err(|_| ConnectionError::Closed)?;
        if let Some(status) = response.status
            && status.code != 0
        {
            return Err(ConnectionError::Status {
                code: status.code,
                message: status.message,
            });
        }
        Ok(Res::decode(response.payload.as_slice())?)
    }

    fn register(&self, stream_id: u32) -> Result<oneshot::Receiver<Response>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let waiters = pending.as_mut().ok_or(ConnectionError::Closed)?;
        waiters.insert(stream_id, tx);
        Ok(rx)
    }

    async fn write_frame(&self, header: &[u8], payload: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(header).await?;
        writer.write_all(payload).await?;
        writer.flush().await
    }
}

/// Removes a call's waiter when the call ends, including when its future is
/// dropped before the response arrives.
struct WaiterGuard<'a> {
    pending: &'a Pending,
    stream_id: u32,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(waiters) = pending.as_mut() {
            waiters.remove(&self.stream_id);
        }
    }
}

impl Drop for AgentConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route responses to their waiters until the stream ends. Afterwards every
/// pending and future call fails with [`ConnectionError::Closed`].
async fn read_loop(mut reader: ReadHalf<BoxedStream>, pending: Pending) {
    loop {
        match read_frame(&mut reader).await {
            Ok((header, payload)) => dispatch(&pending, header, &payload),
            Err(ConnectionError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("agent closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "agent connection failed");
                break;
            }
        }
    }
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}

async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Vec<u8>), ConnectionError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; MESSAGE_HEADER_LENGTH];
    reader.read_exact(&mut buf).await?;
    let header = FrameHeader::decode(&buf)?;
    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).await?;
    Ok((header, payload))
}

fn dispatch(pending: &Pending, header: FrameHeader, payload: &[u8]) {
    if header.message_type != MessageType::Response {
        debug!(stream_id = header.stream_id, message_type = ?header.message_type, "ignoring frame");
        return;
    }
    let response = match Response::decode(payload) {
        Ok(response) => response,
        Err(e) => {
            warn!(stream_id = header.stream_id, error = %e, "undecodable ttrpc response");
            return;
        }
    };
    let waiter = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_mut()
        .and_then(|waiters| waiters.remove(&header.stream_id));
    match waiter {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => warn!(stream_id = header.stream_id, "response for unknown stream"),
    }
}

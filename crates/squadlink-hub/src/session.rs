//! Connection session -- one transport binding for one peer.
//!
//! Transports hand over a sink of `ServerMessage` and a stream of
//! `Envelope`. The sink is wrapped in a `Session` (shared, write-serialized)
//! and the stream in a `SessionReader` (owned by the driver task). Both
//! observe the same cancellation token.

use futures::{Sink, SinkExt, Stream, StreamExt};
use squadlink_protocol::{Envelope, ServerMessage};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, Result};

pub type FrameSink = Pin<Box<dyn Sink<ServerMessage, Error = HubError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Envelope>> + Send>>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Length-prefixed JSON over TCP.
    Stream,
    /// WebSocket text frames.
    Socket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Socket => "socket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Session {
    id: u64,
    kind: TransportKind,
    writer: Mutex<FrameSink>,
    cancel: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write one message. Concurrent callers are serialized.
    pub async fn send(&self, msg: ServerMessage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HubError::Transport(format!("session {} closed", self.id)));
        }
        let mut writer = self.writer.lock().await;
        writer.send(msg).await
    }

    /// Signal the reader to stop. Does not touch the writer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and flush/close the underlying transport.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!(session = self.id, error = %e, "session: close failed");
        }
    }
}

/// Inbound half of a session.
pub struct SessionReader {
    stream: FrameStream,
    cancel: CancellationToken,
}

impl SessionReader {
    /// Next envelope, or an error once the transport fails, the peer hangs
    /// up, or the session is cancelled.
    pub async fn next(&mut self) -> Result<Envelope> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HubError::Cancelled),
            item = self.stream.next() => match item {
                Some(result) => result,
                None => Err(HubError::Transport("closed by peer".into())),
            },
        }
    }
}

/// Bind a transport's two halves into a session.
pub fn open(
    kind: TransportKind,
    sink: FrameSink,
    stream: FrameStream,
    cancel: CancellationToken,
) -> (Arc<Session>, SessionReader) {
    let session = Arc::new(Session {
        id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        kind,
        writer: Mutex::new(sink),
        cancel: cancel.clone(),
    });
    (session, SessionReader { stream, cancel })
}

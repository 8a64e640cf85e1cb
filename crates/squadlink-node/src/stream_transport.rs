//! Stream transport -- length-prefixed JSON over TCP.
//!
//! Accept loop spawns one session task per connection. Each connection is
//! framed with `StreamCodec` and handed to the hub's session driver.

use futures::{SinkExt, StreamExt};
use squadlink_hub::{FrameSink, FrameStream, Hub, HubError, TransportKind};
use squadlink_protocol::{ProtocolError, StreamCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

fn transport_error(e: ProtocolError) -> HubError {
    match e {
        ProtocolError::Io(io) => HubError::Transport(io.to_string()),
        other => HubError::Protocol(other),
    }
}

/// Frame a TCP connection into the sink/stream pair a session needs.
pub fn frame(stream: TcpStream) -> (FrameSink, FrameStream) {
    let (tx, rx) = Framed::new(stream, StreamCodec::new()).split();
    let sink: FrameSink = Box::pin(tx.sink_map_err(transport_error));
    let stream: FrameStream = Box::pin(rx.map(|frame| frame.map_err(transport_error)));
    (sink, stream)
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: Arc<Hub>, shutdown: CancellationToken) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%addr, error = %e, "stream: set_nodelay failed");
    }
    let (sink, stream) = frame(stream);
    match squadlink_hub::run_session(hub, TransportKind::Stream, sink, stream, &shutdown).await {
        Ok(()) => tracing::debug!(%addr, "stream: connection finished"),
        Err(e) => tracing::debug!(%addr, error = %e, "stream: connection ended with error"),
    }
}

/// Accept connections until `shutdown` fires.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            accept = listener.accept() => {
                match accept {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "stream: accepted connection");
                        let hub = hub.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(handle_connection(stream, addr, hub, shutdown));
                    }
                    Err(e) => {
                        tracing::error!("stream: accept error: {e}");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }
    tracing::info!("stream: listener stopped");
}

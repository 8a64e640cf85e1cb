//! Session driver -- one task per connection, either transport.
//!
//! 1. Wait for the first envelope; its `from` is the peer id.
//! 2. Register the session. An `init` first message is acknowledged, any
//!    other first message is handled as usual.
//! 3. Handle each message until the transport fails, the peer hangs up, or
//!    the shutdown token fires.
//! 4. Deregister (only if still the current session for that peer), close.

use squadlink_protocol::{field, kind, Envelope, ProtocolError, ServerMessage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Caller;
use crate::error::{ErrorKind, HubError, Result};
use crate::session::{self, FrameSink, FrameStream, Session, SessionReader, TransportKind};
use crate::Hub;

/// Drive one connection to completion. Returns `Ok` for ordinary endings
/// (hang-up, transport loss, shutdown).
pub async fn run_session(
    hub: Arc<Hub>,
    transport: TransportKind,
    sink: FrameSink,
    stream: FrameStream,
    shutdown: &CancellationToken,
) -> Result<()> {
    let (session, mut reader) = session::open(transport, sink, stream, shutdown.child_token());

    let first = match reader.next().await {
        Ok(env) => env,
        Err(e) => {
            session.close().await;
            tracing::debug!(transport = %transport, error = %e, "session: ended before handshake");
            return quiet(e);
        }
    };
    if first.from.is_empty() {
        let reason = "first message must carry a peer id";
        if let Err(e) = session.send(ServerMessage::error(&first.kind, reason)).await {
            tracing::debug!(error = %e, "session: handshake reply failed");
        }
        session.close().await;
        return Err(ProtocolError::MissingField("from").into());
    }

    let peer_id = first.from.clone();
    hub.directory.put(peer_id.clone(), session.clone()).await;
    tracing::info!(peer = %peer_id, transport = %transport, session = session.id(), "session: opened");

    let ended = serve(&hub, &session, &mut reader, &peer_id, first).await;

    let deregistered = hub.directory.remove_session(&peer_id, &session).await;
    session.close().await;
    tracing::info!(
        peer = %peer_id,
        session = session.id(),
        deregistered,
        reason = %ended,
        "session: closed"
    );
    quiet(ended)
}

/// Message loop. Only ever returns the error that ended it.
async fn serve(
    hub: &Hub,
    session: &Session,
    reader: &mut SessionReader,
    peer_id: &str,
    first: Envelope,
) -> HubError {
    let opened = if first.kind == kind::INIT {
        session
            .send(ServerMessage::ok(kind::INIT).with(field::ID, peer_id))
            .await
    } else {
        process(hub, session, peer_id, &first).await
    };
    if let Err(e) = opened {
        return e;
    }

    loop {
        let step = match reader.next().await {
            Ok(env) => process(hub, session, peer_id, &env).await,
            // Undecodable frame: tell the sender, keep reading
            Err(HubError::Protocol(e)) => {
                tracing::debug!(peer = %peer_id, error = %e, "session: bad frame");
                session.send(ServerMessage::error("error", e.to_string())).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = step {
            return e;
        }
    }
}

/// Handle one envelope and write any reply. Errors returned here are
/// failures of this session's own transport.
async fn process(hub: &Hub, session: &Session, peer_id: &str, env: &Envelope) -> Result<()> {
    let caller = Caller::session(peer_id, &env.token);
    match hub.handle_envelope(&caller, env).await {
        Ok(Some(reply)) => match session.send(reply).await {
            Err(e @ (HubError::Transport(_) | HubError::Cancelled)) => Err(e),
            Err(e) => {
                tracing::warn!(peer = %peer_id, kind = %env.kind, error = %e, "session: reply not sendable");
                session
                    .send(ServerMessage::error(&env.kind, e.to_string()))
                    .await
            }
            Ok(()) => Ok(()),
        },
        Ok(None) => Ok(()),
        Err(e) => {
            match e.kind() {
                ErrorKind::Internal | ErrorKind::Unavailable => {
                    tracing::warn!(peer = %peer_id, kind = %env.kind, error = %e, "session: request failed")
                }
                _ => tracing::debug!(peer = %peer_id, kind = %env.kind, error = %e, "session: request rejected"),
            }
            session
                .send(ServerMessage::error(&env.kind, e.to_string()))
                .await
        }
    }
}

fn quiet(e: HubError) -> Result<()> {
    match e {
        HubError::Cancelled | HubError::Transport(_) => Ok(()),
        other => Err(other),
    }
}

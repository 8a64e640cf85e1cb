//! Relay engine -- deliver a message to whichever session holds the target.
//!
//! No queueing and no retry: an offline target is a silent drop. A transport
//! failure evicts the target; a message the transport refuses does not.

use squadlink_protocol::{field, Payload, ServerMessage};

use crate::directory::PeerDirectory;
use crate::error::{HubError, Result};

#[derive(Clone)]
pub struct RelayEngine {
    directory: PeerDirectory,
}

impl RelayEngine {
    pub fn new(directory: PeerDirectory) -> Self {
        Self { directory }
    }

    /// Deliver `kind`/`payload` from `sender` to `target`. Returns whether a
    /// session took the message; an offline target is `Ok(false)`.
    ///
    /// Only a transport failure evicts the target. Any other send error (an
    /// unencodable or oversized message) is returned and the target stays.
    pub async fn forward(&self, sender: &str, target: &str, kind: &str, payload: Payload) -> Result<bool> {
        let Some(session) = self.directory.get(target).await else {
            tracing::debug!(from = %sender, to = %target, kind, "relay: target offline, dropped");
            return Ok(false);
        };

        let msg = ServerMessage::relayed(kind, sender, target, payload);
        match session.send(msg).await {
            Ok(()) => {
                tracing::trace!(from = %sender, to = %target, kind, "relay: delivered");
                Ok(true)
            }
            Err(HubError::Transport(e)) => {
                self.directory.remove_session(target, &session).await;
                session.cancel();
                tracing::warn!(
                    from = %sender,
                    to = %target,
                    kind,
                    session = session.id(),
                    error = %e,
                    "relay: delivery failed, target evicted"
                );
                Err(HubError::Transport(format!("delivery to {target} failed: {e}")))
            }
            Err(e) => {
                tracing::debug!(from = %sender, to = %target, kind, error = %e, "relay: message not sendable");
                Err(e)
            }
        }
    }

    /// Membership event `{id: subject}` to each target. Failures are logged
    /// and skipped. Returns how many sessions received the event.
    pub async fn notify<'a, I>(&self, subject: &str, targets: I, kind: &str) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut delivered = 0;
        for target in targets {
            let mut payload = Payload::new();
            payload.insert(field::ID.to_string(), subject.to_string());
            match self.forward(subject, target, kind, payload).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(subject, to = %target, kind, error = %e, "relay: notification skipped");
                }
            }
        }
        delivered
    }
}

//! Peer directory -- thread-safe registry of live sessions.
//!
//! Maps PeerId → Session across both transport kinds. At most one entry per
//! peer; registering again replaces the previous session.

use squadlink_protocol::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::session::Session;

#[derive(Clone, Default)]
pub struct PeerDirectory {
    inner: Arc<RwLock<HashMap<PeerId, Arc<Session>>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` for `peer_id`, returning the session it replaced.
    pub async fn put(&self, peer_id: PeerId, session: Arc<Session>) -> Option<Arc<Session>> {
        let kind = session.kind();
        let session_id = session.id();
        let (previous, size) = {
            let mut map = self.inner.write().await;
            let previous = map.insert(peer_id.clone(), session);
            (previous, map.len())
        };
        tracing::info!(
            peer = %peer_id,
            transport = %kind,
            session = session_id,
            replaced = previous.is_some(),
            size,
            "directory: peer registered"
        );
        previous
    }

    pub async fn get(&self, peer_id: &str) -> Option<Arc<Session>> {
        self.inner.read().await.get(peer_id).cloned()
    }

    pub async fn remove(&self, peer_id: &str) -> Option<Arc<Session>> {
        let mut map = self.inner.write().await;
        let removed = map.remove(peer_id);
        if removed.is_some() {
            tracing::info!(peer = %peer_id, size = map.len(), "directory: peer removed");
        }
        removed
    }

    /// Remove `peer_id` only if it is still bound to `session`. A session
    /// that has been superseded leaves its successor in place.
    pub async fn remove_session(&self, peer_id: &str, session: &Arc<Session>) -> bool {
        let mut map = self.inner.write().await;
        match map.get(peer_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                map.remove(peer_id);
                tracing::info!(
                    peer = %peer_id,
                    session = session.id(),
                    size = map.len(),
                    "directory: peer removed"
                );
                true
            }
            _ => false,
        }
    }

    /// Up to `limit` registered peer ids, in no particular order.
    pub async fn list(&self, limit: usize) -> Vec<PeerId> {
        self.inner
            .read()
            .await
            .keys()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

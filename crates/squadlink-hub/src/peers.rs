//! Registered peer records (id, display name, public key).

use squadlink_protocol::ListFilter;
use squadlink_storage::{fields, Collection, PeerRecord, MATCH_ALL};

use crate::error::{HubError, Result};
use crate::store::StoreHandle;

pub struct PeerRecords {
    store: StoreHandle,
    page_size: usize,
}

impl PeerRecords {
    pub fn new(store: StoreHandle, page_size: usize) -> Self {
        Self { store, page_size }
    }

    pub async fn create(&self, record: PeerRecord) -> Result<()> {
        if !self.store.insert(Collection::Peers, &record.id, &record).await? {
            return Err(HubError::AlreadyExists(format!("peer {}", record.id)));
        }
        tracing::info!(peer = %record.id, name = %record.name, "peers: registered");
        Ok(())
    }

    pub async fn get(&self, peer_id: &str) -> Result<PeerRecord> {
        self.store
            .get(Collection::Peers, peer_id)
            .await?
            .ok_or_else(|| HubError::PeerNotFound(peer_id.to_string()))
    }

    pub async fn list(&self, filter: ListFilter, last_index: usize) -> Result<Vec<PeerRecord>> {
        let (field, pattern) = match filter {
            ListFilter::All => (fields::ID, MATCH_ALL.to_string()),
            ListFilter::ById(p) => (fields::ID, p),
            ListFilter::ByName(p) => (fields::NAME, p),
        };
        self.store
            .find(Collection::Peers, field, pattern, self.page_size, last_index)
            .await
    }
}

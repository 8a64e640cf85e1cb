//! Squadlink hub: peer directory, relay, squads and auth, independent of
//! the transports that feed it.

pub mod auth;
pub mod directory;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod peers;
pub mod relay;
pub mod session;
pub mod squads;
pub mod store;

#[cfg(test)]
mod testing;

use squadlink_crypto::{ChallengeSealer, PasswordHasherConfig};
use squadlink_protocol::DEFAULT_PAGE_SIZE;
use squadlink_storage::Store;
use std::sync::Arc;
use std::time::Duration;

pub use dispatch::Caller;
pub use driver::run_session;
pub use error::{ErrorKind, HubError, Result};
pub use session::{FrameSink, FrameStream, TransportKind};

use auth::AuthTokenManager;
use directory::PeerDirectory;
use peers::PeerRecords;
use relay::RelayEngine;
use squads::SquadManager;
use store::StoreHandle;

/// Tunables handed down from the node config.
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    pub page_size: usize,
    pub password: PasswordHasherConfig,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            page_size: DEFAULT_PAGE_SIZE,
            password: PasswordHasherConfig::default(),
        }
    }
}

/// All hub components, wired together. Shared as `Arc<Hub>` by every
/// session task and the HTTP layer.
pub struct Hub {
    pub directory: PeerDirectory,
    pub relay: RelayEngine,
    pub auth: Arc<AuthTokenManager>,
    pub squads: SquadManager,
    pub peers: PeerRecords,
    pub store: StoreHandle,
    settings: HubSettings,
}

impl Hub {
    pub fn new(store: Arc<dyn Store>, sealer: Arc<dyn ChallengeSealer>, settings: HubSettings) -> Self {
        let store = StoreHandle::new(store, settings.store_timeout);
        let directory = PeerDirectory::new();
        let relay = RelayEngine::new(directory.clone());
        let auth = Arc::new(AuthTokenManager::new(sealer));
        let squads = SquadManager::new(
            store.clone(),
            relay.clone(),
            auth.clone(),
            settings.password,
            settings.page_size,
        );
        let peers = PeerRecords::new(store.clone(), settings.page_size);

        Self {
            directory,
            relay,
            auth,
            squads,
            peers,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }
}

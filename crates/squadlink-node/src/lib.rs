//! Squadlink Node -- library crate for the signaling hub binary.
//!
//! Exposes config, the stream transport and `start` so integration tests
//! run the same wiring as main.rs.

pub mod config;
pub mod stream_transport;

use squadlink_api::ApiState;
use squadlink_crypto::ChallengeSealer;
use squadlink_hub::Hub;
use squadlink_storage::Store;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::NodeConfig;

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_or_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn dirs_or_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// A started hub: both listeners bound, tasks spawned.
pub struct NodeHandle {
    pub hub: Arc<Hub>,
    pub stream_addr: SocketAddr,
    pub http_addr: SocketAddr,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Cancel every session and listener, then wait for the tasks to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "node: task ended abnormally");
            }
        }
    }
}

/// Bind the stream and HTTP listeners named in `cfg` and spawn their tasks.
pub async fn start(
    cfg: &NodeConfig,
    store: Arc<dyn Store>,
    sealer: Arc<dyn ChallengeSealer>,
) -> anyhow::Result<NodeHandle> {
    let hub = Arc::new(Hub::new(store, sealer, cfg.hub_settings()));
    let shutdown = CancellationToken::new();

    let stream_listener = TcpListener::bind(&cfg.server.stream_addr).await?;
    let stream_addr = stream_listener.local_addr()?;
    tracing::info!(addr = %stream_addr, "stream transport listening");

    let http_listener = TcpListener::bind(&cfg.server.http_addr).await?;
    let http_addr = http_listener.local_addr()?;
    tracing::info!(addr = %http_addr, "HTTP API listening (/req, /ws)");

    let stream_handle = tokio::spawn(stream_transport::serve(
        stream_listener,
        hub.clone(),
        shutdown.clone(),
    ));

    let state = Arc::new(ApiState {
        hub: hub.clone(),
        shutdown: shutdown.clone(),
        start_time: std::time::Instant::now(),
    });
    let router = squadlink_api::router(state);
    let api_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!("HTTP server error: {e}");
            }
        })
    };

    Ok(NodeHandle {
        hub,
        stream_addr,
        http_addr,
        shutdown,
        handles: vec![stream_handle, api_handle],
    })
}

//! Test harness for in-process squadlink-node integration tests.
//!
//! Provides TestNode (a hub on ephemeral ports with a temp database) and
//! clients for both transports plus the HTTP request endpoint.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use squadlink_crypto::RsaSealer;
use squadlink_hub::Hub;
use squadlink_node::config::NodeConfig;
use squadlink_node::NodeHandle;
use squadlink_protocol::{kind, ClientCodec, Envelope, ServerMessage};
use squadlink_storage::SqliteStore;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::codec::Framed;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A running in-process hub.
pub struct TestNode {
    pub hub: Arc<Hub>,
    pub stream_addr: String,
    pub http_addr: String,
    node: NodeHandle,
    _tempdir: tempfile::TempDir,
}

#[allow(dead_code)]
impl TestNode {
    pub async fn start() -> anyhow::Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let mut cfg = NodeConfig::default();
        cfg.server.stream_addr = "127.0.0.1:0".into();
        cfg.server.http_addr = "127.0.0.1:0".into();
        cfg.squads.password_log_n = 4;

        let store = SqliteStore::open(&tempdir.path().join("hub.db"))?;
        let node = squadlink_node::start(&cfg, Arc::new(store), Arc::new(RsaSealer)).await?;

        Ok(Self {
            hub: node.hub.clone(),
            stream_addr: node.stream_addr.to_string(),
            http_addr: node.http_addr.to_string(),
            node,
            _tempdir: tempdir,
        })
    }

    pub async fn shutdown(self) {
        self.node.shutdown().await;
    }

    /// Stream-transport client, already through the init handshake.
    pub async fn stream_client(&self, peer: &str) -> anyhow::Result<StreamClient> {
        let stream = TcpStream::connect(&self.stream_addr).await?;
        let mut client = StreamClient {
            framed: Framed::new(stream, ClientCodec::new()),
        };
        client.send(Envelope::new(kind::INIT, peer)).await?;
        let ack = client.recv().await?;
        anyhow::ensure!(ack.success && ack.kind == kind::INIT, "bad init ack: {ack:?}");
        Ok(client)
    }

    /// Socket-transport client, already through the init handshake.
    pub async fn socket_client(&self, peer: &str) -> anyhow::Result<SocketClient> {
        let url = format!("ws://{}/ws", self.http_addr);
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let mut client = SocketClient { ws };
        client.send(Envelope::new(kind::INIT, peer)).await?;
        let ack = client.recv().await?;
        anyhow::ensure!(ack.success && ack.kind == kind::INIT, "bad init ack: {ack:?}");
        Ok(client)
    }

    /// POST /req returning (status_code, body_json).
    pub async fn req(&self, env: &Envelope) -> anyhow::Result<(u16, serde_json::Value)> {
        self.post_raw("/req", serde_json::to_string(env)?).await
    }

    pub async fn post_raw(&self, path: &str, body: String) -> anyhow::Result<(u16, serde_json::Value)> {
        let url = format!("http://{}{}", self.http_addr, path);
        let client = reqwest::Client::new();
        let resp = client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let val: serde_json::Value =
            serde_json::from_str(&text).unwrap_or(serde_json::json!({"_raw": text}));
        Ok((status, val))
    }

    pub async fn api_status(&self) -> anyhow::Result<serde_json::Value> {
        let (_, val) = self.post_raw("/api/v1/status", "{}".into()).await?;
        Ok(val)
    }

    /// Poll the directory until `peer` has no session, or timeout.
    pub async fn wait_offline(&self, peer: &str, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.hub.directory.get(peer).await.is_some() {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("timeout waiting for {peer} to go offline");
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }
}

pub struct StreamClient {
    framed: Framed<TcpStream, ClientCodec>,
}

#[allow(dead_code)]
impl StreamClient {
    pub async fn send(&mut self, env: Envelope) -> anyhow::Result<()> {
        self.framed.send(env).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<ServerMessage> {
        match tokio::time::timeout(RECV_TIMEOUT, self.framed.next()).await? {
            Some(msg) => Ok(msg?),
            None => anyhow::bail!("stream closed"),
        }
    }

    /// True if nothing arrives within `wait`.
    pub async fn quiet_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.framed.next()).await.is_err()
    }
}

pub struct SocketClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[allow(dead_code)]
impl SocketClient {
    pub async fn send(&mut self, env: Envelope) -> anyhow::Result<()> {
        self.ws.send(Message::Text(serde_json::to_string(&env)?)).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<ServerMessage> {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.ws.next()).await? {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("socket closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn quiet_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.ws.next()).await.is_err()
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

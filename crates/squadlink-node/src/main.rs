//! Squadlink Node -- signaling hub for peers and squads.
//!
//! Usage:
//!   squadlink-node                          # Run with default config
//!   squadlink-node --config hub.toml run    # Run with custom config
//!   squadlink-node status                   # Uptime and live session count
//!   squadlink-node squads --name '^team'    # Stored squads via /req

use squadlink_node::config::NodeConfig;
use squadlink_node::expand_tilde;

use clap::{Parser, Subcommand};
use std::sync::Arc;

use squadlink_crypto::RsaSealer;
use squadlink_protocol::{field, kind, Envelope, NetworkType};
use squadlink_storage::SqliteStore;

const DEFAULT_LOG_FILTER: &str = "squadlink_node=info,squadlink_hub=info,squadlink_api=info";

#[derive(Parser)]
#[command(name = "squadlink-node", version, about = "Squadlink signaling hub")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.squadlink/config.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the hub (default)
    Run,
    /// Show hub status from the local API
    Status,
    /// Peers with a live session
    Peers,
    /// Stored squads of one network type
    Squads {
        /// mesh or hosted
        #[arg(long, default_value = "mesh")]
        network: NetworkType,
        /// Regex over squad names
        #[arg(long)]
        name: Option<String>,
        /// Offset into the listing
        #[arg(long, default_value_t = 0)]
        last_index: usize,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let cfg = NodeConfig::load_or_default(&expand_tilde(&cli.config))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_node(cfg).await,
        Command::Status => cli_api_call(&cfg, "/api/v1/status", "{}".into()).await,
        Command::Peers => cli_api_call(&cfg, "/api/v1/peers", "{}".into()).await,
        Command::Squads {
            network,
            name,
            last_index,
        } => {
            let env = squads_request(network, name, last_index);
            cli_api_call(&cfg, "/req", serde_json::to_string(&env)?).await
        }
    }
}

fn squads_request(network: NetworkType, name: Option<String>, last_index: usize) -> Envelope {
    let env = match name {
        Some(pattern) => Envelope::new(kind::LIST_SQUADS_BY_NAME, "").with(field::SQUAD_NAME, pattern),
        None => Envelope::new(kind::LIST_SQUADS, ""),
    };
    env.with(field::NETWORK_TYPE, network.as_str())
        .with(field::LAST_INDEX, last_index.to_string())
}

/// POST `body` to the local hub API and pretty-print the JSON reply.
async fn cli_api_call(cfg: &NodeConfig, path: &str, body: String) -> anyhow::Result<()> {
    let url = format!("http://{}{}", cfg.local_api_addr(), path);
    let resp = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await?;

    let status = resp.status();
    let text = resp.text().await?;
    let shown = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => serde_json::to_string_pretty(&value)?,
        Err(_) => text,
    };
    anyhow::ensure!(status.is_success(), "{url} returned {status}: {shown}");
    println!("{shown}");
    Ok(())
}

async fn run_node(cfg: NodeConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        stream_addr = %cfg.server.stream_addr,
        http_addr = %cfg.server.http_addr,
        page_size = cfg.squads.page_size,
        store_timeout_secs = cfg.storage.timeout_secs,
        "starting squadlink-node"
    );

    let db_path = expand_tilde(&cfg.storage.database);
    let store = SqliteStore::open(&db_path)?;
    tracing::info!(db = %db_path.display(), "store opened");

    let node = squadlink_node::start(&cfg, Arc::new(store), Arc::new(RsaSealer)).await?;
    tracing::info!("hub ready, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!(online = node.hub.directory.len().await, "shutting down");
    node.shutdown().await;

    tracing::info!("hub stopped");
    Ok(())
}

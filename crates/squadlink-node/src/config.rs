//! Configuration types for squadlink-node.
//! Parsed from ~/.squadlink/config.toml.

use serde::{Deserialize, Serialize};
use squadlink_crypto::{PasswordHasherConfig, DEFAULT_LOG_N};
use squadlink_hub::HubSettings;
use squadlink_protocol::DEFAULT_PAGE_SIZE;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub squads: SquadsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Length-prefixed JSON over TCP.
    #[serde(default = "default_stream_addr")]
    pub stream_addr: String,
    /// `/req`, `/ws` and the local diagnostics routes.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            stream_addr: default_stream_addr(),
            http_addr: default_http_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadsSection {
    /// scrypt cost (log2 N) for new password hashes.
    #[serde(default = "default_log_n")]
    pub password_log_n: u8,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SquadsSection {
    fn default() -> Self {
        Self {
            password_log_n: default_log_n(),
            page_size: default_page_size(),
        }
    }
}

// Default value functions
fn default_stream_addr() -> String {
    "0.0.0.0:9480".into()
}
fn default_http_addr() -> String {
    "0.0.0.0:9481".into()
}
fn default_database() -> String {
    "~/.squadlink/squadlink.db".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_log_n() -> u8 {
    DEFAULT_LOG_N
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl NodeConfig {
    /// Load config from file, or defaults if missing.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.squads.page_size == 0 {
            anyhow::bail!("squads.page_size must be at least 1");
        }
        if !(1..=20).contains(&self.squads.password_log_n) {
            anyhow::bail!(
                "squads.password_log_n must be between 1 and 20, got {}",
                self.squads.password_log_n
            );
        }
        if self.storage.timeout_secs == 0 {
            anyhow::bail!("storage.timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            store_timeout: Duration::from_secs(self.storage.timeout_secs),
            page_size: self.squads.page_size,
            password: PasswordHasherConfig {
                log_n: self.squads.password_log_n,
            },
        }
    }

    /// Address the CLI uses to reach the local HTTP API.
    pub fn local_api_addr(&self) -> String {
        match self.server.http_addr.strip_prefix("0.0.0.0:") {
            Some(port) => format!("127.0.0.1:{port}"),
            None => self.server.http_addr.clone(),
        }
    }
}

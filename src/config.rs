//! Runtime configuration for route-preload.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Cache freshness, RPC endpoint, and server knobs all live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "route-preload", about = "Route loader server backed by a deduplicating query cache")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Base URL of the RPC server (overrides the config file).
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream RPC endpoint.
    pub rpc: RpcConfig,

    /// Query cache freshness.
    pub cache: CacheConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Request timeout in seconds; a route load that runs longer gets a 408.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// RPC client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Base URL procedures are resolved against (e.g. "http://localhost:4000/trpc").
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000/trpc".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Freshness policy of the query cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age in milliseconds after which an entry is stale. `None` keeps entries
    /// fresh until they are explicitly invalidated.
    pub stale_time_ms: Option<u64>,

    /// Serve stale data immediately and refetch in the background instead of
    /// awaiting the refetch.
    pub revalidate_if_stale: bool,
}

impl CacheConfig {
    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_time_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of the file configuration.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(url) = &cli.rpc_url {
            self.rpc.base_url = url.clone();
        }
    }
}

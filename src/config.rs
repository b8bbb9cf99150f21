//! Configuration types for WolfSync

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Sync root settings
    pub sync: SyncConfig,

    /// Cluster configuration
    pub cluster: ClusterConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    pub id: String,

    /// Bind address for peer replication traffic
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path of the status snapshot consumed by wolfsyncctl
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
}

fn default_bind() -> String {
    "0.0.0.0:9600".to_string()
}

fn default_status_file() -> PathBuf {
    PathBuf::from("/var/lib/wolfsync/status.json")
}

/// Sync root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// The replicated directory tree
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Echo suppression window in milliseconds
    #[serde(default = "default_suppress_ms")]
    pub suppress_ms: u64,

    /// Broadcast a full-tree resync after startup
    #[serde(default)]
    pub resync_on_start: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/wolfsync/data")
}

fn default_suppress_ms() -> u64 {
    100
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// List of peer addresses to connect at startup
    #[serde(default)]
    pub peers: Vec<String>,

    /// UDP discovery port (discovery disabled when absent)
    pub discovery_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                id: hostname::get()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_else(|_| "node1".to_string()),
                bind: default_bind(),
                status_file: default_status_file(),
            },
            sync: SyncConfig {
                root: default_root(),
                suppress_ms: default_suppress_ms(),
                resync_on_start: false,
            },
            cluster: ClusterConfig {
                peers: Vec::new(),
                discovery_port: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Echo suppression window as a Duration
    pub fn suppress_window(&self) -> Duration {
        Duration::from_millis(self.sync.suppress_ms)
    }
}

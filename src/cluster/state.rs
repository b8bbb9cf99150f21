//! Cluster membership for WolfSync nodes
//!
//! Wires discovered and configured peers into the mesh transport and
//! maintains the status snapshot consumed by wolfsyncctl. Membership is
//! orthogonal to replication: the engine neither knows nor cares which
//! peers are connected.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::network::discovery::Discovery;
use crate::network::peer::MeshBroadcaster;

/// Interval between maintenance passes
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(2);

/// Status snapshot written for wolfsyncctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub node_id: String,
    pub bind_address: String,
    pub sync_root: PathBuf,
    pub peers: Vec<PeerStatus>,
    pub updated_at: u64, // Unix timestamp
}

/// Per-peer status in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStatus {
    pub node_id: String,
    pub address: String,
    pub connected: bool,
    pub last_seen_secs_ago: u64,
}

/// Membership manager for one node
pub struct Membership {
    node_id: String,
    bind: String,
    root: PathBuf,
    status_file: PathBuf,
    static_peers: Vec<String>,
    discovery: Option<Arc<Discovery>>,
    mesh: Arc<MeshBroadcaster>,
    running: Arc<RwLock<bool>>,
}

impl Membership {
    /// Create a membership manager from the node configuration
    pub fn new(config: &Config, mesh: Arc<MeshBroadcaster>) -> Self {
        let discovery = config.cluster.discovery_port.map(|port| {
            Arc::new(Discovery::new(
                config.node.id.clone(),
                config.node.bind.clone(),
                port,
            ))
        });

        Self {
            node_id: config.node.id.clone(),
            bind: config.node.bind.clone(),
            root: config.sync.root.clone(),
            status_file: config.node.status_file.clone(),
            static_peers: config.cluster.peers.clone(),
            discovery,
            mesh,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start discovery, connect configured peers, and begin maintenance
    pub async fn start(&self) -> Result<()> {
        *self.running.write().await = true;

        if let Some(ref discovery) = self.discovery {
            discovery.start().await?;
        }

        // Configured peers have no announced node id; the address keys them
        for address in &self.static_peers {
            if let Err(e) = self.mesh.connect(address, address).await {
                warn!("Failed to connect to configured peer {}: {}", address, e);
            }
        }

        self.start_maintenance();
        Ok(())
    }

    /// Spawn the maintenance task: reconnect peers, rewrite the status file
    fn start_maintenance(&self) {
        let node_id = self.node_id.clone();
        let bind = self.bind.clone();
        let root = self.root.clone();
        let status_file = self.status_file.clone();
        let static_peers = self.static_peers.clone();
        let discovery = self.discovery.clone();
        let mesh = Arc::clone(&self.mesh);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);

            loop {
                interval.tick().await;

                if !*running.read().await {
                    break;
                }

                // Reconnect configured peers that dropped
                for address in &static_peers {
                    if !mesh.is_connected(address) {
                        if let Err(e) = mesh.connect(address, address).await {
                            debug!("Peer {} still unreachable: {}", address, e);
                        }
                    }
                }

                // Connect peers discovery has heard from
                let mut peers = Vec::new();
                if let Some(ref discovery) = discovery {
                    for peer in discovery.peers() {
                        if !mesh.is_connected(&peer.node_id) {
                            if let Err(e) = mesh.connect(&peer.node_id, &peer.address).await {
                                debug!(
                                    "Discovered peer {} unreachable at {}: {}",
                                    peer.node_id, peer.address, e
                                );
                            }
                        }
                        peers.push(PeerStatus {
                            connected: mesh.is_connected(&peer.node_id),
                            last_seen_secs_ago: peer.last_seen.elapsed().as_secs(),
                            node_id: peer.node_id,
                            address: peer.address,
                        });
                    }
                }
                for address in &static_peers {
                    peers.push(PeerStatus {
                        node_id: address.clone(),
                        address: address.clone(),
                        connected: mesh.is_connected(address),
                        last_seen_secs_ago: 0,
                    });
                }

                let status = ClusterStatus {
                    node_id: node_id.clone(),
                    bind_address: bind.clone(),
                    sync_root: root.clone(),
                    peers,
                    updated_at: unix_now(),
                };
                write_status(&status_file, &status);
            }
        });
    }

    /// Stop membership maintenance and discovery
    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(ref discovery) = self.discovery {
            discovery.stop().await;
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Rewrite the status snapshot; failures only log
fn write_status(path: &PathBuf, status: &ClusterStatus) {
    let json = match serde_json::to_string_pretty(status) {
        Ok(json) => json,
        Err(e) => {
            debug!("Failed to serialize status: {}", e);
            return;
        }
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(path, json) {
        debug!("Failed to write status file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_status_roundtrip() {
        let status = ClusterStatus {
            node_id: "node-a".to_string(),
            bind_address: "0.0.0.0:9600".to_string(),
            sync_root: PathBuf::from("/var/lib/wolfsync/data"),
            peers: vec![PeerStatus {
                node_id: "node-b".to_string(),
                address: "10.0.0.2:9600".to_string(),
                connected: true,
                last_seen_secs_ago: 1,
            }],
            updated_at: unix_now(),
        };

        let json = serde_json::to_string(&status).unwrap();
        let parsed: ClusterStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.node_id, "node-a");
        assert_eq!(parsed.peers.len(), 1);
        assert!(parsed.peers[0].connected);
    }

    #[tokio::test]
    async fn test_maintenance_writes_status_file() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.node.id = "node-a".to_string();
        config.node.status_file = dir.path().join("status.json");
        config.sync.root = dir.path().join("data");
        config.cluster.discovery_port = None;

        let mesh = Arc::new(MeshBroadcaster::new("node-a".to_string()));
        let membership = Membership::new(&config, mesh);
        membership.start().await.unwrap();

        for _ in 0..50 {
            if config.node.status_file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let content = std::fs::read_to_string(&config.node.status_file).unwrap();
        let status: ClusterStatus = serde_json::from_str(&content).unwrap();
        assert_eq!(status.node_id, "node-a");
        assert!(status.peers.is_empty());

        membership.stop().await;
    }
}

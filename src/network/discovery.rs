//! UDP broadcast discovery for WolfSync nodes
//!
//! Nodes announce their presence on the local network; the listener tracks
//! announcing peers and drops stale ones. Membership wiring connects
//! discovered peers into the TCP mesh.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// Default discovery port
pub const DEFAULT_DISCOVERY_PORT: u16 = 9601;

/// Interval between announce packets
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(2);

/// Discovery message prefix
const DISCOVERY_PREFIX: &str = "WOLFSYNC";

/// Discovery message version
const DISCOVERY_VERSION: u8 = 1;

/// Peers not heard from within this window are dropped
const STALE_THRESHOLD: Duration = Duration::from_secs(10);

/// Discovered peer information
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub node_id: String,
    pub address: String,
    pub last_seen: Instant,
}

/// Discovery service for finding cluster peers via UDP broadcast
pub struct Discovery {
    /// This node's ID
    node_id: String,
    /// This node's advertise address (host:port)
    advertise_address: String,
    /// Discovery port
    port: u16,
    /// Peers heard from recently
    peers: Arc<Mutex<HashMap<String, DiscoveredPeer>>>,
    /// Running flag
    running: Arc<RwLock<bool>>,
}

impl Discovery {
    /// Create a new discovery instance
    pub fn new(node_id: String, advertise_address: String, port: u16) -> Self {
        Self {
            node_id,
            advertise_address,
            port,
            peers: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Get the list of currently known peers
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.peers.lock().unwrap().values().cloned().collect()
    }

    /// Start the discovery announcer and listener tasks
    pub async fn start(&self) -> Result<()> {
        *self.running.write().await = true;

        let announce_socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::Network(format!("Failed to bind announce socket: {}", e)))?;
        announce_socket
            .set_broadcast(true)
            .map_err(|e| Error::Network(format!("Failed to enable broadcast: {}", e)))?;

        // Bind the listener up front so a port conflict surfaces at startup
        let listen_socket = UdpSocket::bind(format!("0.0.0.0:{}", self.port))
            .await
            .map_err(|e| {
                Error::Network(format!(
                    "Failed to bind discovery listener on port {}: {}",
                    self.port, e
                ))
            })?;

        self.start_announcer(announce_socket);
        self.start_listener(listen_socket);

        info!("Discovery started on port {} (UDP broadcast)", self.port);
        Ok(())
    }

    /// Start the announcer task
    fn start_announcer(&self, socket: UdpSocket) {
        let message = format_message(&self.node_id, &self.advertise_address);
        let port = self.port;
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ANNOUNCE_INTERVAL);
            let broadcast_addr: SocketAddr = format!("255.255.255.255:{}", port)
                .parse()
                .expect("broadcast address is well-formed");

            loop {
                interval.tick().await;

                if !*running.read().await {
                    break;
                }

                if let Err(e) = socket.send_to(message.as_bytes(), broadcast_addr).await {
                    // Broadcast might not be supported on all networks
                    trace!("Announce send failed: {}", e);
                } else {
                    trace!("Discovery announce sent");
                }
            }
        });
    }

    /// Start the listener task
    fn start_listener(&self, socket: UdpSocket) {
        let node_id = self.node_id.clone();
        let peers = Arc::clone(&self.peers);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let mut buf = [0u8; 512];

            loop {
                if !*running.read().await {
                    break;
                }

                // Use a timeout so the running flag is rechecked and stale
                // peers pruned even when the network is quiet
                let recv_result =
                    tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await;

                let (len, src) = match recv_result {
                    Ok(Ok((len, src))) => (len, src),
                    Ok(Err(e)) => {
                        trace!("Discovery recv error: {}", e);
                        continue;
                    }
                    Err(_) => {
                        peers
                            .lock()
                            .unwrap()
                            .retain(|_, peer| peer.last_seen.elapsed() < STALE_THRESHOLD);
                        continue;
                    }
                };

                let message = match std::str::from_utf8(&buf[..len]) {
                    Ok(s) => s,
                    Err(_) => continue,
                };

                if let Some((peer_id, address)) = parse_message(message) {
                    // Skip our own announces
                    if peer_id == node_id {
                        continue;
                    }

                    let mut peers = peers.lock().unwrap();
                    if !peers.contains_key(&peer_id) {
                        info!("Discovered peer: {} at {} (from {})", peer_id, address, src);
                    } else {
                        debug!("Peer {} refreshed", peer_id);
                    }
                    peers.insert(
                        peer_id.clone(),
                        DiscoveredPeer {
                            node_id: peer_id,
                            address,
                            last_seen: Instant::now(),
                        },
                    );
                }
            }
        });
    }

    /// Stop the discovery tasks
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

/// Format a discovery announce message
fn format_message(node_id: &str, address: &str) -> String {
    format!(
        "{}|{}|{}|{}",
        DISCOVERY_PREFIX, DISCOVERY_VERSION, node_id, address
    )
}

/// Parse a discovery announce message into (node_id, address)
fn parse_message(message: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = message.split('|').collect();

    if parts.len() < 4 {
        return None;
    }
    if parts[0] != DISCOVERY_PREFIX {
        return None;
    }

    let version: u8 = parts[1].parse().ok()?;
    if version != DISCOVERY_VERSION {
        return None;
    }

    Some((parts[2].to_string(), parts[3].to_string()))
}

//! TCP peer mesh transport
//!
//! Fans every published envelope out to all connected peers and loops it
//! back to local subscribers, so delivery always includes the publishing
//! node. Frames are length-prefixed lz4-compressed bincode.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::network::protocol::{decode_envelope, encode_envelope, Envelope};

/// Maximum accepted frame size (64MB)
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

type SubscriberList = Arc<Mutex<Vec<mpsc::UnboundedSender<Envelope>>>>;
type PeerMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Broadcast transport over a TCP peer mesh
///
/// Outbound connections are send-only; envelopes from a peer arrive on the
/// connection that peer opened to us. Send failure drops the peer
/// connection; discovery re-establishes it.
pub struct MeshBroadcaster {
    node_id: String,
    subscribers: SubscriberList,
    peers: PeerMap,
}

impl MeshBroadcaster {
    /// Create a mesh transport for this node
    pub fn new(node_id: String) -> Self {
        Self {
            node_id,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            peers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start accepting inbound peer connections, returning the bound address
    pub async fn start(&self, bind: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| Error::Network(format!("failed to bind {}: {}", bind, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Network(e.to_string()))?;

        let subscribers = Arc::clone(&self.subscribers);
        let node_id = self.node_id.clone();
        tokio::spawn(async move {
            info!("Peer mesh listening on {}", local_addr);
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Accepted peer connection from {}", addr);
                        let subscribers = Arc::clone(&subscribers);
                        let node_id = node_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = run_inbound(stream, subscribers).await {
                                debug!("[{}] peer connection from {} ended: {}", node_id, addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Open a send-only connection to a peer, if not already connected
    pub async fn connect(&self, peer_id: &str, address: &str) -> Result<()> {
        if self.peers.lock().unwrap().contains_key(peer_id) {
            return Ok(());
        }

        let stream = TcpStream::connect(address).await.map_err(|e| {
            Error::Network(format!("failed to connect to {} at {}: {}", peer_id, address, e))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().insert(peer_id.to_string(), tx);
        info!("Connected to peer {} at {}", peer_id, address);

        let peers = Arc::clone(&self.peers);
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            run_outbound(stream, rx, peers, peer_id).await;
        });

        Ok(())
    }

    /// Whether a peer connection exists
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.peers.lock().unwrap().contains_key(peer_id)
    }

    /// Number of connected peers
    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Deliver an envelope to every local subscriber
    fn fan_local(&self, envelope: Envelope) {
        fan_out(&self.subscribers, envelope);
    }
}

#[async_trait::async_trait]
impl super::broadcast::Broadcaster for MeshBroadcaster {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let bytes = encode_envelope(&envelope)?;
        let frame = lz4_flex::compress_prepend_size(&bytes);

        let mut dead = Vec::new();
        {
            let peers = self.peers.lock().unwrap();
            for (peer_id, tx) in peers.iter() {
                if tx.send(frame.clone()).is_err() {
                    dead.push(peer_id.clone());
                }
            }
        }
        for peer_id in dead {
            warn!("Dropping dead peer connection {}", peer_id);
            self.peers.lock().unwrap().remove(&peer_id);
        }

        // The transport delivers to the publisher's node too; the engine
        // filters self-echo by origin id, never here
        self.fan_local(envelope);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

fn fan_out(subscribers: &SubscriberList, envelope: Envelope) {
    let mut subscribers = subscribers.lock().unwrap();
    subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
}

/// Pump pre-encoded frames out to one peer until the channel or socket closes
async fn run_outbound(
    mut stream: TcpStream,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    peers: PeerMap,
    peer_id: String,
) {
    while let Some(frame) = rx.recv().await {
        let len = (frame.len() as u32).to_le_bytes();
        let result = async {
            stream.write_all(&len).await?;
            stream.write_all(&frame).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to send to peer {}: {}", peer_id, e);
            break;
        }
    }
    peers.lock().unwrap().remove(&peer_id);
}

/// Read frames from one inbound peer connection and fan them to subscribers
async fn run_inbound(mut stream: TcpStream, subscribers: SubscriberList) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(Error::Network(format!("frame too large: {} bytes", len)));
        }

        let mut frame = vec![0u8; len];
        stream.read_exact(&mut frame).await?;

        let bytes = lz4_flex::decompress_size_prepended(&frame)
            .map_err(|e| Error::Network(format!("decompress failed: {}", e)))?;
        let envelope = decode_envelope(&bytes)?;

        fan_out(&subscribers, envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::broadcast::Broadcaster;
    use crate::network::protocol::SyncEvent;
    use crate::path::RelativePath;
    use std::time::Duration;

    fn write_envelope(origin: &str, path: &str, content: &[u8]) -> Envelope {
        Envelope {
            origin: origin.to_string(),
            event: SyncEvent::Write {
                path: RelativePath::parse(path).unwrap(),
                content: content.to_vec(),
            },
        }
    }

    #[tokio::test]
    async fn test_mesh_delivers_to_peer_and_loops_back() {
        let mesh_a = MeshBroadcaster::new("node-a".to_string());
        let mesh_b = MeshBroadcaster::new("node-b".to_string());

        let addr_b = mesh_b.start("127.0.0.1:0").await.unwrap();
        mesh_a
            .connect("node-b", &addr_b.to_string())
            .await
            .unwrap();

        let mut sub_a = mesh_a.subscribe();
        let mut sub_b = mesh_b.subscribe();

        let envelope = write_envelope("node-a", "f.txt", b"payload");
        mesh_a.publish(envelope.clone()).await.unwrap();

        // Loopback on the publishing node
        let local = tokio::time::timeout(Duration::from_secs(2), sub_a.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local, envelope);

        // Delivery across the mesh
        let remote = tokio::time::timeout(Duration::from_secs(2), sub_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remote, envelope);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let mesh_a = MeshBroadcaster::new("node-a".to_string());
        let mesh_b = MeshBroadcaster::new("node-b".to_string());

        let addr_b = mesh_b.start("127.0.0.1:0").await.unwrap();
        mesh_a.connect("node-b", &addr_b.to_string()).await.unwrap();
        mesh_a.connect("node-b", &addr_b.to_string()).await.unwrap();

        assert_eq!(mesh_a.peer_count(), 1);
    }
}

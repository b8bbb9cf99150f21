//! Broadcast transport abstraction
//!
//! A broadcaster delivers every published envelope to every subscriber on
//! every connected node, including the publisher's own node. Delivery is
//! at-least-once with no persistence, no replay, and no ordering guarantee
//! across distinct publishers.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::network::protocol::Envelope;

/// Group broadcast transport handle
///
/// Constructed once by the caller and passed into each replication engine;
/// there is no process-wide transport state.
#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver an envelope to every subscriber on every connected node,
    /// including subscribers on the publishing node itself
    async fn publish(&self, envelope: Envelope) -> Result<()>;

    /// Register a subscriber fed with every envelope delivered to this node
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Envelope>;
}

/// In-process broadcast bus
///
/// Every published envelope is looped back to all subscribers registered
/// on this bus, publisher included. Backs single-process deployments and
/// the engine test suite.
pub struct MemoryBroadcaster {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Envelope>>>,
}

impl MemoryBroadcaster {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Broadcaster for MemoryBroadcaster {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let mut subscribers = self.subscribers.lock().unwrap();
        // Drop subscribers whose receiving end has gone away
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::SyncEvent;
    use crate::path::RelativePath;

    fn mkdir_envelope(origin: &str, path: &str) -> Envelope {
        Envelope {
            origin: origin.to_string(),
            event: SyncEvent::Mkdir {
                path: RelativePath::parse(path).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_including_publisher() {
        let bus = MemoryBroadcaster::new();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.publish(mkdir_envelope("node-a", "dirA")).await.unwrap();

        assert_eq!(sub_a.recv().await.unwrap().origin, "node-a");
        assert_eq!(sub_b.recv().await.unwrap().origin, "node-a");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = MemoryBroadcaster::new();
        let sub = bus.subscribe();
        drop(sub);

        bus.publish(mkdir_envelope("node-a", "dirA")).await.unwrap();
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}

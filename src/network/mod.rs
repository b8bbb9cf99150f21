//! Network module
//!
//! Wire protocol, broadcast transport, and peer discovery.

pub mod broadcast;
pub mod discovery;
pub mod peer;
pub mod protocol;

pub use broadcast::{Broadcaster, MemoryBroadcaster};
pub use discovery::{DiscoveredPeer, Discovery, DEFAULT_DISCOVERY_PORT};
pub use peer::MeshBroadcaster;
pub use protocol::{decode_envelope, encode_envelope, Envelope, SyncEvent};

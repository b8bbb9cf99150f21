//! WolfSync - Distributed Directory Synchronization
//!
//! Replicates a local directory tree to every connected peer node by
//! capturing filesystem change notifications and broadcasting them over
//! a group transport. Peers apply the same changes to their own copy of
//! the tree, converging bidirectionally with last-write-wins semantics.
//!
//! # Architecture
//!
//! Each node runs one replication engine per sync root: a single
//! serialized worker fed by the local filesystem watcher and by the
//! broadcast transport. The engine filters its own reflected broadcasts
//! by origin id and suppresses echo from freshly applied remote changes
//! with a short time window per path.

pub mod cluster;
pub mod config;
pub mod error;
pub mod network;
pub mod path;
pub mod replication;
pub mod watch;

pub use config::Config;
pub use error::{Error, Result};
pub use network::{Broadcaster, MemoryBroadcaster, MeshBroadcaster};
pub use path::RelativePath;
pub use replication::{EngineHandle, ReplicationEngine};

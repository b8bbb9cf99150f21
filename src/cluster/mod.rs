//! Cluster membership module

mod state;

pub use state::{ClusterStatus, Membership, PeerStatus};

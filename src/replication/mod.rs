//! Replication module
//!
//! The engine that turns local filesystem changes into broadcast sync
//! events, applies remote events to the local tree, and performs
//! full-tree resynchronization.

mod engine;

pub use engine::{EngineHandle, ReplicationEngine};

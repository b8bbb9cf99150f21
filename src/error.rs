//! Error types for WolfSync

use thiserror::Error;

/// Result type alias using WolfSync Error
pub type Result<T> = std::result::Result<T, Error>;

/// WolfSync error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Wire protocol encode/decode error
    #[error("Protocol error: {0}")]
    Protocol(#[from] bincode::Error),

    /// Filesystem watcher error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Path not found under the sync root
    #[error("Path not found: {0}")]
    NotFound(String),

    /// Path is not a valid sync-root-relative path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The replication engine's worker is no longer running
    #[error("Engine stopped")]
    Stopped,
}

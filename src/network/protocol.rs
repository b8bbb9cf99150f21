//! Wire protocol for WolfSync replication messages

use serde::{Deserialize, Serialize};

use crate::path::RelativePath;

/// A single replicated filesystem change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Full contents of a file
    Write {
        path: RelativePath,
        content: Vec<u8>,
    },
    /// Directory created
    Mkdir { path: RelativePath },
    /// File or directory removed
    Delete { path: RelativePath },
}

impl SyncEvent {
    /// The path this event applies to
    pub fn path(&self) -> &RelativePath {
        match self {
            SyncEvent::Write { path, .. } => path,
            SyncEvent::Mkdir { path } => path,
            SyncEvent::Delete { path } => path,
        }
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Write { .. } => "write",
            SyncEvent::Mkdir { .. } => "mkdir",
            SyncEvent::Delete { .. } => "delete",
        }
    }
}

/// Broadcast envelope carrying the originating node identity
///
/// The origin id is how a node recognizes its own broadcasts reflected
/// back by the transport; self-delivery is never suppressed at the
/// transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub event: SyncEvent,
}

/// Serialize an envelope for transmission
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(envelope)
}

/// Deserialize an envelope from bytes
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, bincode::Error> {
    bincode::deserialize(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope {
            origin: "node-a".to_string(),
            event: SyncEvent::Write {
                path: RelativePath::parse("dirA/file.txt").unwrap(),
                content: b"hi".to_vec(),
            },
        };

        let bytes = encode_envelope(&envelope).unwrap();
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_decode_rejects_escaping_path() {
        // Same bincode layout as Envelope, but with an unvalidated path
        #[derive(Serialize)]
        enum RawEvent {
            #[allow(dead_code)]
            Write { path: String, content: Vec<u8> },
            Mkdir { path: String },
            #[allow(dead_code)]
            Delete { path: String },
        }
        #[derive(Serialize)]
        struct RawEnvelope {
            origin: String,
            event: RawEvent,
        }

        let raw = RawEnvelope {
            origin: "mallory".to_string(),
            event: RawEvent::Mkdir {
                path: "../outside".to_string(),
            },
        };
        let bytes = bincode::serialize(&raw).unwrap();
        assert!(decode_envelope(&bytes).is_err());
    }
}

//! Sync-root-relative path handling
//!
//! Every sync event is keyed by a `RelativePath`: the normalized,
//! forward-slash-separated location of an entry under the sync root.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Normalized path of an entry under the sync root.
///
/// Always forward-slash separated, never absolute, never contains `.` or
/// `..` segments. Deserialization re-validates, so a malformed path cannot
/// enter through the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    /// Parse and normalize a forward-slash path string
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath(format!(
                        "parent escape in {:?}",
                        raw
                    )))
                }
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(Error::InvalidPath(format!("no usable segments in {:?}", raw)));
        }
        Ok(Self(segments.join("/")))
    }

    /// Build a relative path from an absolute path under `root`
    pub fn from_base(root: &Path, full: &Path) -> Result<Self> {
        let rel = full.strip_prefix(root).map_err(|_| {
            Error::InvalidPath(format!(
                "{} is outside sync root {}",
                full.display(),
                root.display()
            ))
        })?;

        let mut segments = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(seg) => {
                    let seg = seg.to_str().ok_or_else(|| {
                        Error::InvalidPath(format!(
                            "non-UTF-8 segment in {}",
                            full.display()
                        ))
                    })?;
                    segments.push(seg.to_string());
                }
                Component::CurDir => continue,
                _ => {
                    return Err(Error::InvalidPath(format!(
                        "unsupported component in {}",
                        full.display()
                    )))
                }
            }
        }
        if segments.is_empty() {
            return Err(Error::InvalidPath("path equals the sync root".to_string()));
        }
        Ok(Self(segments.join("/")))
    }

    /// Resolve this path against a sync root
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for segment in self.0.split('/') {
            out.push(segment);
        }
        out
    }

    /// The normalized forward-slash form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RelativePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RelativePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RelativePath::parse(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes() {
        let path = RelativePath::parse("dirA//./file.txt").unwrap();
        assert_eq!(path.as_str(), "dirA/file.txt");
    }

    #[test]
    fn test_parse_rejects_parent_escape() {
        assert!(RelativePath::parse("../etc/passwd").is_err());
        assert!(RelativePath::parse("a/../../b").is_err());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(RelativePath::parse("").is_err());
        assert!(RelativePath::parse("/").is_err());
        assert!(RelativePath::parse(".").is_err());
    }

    #[test]
    fn test_from_base() {
        let root = Path::new("/data/sync");
        let full = root.join("dirA").join("file.txt");
        let path = RelativePath::from_base(root, &full).unwrap();
        assert_eq!(path.as_str(), "dirA/file.txt");
    }

    #[test]
    fn test_from_base_rejects_outside_root() {
        let root = Path::new("/data/sync");
        assert!(RelativePath::from_base(root, Path::new("/etc/passwd")).is_err());
        assert!(RelativePath::from_base(root, root).is_err());
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/data/sync");
        let path = RelativePath::parse("dirA/file.txt").unwrap();
        assert_eq!(path.resolve(root), root.join("dirA").join("file.txt"));
    }

    #[test]
    fn test_deserialize_revalidates() {
        let ok: std::result::Result<RelativePath, _> = serde_json::from_str("\"dirA/file.txt\"");
        assert!(ok.is_ok());
        let escape: std::result::Result<RelativePath, _> = serde_json::from_str("\"../escape\"");
        assert!(escape.is_err());
    }
}

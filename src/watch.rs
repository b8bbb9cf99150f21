//! Filesystem change capture for the sync root
//!
//! Bridges raw `notify` OS events onto the engine's command queue. The
//! engine only ever sees plain `WatchEvent`s; everything notify-specific
//! stays here. Renames are not modeled and surface as remove + create.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::error::Result;
use crate::replication::EngineHandle;

/// Change tag reported for an entry under the watched root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A raw filesystem change notification
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Map one notify event onto watch events
fn map_event(event: &Event) -> Vec<WatchEvent> {
    // A full rename carries [from, to]; split it into remove + create
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        let mut out = Vec::new();
        if let Some(from) = event.paths.first() {
            out.push(WatchEvent {
                path: from.clone(),
                kind: ChangeKind::Removed,
            });
        }
        if let Some(to) = event.paths.get(1) {
            out.push(WatchEvent {
                path: to.clone(),
                kind: ChangeKind::Created,
            });
        }
        return out;
    }

    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| WatchEvent {
            path: path.clone(),
            kind,
        })
        .collect()
}

/// Recursive watcher on a sync root feeding the replication engine
///
/// Dropping the watcher stops change capture.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Watch `root` recursively, forwarding every change to the engine
    pub fn start(root: &Path, engine: EngineHandle) -> Result<Self> {
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for watch_event in map_event(&event) {
                        if engine.local_change(watch_event).is_err() {
                            // Engine worker is gone; nothing left to feed
                            break;
                        }
                    }
                }
                Err(e) => warn!("Watcher error: {}", e),
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching {} for changes", root.display());

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

    #[test]
    fn test_create_maps_to_created() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/root/f.txt"));
        let mapped = map_event(&event);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].kind, ChangeKind::Created);
        assert_eq!(mapped[0].path, PathBuf::from("/root/f.txt"));
    }

    #[test]
    fn test_remove_maps_to_removed() {
        let event = Event::new(EventKind::Remove(RemoveKind::Any))
            .add_path(PathBuf::from("/root/f.txt"));
        assert_eq!(map_event(&event)[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_data_modify_maps_to_modified() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/root/f.txt"));
        assert_eq!(map_event(&event)[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_rename_splits_into_remove_and_create() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/root/old.txt"))
            .add_path(PathBuf::from("/root/new.txt"));
        let mapped = map_event(&event);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].kind, ChangeKind::Removed);
        assert_eq!(mapped[0].path, PathBuf::from("/root/old.txt"));
        assert_eq!(mapped[1].kind, ChangeKind::Created);
        assert_eq!(mapped[1].path, PathBuf::from("/root/new.txt"));
    }

    #[test]
    fn test_access_events_ignored() {
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/root/f.txt"));
        assert!(map_event(&event).is_empty());
    }
}

//! The replication engine
//!
//! One serialized worker per sync root. Local change notifications,
//! remote envelopes, resync requests, and suppression expiries all arrive
//! as commands on a single queue, so no two events for the same root are
//! ever handled concurrently and neither input path can starve the other
//! of scheduling.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::network::broadcast::Broadcaster;
use crate::network::protocol::{Envelope, SyncEvent};
use crate::path::RelativePath;
use crate::watch::{ChangeKind, WatchEvent};

/// Commands processed by the engine worker, strictly in arrival order
enum Command {
    /// Raw change notification from the watcher
    Local(WatchEvent),
    /// Envelope delivered by the broadcast transport
    Remote(Envelope),
    /// Broadcast the full tree; replies with the number of entries sent
    SyncAll(oneshot::Sender<Result<usize>>),
    /// Broadcast a single entry
    SyncOne(RelativePath, oneshot::Sender<Result<()>>),
    /// Suppression window for a path elapsed
    Unsuppress(RelativePath),
    /// Stop the worker
    Shutdown,
}

/// Cloneable handle feeding an engine's command queue
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Queue a raw local change notification
    ///
    /// Callable from any thread; the watcher invokes this from its own
    /// callback thread.
    pub fn local_change(&self, event: WatchEvent) -> Result<()> {
        self.tx
            .send(Command::Local(event))
            .map_err(|_| Error::Stopped)
    }

    /// Broadcast the entire tree to all peers, returning the number of
    /// entries sent
    pub async fn sync_all(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::SyncAll(reply_tx))
            .map_err(|_| Error::Stopped)?;
        reply_rx.await.map_err(|_| Error::Stopped)?
    }

    /// Broadcast a single entry under the root
    ///
    /// Returns `Error::NotFound` without broadcasting when the path does
    /// not exist.
    pub async fn sync_one(&self, path: RelativePath) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::SyncOne(path, reply_tx))
            .map_err(|_| Error::Stopped)?;
        reply_rx.await.map_err(|_| Error::Stopped)?
    }

    /// Stop the engine worker
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// Replication engine state, owned by its worker task
pub struct ReplicationEngine {
    root: PathBuf,
    node_id: String,
    suppress_window: Duration,
    suppressed: HashSet<RelativePath>,
    broadcaster: Arc<dyn Broadcaster>,
    tx: mpsc::UnboundedSender<Command>,
}

impl ReplicationEngine {
    /// Start an engine for `root`, returning its command handle.
    ///
    /// Creates the root directory if absent; failure to create it aborts
    /// startup. Subscribes to the broadcaster and spawns the serialized
    /// worker.
    pub fn start(
        root: PathBuf,
        node_id: String,
        suppress_window: Duration,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Result<EngineHandle> {
        fs::create_dir_all(&root)?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Pump transport deliveries into the command queue so remote and
        // local events funnel through the same serialized worker
        let mut subscription = broadcaster.subscribe();
        let pump_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                if pump_tx.send(Command::Remote(envelope)).is_err() {
                    break;
                }
            }
        });

        let engine = Self {
            root: root.clone(),
            node_id,
            suppress_window,
            suppressed: HashSet::new(),
            broadcaster,
            tx: tx.clone(),
        };
        tokio::spawn(engine.run(rx));

        info!("Replication engine started for {}", root.display());
        Ok(EngineHandle { tx })
    }

    /// The serialized worker loop
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Local(event) => self.on_local_change(event).await,
                Command::Remote(envelope) => self.on_remote_event(envelope).await,
                Command::SyncAll(reply) => {
                    let _ = reply.send(self.sync_all().await);
                }
                Command::SyncOne(path, reply) => {
                    let _ = reply.send(self.sync_one(path).await);
                }
                Command::Unsuppress(path) => {
                    self.suppressed.remove(&path);
                }
                Command::Shutdown => break,
            }
        }
        debug!("Replication engine for {} stopped", self.root.display());
    }

    /// Handle a raw local change notification
    async fn on_local_change(&self, event: WatchEvent) {
        let path = match RelativePath::from_base(&self.root, &event.path) {
            Ok(path) => path,
            Err(e) => {
                debug!("Ignoring unmappable change notification: {}", e);
                return;
            }
        };

        if self.suppressed.contains(&path) {
            debug!("Suppressed echo for {}", path);
            return;
        }

        let sync_event = match event.kind {
            ChangeKind::Removed => SyncEvent::Delete { path },
            ChangeKind::Created | ChangeKind::Modified => {
                let full = path.resolve(&self.root);
                if full.is_dir() {
                    SyncEvent::Mkdir { path }
                } else {
                    match fs::read(&full) {
                        Ok(content) => SyncEvent::Write { path, content },
                        Err(e) => {
                            // File vanished between notification and read
                            warn!("Skipping unreadable {}: {}", path, e);
                            return;
                        }
                    }
                }
            }
        };

        self.broadcast(sync_event).await;
    }

    /// Handle an envelope delivered by the transport
    async fn on_remote_event(&mut self, envelope: Envelope) {
        if envelope.origin == self.node_id {
            // Our own broadcast reflected back by the transport
            return;
        }

        let path = envelope.event.path().clone();
        debug!(
            "Applying {} {} from {}",
            envelope.event.kind(),
            path,
            envelope.origin
        );

        // Mark before touching the filesystem: the watcher notification
        // for our own apply must read as an echo
        self.suppressed.insert(path.clone());

        if let Err(e) = self.apply(&envelope.event) {
            warn!(
                "Failed to apply {} {} from {}: {}",
                envelope.event.kind(),
                path,
                envelope.origin,
                e
            );
        }

        // Self-scheduled expiry keeps the suppression set ephemeral
        let tx = self.tx.clone();
        let window = self.suppress_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(Command::Unsuppress(path));
        });
    }

    /// Apply a sync event to the local tree; idempotent
    fn apply(&self, event: &SyncEvent) -> Result<()> {
        match event {
            SyncEvent::Write { path, content } => {
                let full = path.resolve(&self.root);
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full, content)?;
            }
            SyncEvent::Mkdir { path } => {
                fs::create_dir_all(path.resolve(&self.root))?;
            }
            SyncEvent::Delete { path } => {
                let full = path.resolve(&self.root);
                let result = if full.is_dir() {
                    fs::remove_dir_all(&full)
                } else {
                    fs::remove_file(&full)
                };
                match result {
                    // Already absent counts as success
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    other => other?,
                }
            }
        }
        Ok(())
    }

    /// Publish a sync event under this node's identity
    async fn broadcast(&self, event: SyncEvent) {
        debug!("Broadcasting {} {}", event.kind(), event.path());
        let envelope = Envelope {
            origin: self.node_id.clone(),
            event,
        };
        if let Err(e) = self.broadcaster.publish(envelope).await {
            warn!("Broadcast failed: {}", e);
        }
    }

    /// Broadcast every entry under the root, parents before children.
    ///
    /// Iterative depth-first walk with an explicit stack; dot-prefixed
    /// entries are skipped at every depth. Never emits deletes, so a peer
    /// that removed an entry will see it resurrected.
    async fn sync_all(&self) -> Result<usize> {
        let mut count = 0usize;
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = Vec::new();
            for entry in fs::read_dir(&dir)? {
                entries.push(entry?.path());
            }
            entries.sort();

            let mut subdirs = Vec::new();
            for full in entries {
                let name = match full.file_name().and_then(OsStr::to_str) {
                    Some(name) => name,
                    None => continue,
                };
                if name.starts_with('.') {
                    continue;
                }
                let path = match RelativePath::from_base(&self.root, &full) {
                    Ok(path) => path,
                    Err(e) => {
                        debug!("Skipping entry during resync: {}", e);
                        continue;
                    }
                };

                if full.is_dir() {
                    self.broadcast(SyncEvent::Mkdir { path }).await;
                    count += 1;
                    subdirs.push(full);
                } else {
                    match fs::read(&full) {
                        Ok(content) => {
                            self.broadcast(SyncEvent::Write { path, content }).await;
                            count += 1;
                        }
                        Err(e) => {
                            warn!("Skipping unreadable {} during resync: {}", path, e);
                        }
                    }
                }
            }

            // Reversed so the stack pops subdirectories in name order
            for subdir in subdirs.into_iter().rev() {
                stack.push(subdir);
            }
        }

        info!("Full resync broadcast {} entries", count);
        Ok(count)
    }

    /// Broadcast a single entry, or report that it does not exist
    async fn sync_one(&self, path: RelativePath) -> Result<()> {
        let full = path.resolve(&self.root);
        if !full.exists() {
            return Err(Error::NotFound(path.to_string()));
        }

        let event = if full.is_dir() {
            SyncEvent::Mkdir { path }
        } else {
            let content = fs::read(&full)?;
            SyncEvent::Write { path, content }
        };
        self.broadcast(event).await;
        Ok(())
    }
}

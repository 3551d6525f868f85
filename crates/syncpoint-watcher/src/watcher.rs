//! Debounced filesystem watcher that keeps the hash registry in sync with
//! out-of-band edits.
//!
//! Events are buffered per path and flushed after a quiet window so editor
//! save patterns (temp-write then rename shows up as delete+create) coalesce
//! into a single modification. Watcher processing runs on its own task and
//! never blocks CRUD operations.

use crate::hash::{compute_file_hash, HashError};
use crate::registry::{HashRegistry, HashSource};
use notify::{Config, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watcher section of the engine configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub max_file_size_bytes: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Handle to a running watcher task.
pub struct WatcherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop the watcher and wait for its task to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Created,
    Modified,
    Deleted,
}

enum AnyWatcher {
    Native(RecommendedWatcher),
    Polling(PollWatcher),
}

impl AnyWatcher {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        match self {
            AnyWatcher::Native(w) => w.watch(path, RecursiveMode::Recursive),
            AnyWatcher::Polling(w) => w.watch(path, RecursiveMode::Recursive),
        }
    }
}

/// Paths that look like network mounts get the polling observer up front;
/// native watchers are unreliable or unavailable there.
fn is_network_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.starts_with("\\\\") || s.starts_with("//") || s.starts_with("/mnt/") || s.starts_with("/net/")
}

/// Start watching the base directories, updating `registry` on debounced
/// events. Returns a handle used to stop the watcher on shutdown.
pub fn spawn_watcher(
    config: WatcherConfig,
    base_directories: Vec<PathBuf>,
    registry: Arc<HashRegistry>,
) -> WatcherHandle {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    let task = tokio::spawn(async move {
        if !config.enabled {
            info!("file watcher disabled");
            return;
        }
        watcher_task(config, base_directories, registry, token).await;
    });

    WatcherHandle { shutdown, task }
}

async fn watcher_task(
    config: WatcherConfig,
    base_directories: Vec<PathBuf>,
    registry: Arc<HashRegistry>,
    shutdown: CancellationToken,
) {
    let (notify_tx, mut notify_rx) = mpsc::channel::<Result<Event, notify::Error>>(256);

    // Watchers must stay alive for the duration of the task.
    let mut watchers: Vec<AnyWatcher> = Vec::new();

    for directory in &base_directories {
        if !directory.exists() {
            warn!(path = %directory.display(), "base directory missing, not watching");
            continue;
        }

        match create_watcher(directory, notify_tx.clone()) {
            Ok(mut watcher) => match watcher.watch(directory) {
                Ok(()) => {
                    info!(path = %directory.display(), "watching");
                    watchers.push(watcher);
                }
                Err(e) => {
                    error!(path = %directory.display(), "failed to watch: {}", e);
                }
            },
            Err(e) => {
                error!(path = %directory.display(), "failed to create watcher: {}", e);
            }
        }
    }
    drop(notify_tx);

    let debounce = Duration::from_millis(config.debounce_ms.max(1));
    let mut pending: HashMap<PathBuf, (PendingKind, tokio::time::Instant)> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|(_, at)| *at + debounce).min();

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("watcher shutting down");
                break;
            }
            event = notify_rx.recv() => {
                match event {
                    Some(Ok(event)) => buffer_event(&mut pending, &event),
                    Some(Err(e)) => warn!("watcher error: {}", e),
                    None => break,
                }
            }
            _ = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let now = tokio::time::Instant::now();
                let expired: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (_, at))| now >= *at + debounce)
                    .map(|(p, _)| p.clone())
                    .collect();
                for path in expired {
                    if let Some((kind, _)) = pending.remove(&path) {
                        process_event(&registry, &path, kind, config.max_file_size_bytes).await;
                    }
                }
            }
        }
    }
}

fn create_watcher(
    directory: &Path,
    tx: mpsc::Sender<Result<Event, notify::Error>>,
) -> notify::Result<AnyWatcher> {
    let poll_config = Config::default().with_poll_interval(Duration::from_secs(2));

    if is_network_path(directory) {
        warn!(path = %directory.display(), "network path, using polling watcher");
        let tx = tx.clone();
        let watcher = PollWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            poll_config,
        )?;
        return Ok(AnyWatcher::Polling(watcher));
    }

    let native_tx = tx.clone();
    match RecommendedWatcher::new(
        move |res| {
            let _ = native_tx.blocking_send(res);
        },
        Config::default(),
    ) {
        Ok(watcher) => Ok(AnyWatcher::Native(watcher)),
        Err(e) => {
            // inotify exhaustion and friends: fall back to polling.
            warn!("native watcher unavailable ({}), falling back to polling", e);
            let watcher = PollWatcher::new(
                move |res| {
                    let _ = tx.blocking_send(res);
                },
                poll_config,
            )?;
            Ok(AnyWatcher::Polling(watcher))
        }
    }
}

/// Buffer an event per path, coalescing within the debounce window:
/// delete+create becomes modified, create+delete cancels out, and anything
/// after a modification stays a modification.
fn buffer_event(pending: &mut HashMap<PathBuf, (PendingKind, tokio::time::Instant)>, event: &Event) {
    let kind = if event.kind.is_create() {
        PendingKind::Created
    } else if event.kind.is_remove() {
        PendingKind::Deleted
    } else if event.kind.is_modify() {
        PendingKind::Modified
    } else {
        return;
    };

    let now = tokio::time::Instant::now();
    for path in &event.paths {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        match pending.get(&canonical).map(|(k, _)| *k) {
            Some(PendingKind::Deleted) if kind == PendingKind::Created => {
                pending.insert(canonical, (PendingKind::Modified, now));
            }
            Some(PendingKind::Created) if kind == PendingKind::Deleted => {
                pending.remove(&canonical);
            }
            Some(PendingKind::Modified) => {
                pending.insert(canonical, (PendingKind::Modified, now));
            }
            _ => {
                pending.insert(canonical, (kind, now));
            }
        }
    }
}

/// Apply a flushed event to the registry. Existence on disk wins over the
/// reported kind, which papers over platform differences in rename events.
async fn process_event(
    registry: &HashRegistry,
    path: &Path,
    kind: PendingKind,
    max_file_size_bytes: u64,
) {
    let exists = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);

    if !exists {
        if kind == PendingKind::Deleted || registry.contains(path) {
            registry.remove(path);
            debug!(path = %path.display(), "removed from registry");
        }
        return;
    }

    // New files are registered on first access through the engine, not by the
    // watcher; only refresh paths we already track.
    if !registry.contains(path) {
        debug!(path = %path.display(), "ignoring event for untracked file");
        return;
    }

    match compute_file_hash(path, max_file_size_bytes).await {
        Ok(hash) => {
            debug!(path = %path.display(), hash = %hash, "watcher refreshed fingerprint");
            registry.update(path, hash, HashSource::WatcherEvent);
        }
        Err(HashError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            // Vanished between the event and the hash.
            registry.remove(path);
        }
        Err(e) => {
            warn!(path = %path.display(), "failed to hash: {}", e);
        }
    }
}

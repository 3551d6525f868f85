//! Optional snapshot persistence for the hash registry and pending waiters.
//!
//! When enabled, a debounced background task writes a JSON snapshot of the
//! registry fingerprints and queued-waiter metadata. No file contents are
//! ever persisted. On startup the snapshot is loaded, expired waiters are
//! purged, and every registry entry is re-validated against the bytes on
//! disk before the engine admits requests.

use crate::lock::{LockManager, PersistedWaiter};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncpoint_watcher::{compute_file_hash, HashRegistry, HashSource};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot layout. Self-describing so older or missing versions can
/// be discarded and rebuilt.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    saved_at: String,
    hash_registry: std::collections::HashMap<String, String>,
    pending_queue: Vec<PersistedWaiter>,
}

/// Debounced snapshot writer plus startup recovery.
///
/// All methods are no-ops when persistence is disabled.
pub struct StatePersistence {
    registry: Arc<HashRegistry>,
    locks: Arc<LockManager>,
    enabled: bool,
    state_file: PathBuf,
    debounce: Duration,
    max_file_size_bytes: u64,
    dirty: Arc<Notify>,
    dirty_flag: Arc<AtomicBool>,
    /// Held for the process lifetime so two daemons cannot share a state file
    _instance_lock: Option<File>,
}

impl StatePersistence {
    pub fn new(
        registry: Arc<HashRegistry>,
        locks: Arc<LockManager>,
        config: &crate::config::PersistenceConfig,
        max_file_size_bytes: u64,
    ) -> io::Result<Self> {
        let state_file = config
            .state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(".syncpoint").join("state.json"));

        let instance_lock = if config.enabled {
            if let Some(parent) = state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let lock_path = state_file.with_extension("lock");
            let lock_file = File::create(&lock_path)?;
            lock_file.try_lock_exclusive().map_err(|e| {
                error!(
                    "another syncpoint instance already owns {}: {}",
                    lock_path.display(),
                    e
                );
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("state file {} is locked by another instance", lock_path.display()),
                )
            })?;
            Some(lock_file)
        } else {
            None
        };

        Ok(Self {
            registry,
            locks,
            enabled: config.enabled,
            state_file,
            debounce: Duration::from_secs_f64(config.write_debounce.max(0.01)),
            max_file_size_bytes,
            dirty: Arc::new(Notify::new()),
            dirty_flag: Arc::new(AtomicBool::new(false)),
            _instance_lock: instance_lock,
        })
    }

    /// Load the snapshot and run startup recovery: restore, purge expired
    /// waiters, re-validate fingerprints, save the cleaned state.
    pub async fn load(&self) {
        if !self.enabled {
            return;
        }

        let raw = match std::fs::read_to_string(&self.state_file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no state file at {}, starting fresh", self.state_file.display());
                return;
            }
            Err(e) => {
                error!("cannot read state file {}: {}", self.state_file.display(), e);
                return;
            }
        };

        let snapshot: SnapshotFile = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    "corrupt state file {}: {}; starting fresh",
                    self.state_file.display(),
                    e
                );
                return;
            }
        };

        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                "state file schema version {} (expected {}), discarding",
                snapshot.version, SNAPSHOT_VERSION
            );
            return;
        }

        info!(
            "loading state from {} ({} files, {} pending waiters)",
            self.state_file.display(),
            snapshot.hash_registry.len(),
            snapshot.pending_queue.len()
        );

        self.registry
            .restore(snapshot.hash_registry, HashSource::StartupRevalidation);
        self.locks.restore(snapshot.pending_queue);

        let purged = self.locks.purge_expired();
        if purged > 0 {
            info!("purged {} expired waiters on startup", purged);
        }

        self.revalidate_hashes().await;
        self.save_now().await;
    }

    /// Re-read every tracked file and reconcile the registry with reality.
    async fn revalidate_hashes(&self) {
        let mut removed = 0;
        let mut updated = 0;

        for path in self.registry.tracked_paths() {
            let stored = self.registry.get(&path);
            match compute_file_hash(&path, self.max_file_size_bytes).await {
                Ok(current) => {
                    if stored.as_deref() != Some(current.as_str()) {
                        warn!(
                            path = %path.display(),
                            "fingerprint changed while down (external modification)"
                        );
                        self.registry
                            .update(&path, current, HashSource::StartupRevalidation);
                        updated += 1;
                    }
                }
                Err(_) => {
                    info!(path = %path.display(), "dropping missing or unreadable file");
                    self.registry.remove(&path);
                    removed += 1;
                }
            }
        }

        if removed > 0 || updated > 0 {
            info!("registry revalidation: {} removed, {} updated", removed, updated);
        }
    }

    /// Mark state dirty; the background task writes after the debounce window.
    pub fn mark_dirty(&self) {
        if !self.enabled {
            return;
        }
        self.dirty_flag.store(true, Ordering::SeqCst);
        self.dirty.notify_one();
    }

    /// Write the snapshot immediately, bypassing the debounce. Used on
    /// graceful shutdown.
    pub async fn save_now(&self) {
        if !self.enabled {
            return;
        }
        self.dirty_flag.store(false, Ordering::SeqCst);

        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now().to_rfc3339(),
            hash_registry: self.registry.snapshot(),
            pending_queue: self.locks.snapshot(),
        };

        let content = match serde_json::to_vec_pretty(&snapshot) {
            Ok(content) => content,
            Err(e) => {
                error!("failed to serialize state: {}", e);
                return;
            }
        };

        if let Some(parent) = self.state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = crate::io::atomic_write(&self.state_file, content).await {
            error!("failed to save state to {}: {}", self.state_file.display(), e);
        } else {
            debug!("saved state to {}", self.state_file.display());
        }
    }

    /// Start the debounced writer task.
    pub fn spawn_writer(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = self;
        tokio::spawn(async move {
            if !this.enabled {
                return;
            }
            loop {
                tokio::select! {
                    _ = this.dirty.notified() => {
                        // Debounce window: coalesce a burst of mutations into
                        // one write.
                        tokio::time::sleep(this.debounce).await;
                        if this.dirty_flag.swap(false, Ordering::SeqCst) {
                            this.save_now().await;
                        }
                    }
                    _ = shutdown.cancelled() => {
                        if this.dirty_flag.load(Ordering::SeqCst) {
                            this.save_now().await;
                        }
                        return;
                    }
                }
            }
        })
    }
}

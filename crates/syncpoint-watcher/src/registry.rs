//! In-memory hash registry and the bounded version cache.
//!
//! The registry maps canonical paths to their last known fingerprint plus
//! liveness metadata. It is authoritative for listings and status, but write
//! paths never trust it blindly: mutating operations recompute the hash from
//! disk under the exclusive lock.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Where a registry entry's fingerprint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashSource {
    InternalWrite,
    WatcherEvent,
    StartupRevalidation,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub hash: String,
    pub last_observed_at: DateTime<Utc>,
    pub source: HashSource,
}

/// Thread-safe map from canonical path to current known fingerprint.
#[derive(Debug, Default)]
pub struct HashRegistry {
    entries: RwLock<HashMap<PathBuf, RegistryEntry>>,
}

impl HashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current fingerprint for a path, if tracked.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(path)
            .map(|e| e.hash.clone())
    }

    /// Whether the path is currently tracked.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .contains_key(path)
    }

    /// Publish a new fingerprint for a path.
    pub fn update(&self, path: &Path, hash: String, source: HashSource) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.insert(
            path.to_path_buf(),
            RegistryEntry {
                hash,
                last_observed_at: Utc::now(),
                source,
            },
        );
    }

    /// Drop a path from the registry. No-op if untracked.
    pub fn remove(&self, path: &Path) {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .remove(path);
    }

    /// Rename a tracked path, keeping its fingerprint.
    pub fn rename(&self, old_path: &Path, new_path: &Path) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some(entry) = entries.remove(old_path) {
            entries.insert(new_path.to_path_buf(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fingerprint-only snapshot for persistence.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(path, entry)| (path.to_string_lossy().into_owned(), entry.hash.clone()))
            .collect()
    }

    /// Replace the registry contents from a persisted snapshot.
    pub fn restore(&self, state: HashMap<String, String>, source: HashSource) {
        let now = Utc::now();
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.clear();
        for (path, hash) in state {
            entries.insert(
                PathBuf::from(path),
                RegistryEntry {
                    hash,
                    last_observed_at: now,
                    source,
                },
            );
        }
    }

    /// All tracked paths, for startup revalidation.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// How many recent versions of a file the cache retains.
const VERSIONS_PER_PATH: usize = 4;

/// Bounded per-path cache of recently observed `(fingerprint, content)` pairs.
///
/// Contention responses use this to recover the content behind the agent's
/// `expected_hash`, so the diff can show exactly what changed between the
/// version the agent read and the version on disk. Entries are only recorded
/// for files the engine has fully read or written under a lock, which bounds
/// each entry by the configured maximum file size. Never persisted.
#[derive(Debug, Default)]
pub struct VersionCache {
    versions: Mutex<HashMap<PathBuf, VecDeque<(String, String)>>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version observed under lock. Duplicate hashes refresh their
    /// position; the oldest version falls off past the cap.
    pub fn record(&self, path: &Path, hash: &str, content: &str) {
        let mut versions = self.versions.lock().expect("version cache lock poisoned");
        let ring = versions.entry(path.to_path_buf()).or_default();
        ring.retain(|(h, _)| h != hash);
        ring.push_back((hash.to_string(), content.to_string()));
        while ring.len() > VERSIONS_PER_PATH {
            ring.pop_front();
        }
    }

    /// Content for a specific version of a path, if still cached.
    pub fn lookup(&self, path: &Path, hash: &str) -> Option<String> {
        self.versions
            .lock()
            .expect("version cache lock poisoned")
            .get(path)
            .and_then(|ring| ring.iter().find(|(h, _)| h == hash))
            .map(|(_, content)| content.clone())
    }

    /// Drop all versions for a path (delete) or move them (rename).
    pub fn remove(&self, path: &Path) {
        self.versions
            .lock()
            .expect("version cache lock poisoned")
            .remove(path);
    }

    pub fn rename(&self, old_path: &Path, new_path: &Path) {
        let mut versions = self.versions.lock().expect("version cache lock poisoned");
        if let Some(ring) = versions.remove(old_path) {
            versions.insert(new_path.to_path_buf(), ring);
        }
    }
}

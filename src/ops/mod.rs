//! Operation layer: CRUD semantics composed from the validator, lock
//! manager, I/O layer, registry, and diff engine.
//!
//! Every mutating operation follows the same shape: validate the path, take
//! the lock, recompute the current fingerprint from disk, compare, act, hash,
//! publish, release, respond. Cancellation is only honored while queued for a
//! lock; once granted, a holder runs to release.

pub mod append;
pub mod batch;
pub mod delete;
pub mod list;
pub mod read;
pub mod rename;
pub mod status;
pub mod update;
pub mod write;

use crate::config::Settings;
use crate::lock::{LockError, LockGuard, LockManager};
use crate::path::PathValidator;
use crate::persistence::StatePersistence;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use syncpoint_types::{ErrorBody, ErrorCode, OpError};
use syncpoint_watcher::{HashRegistry, HashSource, VersionCache};
use tokio_util::sync::CancellationToken;

/// Shared state threaded through every operation.
pub struct OpState {
    pub settings: Settings,
    pub validator: PathValidator,
    pub locks: Arc<LockManager>,
    pub registry: Arc<HashRegistry>,
    pub versions: Arc<VersionCache>,
    pub persistence: Arc<StatePersistence>,
    /// Transport label reported by status; supplied by the embedding layer
    pub transport: String,
    pub started_at: std::time::Instant,
}

impl OpState {
    /// Publish a fingerprint observed under lock: registry, version cache,
    /// and the persistence dirty flag. Happens before the response is built.
    pub fn publish(&self, path: &Path, hash: &str, content: Option<&str>) {
        self.registry
            .update(path, hash.to_string(), HashSource::InternalWrite);
        if let Some(content) = content {
            self.versions.record(path, hash, content);
        }
        self.persistence.mark_dirty();
    }

    /// Drop all knowledge of a path after a delete.
    pub fn forget(&self, path: &Path) {
        self.registry.remove(path);
        self.versions.remove(path);
        self.persistence.mark_dirty();
    }
}

/// ISO-8601 timestamp for response envelopes.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Turn an operation error into the wire-level error body.
pub fn error_body(err: OpError) -> ErrorBody {
    ErrorBody {
        error_code: err.code,
        message: err.message,
        path: err.path,
        timestamp: timestamp(),
    }
}

fn map_lock_err(err: LockError) -> OpError {
    match err {
        LockError::Timeout { .. } => OpError::new(ErrorCode::LockTimeout, err.to_string()),
        LockError::ShuttingDown => OpError::new(ErrorCode::ServerError, err.to_string()),
    }
}

fn cancelled() -> OpError {
    OpError::new(ErrorCode::ServerError, "request cancelled before lock grant")
}

/// Acquire a shared lock, abandoning the wait if the request is cancelled.
pub async fn acquire_shared(
    state: &OpState,
    path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<LockGuard, OpError> {
    tokio::select! {
        res = state.locks.acquire_shared(path, timeout) => res.map_err(map_lock_err),
        _ = cancel.cancelled() => Err(cancelled()),
    }
}

/// Acquire an exclusive lock, abandoning the wait if the request is cancelled.
pub async fn acquire_exclusive(
    state: &OpState,
    path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<LockGuard, OpError> {
    tokio::select! {
        res = state.locks.acquire_exclusive(path, timeout) => res.map_err(map_lock_err),
        _ = cancel.cancelled() => Err(cancelled()),
    }
}

/// Acquire both rename locks in sorted order, cancellation-aware.
pub async fn acquire_two_exclusive(
    state: &OpState,
    path_a: &Path,
    path_b: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(LockGuard, LockGuard), OpError> {
    tokio::select! {
        res = state.locks.acquire_two_exclusive(path_a, path_b, timeout) => res.map_err(map_lock_err),
        _ = cancel.cancelled() => Err(cancelled()),
    }
}

//! Per-path read/write lock manager with FIFO queue semantics.
//!
//! Each canonical path gets a lock entry holding the active holder counts and
//! an ordered queue of waiters. Grant order is strict FIFO with one
//! relaxation: when an exclusive holder releases, a contiguous run of shared
//! waiters at the head of the queue is granted together, stopping at the
//! first exclusive waiter. A fresh shared request may only skip the queue
//! when the lock is free or shared *and* nobody is queued, so a stream of
//! readers cannot starve a waiting writer.
//!
//! Internal critical sections are short and non-yielding: the per-path state
//! sits behind a `std::sync::Mutex`, and waiters park on per-waiter oneshot
//! channels. Guards release on drop, so holders always run to release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Requested lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to acquire {mode} lock within {timeout:?}")]
    Timeout { mode: LockMode, timeout: Duration },
    #[error("lock manager is refusing new waiters (shutting down)")]
    ShuttingDown,
}

/// A pending waiter in a path's queue.
struct Waiter {
    ordinal: u64,
    mode: LockMode,
    /// None for waiters restored from a persistence snapshot; promotion
    /// reaps those on contact.
    grant: Option<oneshot::Sender<()>>,
    queued_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct LockState {
    readers: usize,
    writer: bool,
    queue: VecDeque<Waiter>,
}

struct PathLock {
    state: Mutex<LockState>,
}

/// Snapshot of one path's lock state for status reporting.
#[derive(Debug, Clone)]
pub struct PathLockStatus {
    pub path: PathBuf,
    pub active_readers: usize,
    pub active_writer: bool,
    pub queued: usize,
    pub pending: Vec<PendingWaiter>,
}

#[derive(Debug, Clone)]
pub struct PendingWaiter {
    pub mode: LockMode,
    pub queued_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Pending-waiter record in a persistence snapshot. No contents, no signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedWaiter {
    pub path: String,
    pub mode: LockMode,
    pub ordinal: u64,
    pub deadline_epoch_ms: i64,
}

struct Inner {
    locks: Mutex<HashMap<PathBuf, Arc<PathLock>>>,
    next_ordinal: AtomicU64,
    ttl_multiplier: f64,
    closed: AtomicBool,
}

/// Top-level manager: a map of lazily created per-path lock entries.
pub struct LockManager {
    inner: Arc<Inner>,
}

impl LockManager {
    pub fn new(ttl_multiplier: f64) -> Self {
        Self {
            inner: Arc::new(Inner {
                locks: Mutex::new(HashMap::new()),
                next_ordinal: AtomicU64::new(1),
                ttl_multiplier: ttl_multiplier.max(1.0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Refuse all new waiters. Current holders and queued waiters drain
    /// normally.
    pub fn refuse_new_waiters(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// True while any path has holders or queued waiters.
    pub fn has_activity(&self) -> bool {
        let locks = self.inner.locks.lock().expect("lock map poisoned");
        locks.values().any(|lock| {
            let st = lock.state.lock().expect("lock state poisoned");
            st.readers > 0 || st.writer || !st.queue.is_empty()
        })
    }

    pub async fn acquire_shared(
        &self,
        path: &Path,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        self.acquire(path, LockMode::Shared, timeout).await
    }

    pub async fn acquire_exclusive(
        &self,
        path: &Path,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        self.acquire(path, LockMode::Exclusive, timeout).await
    }

    /// Acquire exclusive locks on two distinct paths, always in lexicographic
    /// order so concurrent renames cannot deadlock. Returns guards in the
    /// caller's argument order. On failure of the second lock the first is
    /// released before the error propagates.
    pub async fn acquire_two_exclusive(
        &self,
        path_a: &Path,
        path_b: &Path,
        timeout: Duration,
    ) -> Result<(LockGuard, LockGuard), LockError> {
        debug_assert_ne!(path_a, path_b);
        let (first, second) = if path_a <= path_b {
            (path_a, path_b)
        } else {
            (path_b, path_a)
        };

        let first_guard = self.acquire(first, LockMode::Exclusive, timeout).await?;
        let second_guard = match self.acquire(second, LockMode::Exclusive, timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                drop(first_guard);
                return Err(e);
            }
        };

        if first == path_a {
            Ok((first_guard, second_guard))
        } else {
            Ok((second_guard, first_guard))
        }
    }

    async fn acquire(
        &self,
        path: &Path,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(LockError::ShuttingDown);
        }

        let lock = self.inner.entry(path);
        let ordinal = self.inner.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let deadline = tokio::time::Instant::now() + timeout;

        let receiver = {
            let mut st = lock.state.lock().expect("lock state poisoned");
            let grantable = match mode {
                // Shared may skip the queue only when nothing exclusive is
                // active and nobody arrived earlier.
                LockMode::Shared => !st.writer && st.queue.is_empty(),
                LockMode::Exclusive => !st.writer && st.readers == 0 && st.queue.is_empty(),
            };

            if grantable {
                match mode {
                    LockMode::Shared => st.readers += 1,
                    LockMode::Exclusive => st.writer = true,
                }
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let now = Utc::now();
                st.queue.push_back(Waiter {
                    ordinal,
                    mode,
                    grant: Some(tx),
                    queued_at: now,
                    deadline: now
                        + chrono::Duration::from_std(timeout)
                            .unwrap_or_else(|_| chrono::Duration::zero()),
                });
                // Reap any dead entries ahead of us; this may grant us
                // immediately if they were all that stood in the way.
                promote(&mut st);
                Some(rx)
            }
        };

        if let Some(rx) = receiver {
            // Removes the waiter if this future is dropped before a grant;
            // rolls back a grant that raced the drop.
            let mut parked = ParkedWaiter {
                inner: Arc::clone(&self.inner),
                lock: Arc::clone(&lock),
                path: path.to_path_buf(),
                ordinal,
                mode,
                armed: true,
            };

            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(())) => {
                    parked.armed = false;
                }
                Ok(Err(_)) | Err(_) => {
                    parked.armed = false;
                    self.inner.abandon_wait(path, &lock, ordinal, mode);
                    return Err(LockError::Timeout { mode, timeout });
                }
            }
        }

        Ok(LockGuard {
            inner: Arc::clone(&self.inner),
            lock,
            path: path.to_path_buf(),
            mode,
            released: false,
        })
    }

    /// Lock status for one path. Paths with no entry report as unlocked.
    pub fn status(&self, path: &Path) -> PathLockStatus {
        let lock = {
            let locks = self.inner.locks.lock().expect("lock map poisoned");
            locks.get(path).cloned()
        };

        match lock {
            None => PathLockStatus {
                path: path.to_path_buf(),
                active_readers: 0,
                active_writer: false,
                queued: 0,
                pending: Vec::new(),
            },
            Some(lock) => {
                let st = lock.state.lock().expect("lock state poisoned");
                PathLockStatus {
                    path: path.to_path_buf(),
                    active_readers: st.readers,
                    active_writer: st.writer,
                    queued: st.queue.len(),
                    pending: st
                        .queue
                        .iter()
                        .map(|w| PendingWaiter {
                            mode: w.mode,
                            queued_at: w.queued_at,
                            deadline: w.deadline,
                        })
                        .collect(),
                }
            }
        }
    }

    /// Status of every path with an active entry.
    pub fn all_status(&self) -> Vec<PathLockStatus> {
        let paths: Vec<PathBuf> = {
            let locks = self.inner.locks.lock().expect("lock map poisoned");
            locks.keys().cloned().collect()
        };
        paths.iter().map(|p| self.status(p)).collect()
    }

    /// Pending-waiter metadata for persistence. Holders and expired waiters
    /// are never included.
    pub fn snapshot(&self) -> Vec<PersistedWaiter> {
        let now = Utc::now();
        let locks = self.inner.locks.lock().expect("lock map poisoned");
        let mut waiters = Vec::new();
        for (path, lock) in locks.iter() {
            let st = lock.state.lock().expect("lock state poisoned");
            for w in st.queue.iter() {
                let expires = ttl_deadline(w, self.inner.ttl_multiplier);
                if expires > now {
                    waiters.push(PersistedWaiter {
                        path: path.to_string_lossy().into_owned(),
                        mode: w.mode,
                        ordinal: w.ordinal,
                        deadline_epoch_ms: expires.timestamp_millis(),
                    });
                }
            }
        }
        waiters
    }

    /// Restore waiter metadata from a snapshot, dropping records whose
    /// deadline already passed. Restored waiters have no grant channel; they
    /// occupy queue positions until promotion reaps them or they expire.
    pub fn restore(&self, waiters: Vec<PersistedWaiter>) -> usize {
        let now = Utc::now();
        let mut restored = 0;
        let mut locks = self.inner.locks.lock().expect("lock map poisoned");

        for record in waiters {
            let Some(deadline) = DateTime::from_timestamp_millis(record.deadline_epoch_ms) else {
                continue;
            };
            if deadline <= now {
                continue;
            }

            let lock = locks.entry(PathBuf::from(&record.path)).or_insert_with(|| {
                Arc::new(PathLock {
                    state: Mutex::new(LockState::default()),
                })
            });
            let mut st = lock.state.lock().expect("lock state poisoned");
            st.queue.push_back(Waiter {
                ordinal: record.ordinal,
                mode: record.mode,
                grant: None,
                queued_at: now,
                deadline,
            });
            restored += 1;

            self.inner
                .next_ordinal
                .fetch_max(record.ordinal + 1, Ordering::Relaxed);
        }
        restored
    }

    /// Drop queued waiters whose deadline has passed. Used after restore and
    /// available to periodic maintenance.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        let mut locks = self.inner.locks.lock().expect("lock map poisoned");

        locks.retain(|_, lock| {
            let mut st = lock.state.lock().expect("lock state poisoned");
            let before = st.queue.len();
            st.queue.retain(|w| w.deadline > now);
            purged += before - st.queue.len();
            promote(&mut st);
            st.readers > 0 || st.writer || !st.queue.is_empty()
        });
        purged
    }
}

impl Inner {
    fn entry(&self, path: &Path) -> Arc<PathLock> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        Arc::clone(locks.entry(path.to_path_buf()).or_insert_with(|| {
            Arc::new(PathLock {
                state: Mutex::new(LockState::default()),
            })
        }))
    }

    /// Remove a waiter that gave up (timeout or cancellation). When the
    /// waiter is already gone its grant raced the abandonment, so the lock it
    /// was handed is released again.
    fn abandon_wait(&self, path: &Path, lock: &Arc<PathLock>, ordinal: u64, mode: LockMode) {
        let was_queued = {
            let mut st = lock.state.lock().expect("lock state poisoned");
            if let Some(pos) = st.queue.iter().position(|w| w.ordinal == ordinal) {
                st.queue.remove(pos);
                // Removing a queued exclusive waiter can unblock shared
                // waiters behind it.
                promote(&mut st);
                true
            } else {
                false
            }
        };

        if !was_queued {
            debug!(path = %path.display(), "grant raced an abandoned wait, releasing");
            self.release_holder(path, lock, mode);
            return;
        }
        self.reclaim_if_idle(path, lock);
    }

    /// Release one holder and promote the queue.
    fn release_holder(&self, path: &Path, lock: &Arc<PathLock>, mode: LockMode) {
        {
            let mut st = lock.state.lock().expect("lock state poisoned");
            match mode {
                LockMode::Shared => st.readers = st.readers.saturating_sub(1),
                LockMode::Exclusive => st.writer = false,
            }
            promote(&mut st);
        }
        self.reclaim_if_idle(path, lock);
    }

    /// Drop the map entry once a path has no holders and no waiters.
    fn reclaim_if_idle(&self, path: &Path, lock: &Arc<PathLock>) {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        let idle = {
            let st = lock.state.lock().expect("lock state poisoned");
            st.readers == 0 && !st.writer && st.queue.is_empty()
        };
        if idle {
            if let Some(current) = locks.get(path) {
                if Arc::ptr_eq(current, lock) {
                    locks.remove(path);
                }
            }
        }
    }
}

fn ttl_deadline(waiter: &Waiter, multiplier: f64) -> DateTime<Utc> {
    let timeout = waiter.deadline - waiter.queued_at;
    let scaled = timeout
        .to_std()
        .ok()
        .map(|d| d.mul_f64(multiplier))
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .unwrap_or(timeout);
    waiter.queued_at + scaled
}

/// Grant eligible waiters from the head of the queue.
///
/// Exclusive at the head waits for all holders to drain, then runs alone.
/// Shared at the head is granted together with every contiguous shared waiter
/// behind it; the first exclusive waiter pins the horizon. Waiters whose
/// grant channel is gone (cancelled or restored) are skipped and removed.
fn promote(st: &mut LockState) {
    loop {
        let Some(front_mode) = st.queue.front().map(|w| w.mode) else {
            return;
        };

        match front_mode {
            LockMode::Exclusive => {
                if st.readers > 0 || st.writer {
                    return;
                }
                let mut waiter = st.queue.pop_front().expect("front checked");
                match waiter.grant.take() {
                    Some(tx) => {
                        if tx.send(()).is_ok() {
                            st.writer = true;
                            return;
                        }
                        // Dead waiter; look at the next one.
                        continue;
                    }
                    // Dead waiter; look at the next one.
                    None => continue,
                }
            }
            LockMode::Shared => {
                if st.writer {
                    return;
                }
                let mut granted = 0;
                while st
                    .queue
                    .front()
                    .is_some_and(|w| w.mode == LockMode::Shared)
                {
                    let mut waiter = st.queue.pop_front().expect("front checked");
                    if let Some(tx) = waiter.grant.take() {
                        if tx.send(()).is_ok() {
                            st.readers += 1;
                            granted += 1;
                        }
                    }
                }
                if granted > 0 {
                    return;
                }
                // The whole run was dead; the head is now exclusive or the
                // queue is empty.
            }
        }
    }
}

/// Removes an abandoned waiter when the acquiring future is dropped before a
/// grant arrives (transport cancellation).
struct ParkedWaiter {
    inner: Arc<Inner>,
    lock: Arc<PathLock>,
    path: PathBuf,
    ordinal: u64,
    mode: LockMode,
    armed: bool,
}

impl Drop for ParkedWaiter {
    fn drop(&mut self) {
        if self.armed {
            self.inner
                .abandon_wait(&self.path, &self.lock, self.ordinal, self.mode);
        }
    }
}

/// Holder of a granted lock. Releases and promotes the queue on drop.
pub struct LockGuard {
    inner: Arc<Inner>,
    lock: Arc<PathLock>,
    path: PathBuf,
    mode: LockMode,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("released", &self.released)
            .finish()
    }
}

impl LockGuard {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release_holder(&self.path, &self.lock, self.mode);
        }
    }
}

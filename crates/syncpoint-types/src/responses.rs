//! Response envelopes for the syncpoint tools.
//!
//! Every response carries a `status` discriminator (`ok`, `contention`, or
//! `error`) and an ISO-8601 `timestamp`. Contention is a first-class outcome
//! with its own payload, not an error.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};

// ============================================================================
// Success payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadSuccess {
    pub path: String,
    pub content: String,
    pub encoding: String,
    /// Fingerprint over the full file bytes, regardless of offset/limit
    pub hash: String,
    pub total_lines: usize,
    pub offset: usize,
    pub limit: Option<usize>,
    pub lines_returned: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSuccess {
    pub path: String,
    pub hash: String,
    pub bytes_written: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSuccess {
    pub path: String,
    pub previous_hash: String,
    pub hash: String,
    pub bytes_written: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSuccess {
    pub path: String,
    pub deleted_hash: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameSuccess {
    pub old_path: String,
    pub new_path: String,
    pub hash: String,
    /// True when the rename fell back to copy-then-delete across filesystems
    #[serde(default)]
    pub cross_filesystem: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendSuccess {
    pub path: String,
    pub hash: String,
    pub bytes_appended: usize,
    pub total_size_bytes: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name; relative path for recursive listings
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size_bytes: Option<u64>,
    pub modified: Option<String>,
    /// Registry fingerprint when include_hashes was requested; null for
    /// untracked files and directories
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSuccess {
    pub path: String,
    pub entries: Vec<DirectoryEntry>,
    pub total_entries: usize,
    pub pattern: String,
    pub recursive: bool,
    pub timestamp: String,
}

// ============================================================================
// Error payload
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timestamp: String,
}

// ============================================================================
// Diff payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single change region in a structured diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// 1-based; old-side line number for removed/modified, new-side for added
    pub start_line: usize,
    /// Set only for multi-line regions
    pub end_line: Option<usize>,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub lines_added: usize,
    pub lines_removed: usize,
    pub lines_modified: usize,
    pub regions_changed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDiff {
    pub changes: Vec<DiffChange>,
    pub summary: DiffSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDiff {
    pub content: String,
    pub summary: DiffSummary,
}

/// Diff in the format the request asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Diff {
    Json(RegionDiff),
    Unified(UnifiedDiff),
}

impl Diff {
    pub fn summary(&self) -> &DiffSummary {
        match self {
            Diff::Json(d) => &d.summary,
            Diff::Unified(d) => &d.summary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictReason {
    /// old_string does not occur in the current content
    NotFound,
    /// old_string occurs more than once
    Ambiguous,
    /// old_string is still recognizable but its neighbourhood drifted
    ContextChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConflict {
    pub patch_index: usize,
    pub reason: ConflictReason,
}

/// Contention payload for update/delete/rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contention {
    pub path: String,
    pub expected_hash: String,
    pub current_hash: String,
    pub message: String,
    pub diff: Diff,
    /// Whether every submitted patch could still apply (patch-mode update only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches_applicable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<PatchConflict>>,
    /// Indices of patches that could still apply as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_conflicting_patches: Option<Vec<usize>>,
    pub timestamp: String,
}

// ============================================================================
// Status payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub uptime_seconds: f64,
    pub transport: String,
    pub persistence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveLocks {
    pub read: usize,
    pub write: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStatus {
    pub server: ServerInfo,
    pub tracked_files: usize,
    pub active_locks: ActiveLocks,
    pub queue_depth: usize,
    pub base_directories: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequestInfo {
    /// Waiter mode: "shared" or "exclusive"
    #[serde(rename = "type")]
    pub kind: String,
    pub queued_at: String,
    pub timeout_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
    pub hash: Option<String>,
    /// unlocked, read_locked, or write_locked
    pub lock_state: String,
    pub queue_depth: usize,
    pub active_readers: usize,
    pub pending_requests: Vec<PendingRequestInfo>,
    pub timestamp: String,
}

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReadOutcome {
    Ok(ReadSuccess),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WriteOutcome {
    Ok(WriteSuccess),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AppendOutcome {
    Ok(AppendSuccess),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ListOutcome {
    Ok(ListSuccess),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpdateOutcome {
    Ok(UpdateSuccess),
    Contention(Contention),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeleteOutcome {
    Ok(DeleteSuccess),
    Contention(Contention),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RenameOutcome {
    Ok(RenameSuccess),
    Contention(Contention),
    Error(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusOutcome {
    Ok(Box<StatusBody>),
    Error(ErrorBody),
}

/// Status responses come in a global and a per-path shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusBody {
    Global(GlobalStatus),
    File(FileStatus),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default)]
    pub contention: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReadResponse {
    pub status: String,
    pub results: Vec<ReadOutcome>,
    pub summary: BatchSummary,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWriteResponse {
    pub status: String,
    pub results: Vec<WriteOutcome>,
    pub summary: BatchSummary,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateResponse {
    pub status: String,
    pub results: Vec<UpdateOutcome>,
    pub summary: BatchSummary,
    pub timestamp: String,
}

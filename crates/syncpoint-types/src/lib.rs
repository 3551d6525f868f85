//! Shared types for the syncpoint coordination engine.
//!
//! This crate holds the request and response models for every tool, the
//! stable error codes, and the diff engine used for contention payloads.

pub mod diff;
pub mod error;
pub mod requests;
pub mod responses;

// Re-exports
pub use diff::{check_patches, compute_diff, PatchCheck};
pub use error::{ErrorCode, OpError};
pub use requests::{
    AppendRequest, BatchReadItem, BatchReadRequest, BatchUpdateItem, BatchUpdateRequest,
    BatchWriteItem, BatchWriteRequest, DeleteRequest, DiffFormat, ListRequest, Patch, ReadRequest,
    RenameRequest, StatusRequest, UpdateRequest, WriteRequest,
};
pub use responses::{
    ActiveLocks, AppendOutcome, AppendSuccess, BatchReadResponse, BatchSummary,
    BatchUpdateResponse, BatchWriteResponse, ChangeKind, ConflictReason, Contention,
    DeleteOutcome, DeleteSuccess, Diff, DiffChange, DiffSummary, DirectoryEntry, EntryKind,
    ErrorBody, FileStatus, ListOutcome,
    GlobalStatus, ListSuccess, PatchConflict, PendingRequestInfo, ReadOutcome, ReadSuccess,
    RegionDiff, RenameOutcome, RenameSuccess, ServerInfo, StatusBody, StatusOutcome, UnifiedDiff,
    UpdateOutcome, UpdateSuccess, WriteOutcome, WriteSuccess,
};

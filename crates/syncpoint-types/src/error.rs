//! Stable error codes and the operation error carried by error envelopes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error identifiers, serialized in kebab-case.
///
/// These are wire-level identifiers, not type names; agents match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Target path must exist and does not
    FileNotFound,
    /// Create-only operation found an existing file
    FileExists,
    /// Listing target is missing or not a directory
    DirNotFound,
    /// Canonical path falls outside all base directories
    PathOutsideBase,
    /// An access rule denied this operation kind here, or the OS refused
    AccessDenied,
    /// Empty, malformed, or non-resolvable path
    InvalidPath,
    /// Waiter's deadline elapsed before the lock was granted
    LockTimeout,
    /// Text codec failure
    EncodingError,
    /// A patch's old_string was not uniquely locatable at application time
    InvalidPatch,
    /// update received neither content nor patches, or both
    ContentOrPatchesRequired,
    /// File size exceeds the configured maximum
    FileTooLarge,
    /// OS-level failure during write
    WriteError,
    /// OS-level failure during delete
    DeleteError,
    /// OS-level failure during rename
    RenameError,
    /// Unclassified internal failure
    ServerError,
}

/// An operation failure: a stable code plus a human-readable message.
///
/// Operations return this through `Result`; the dispatch layer turns it into
/// an error envelope. Contention is not an error and never flows through here.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OpError {
    pub code: ErrorCode,
    pub message: String,
    /// Path the failure relates to, when there is one
    pub path: Option<String>,
}

impl OpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

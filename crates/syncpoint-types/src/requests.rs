//! Request models for the syncpoint tools.

use serde::{Deserialize, Serialize};

/// A single `old_string -> new_string` edit.
///
/// A patch applies iff `old_string` occurs exactly once in the content it is
/// applied to; the first (only) occurrence is replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub old_string: String,
    pub new_string: String,
}

/// Diff format requested for contention payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFormat {
    /// Structured change regions with context
    #[default]
    Json,
    /// Standard unified diff text
    Unified,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadRequest {
    pub path: String,
    /// Line offset to start reading from
    #[serde(default)]
    pub offset: usize,
    /// Maximum number of lines to return (None = all)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Overrides the configured default encoding
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
    /// Create parent directories if missing
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    /// Lock acquisition timeout in seconds (None = configured default)
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub path: String,
    pub expected_hash: String,
    /// Full replacement content (mutually exclusive with patches)
    #[serde(default)]
    pub content: Option<String>,
    /// Patches applied in order (mutually exclusive with content)
    #[serde(default)]
    pub patches: Option<Vec<Patch>>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub diff_format: DiffFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
    /// When set, mismatch yields a contention payload instead of deleting
    #[serde(default)]
    pub expected_hash: Option<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub diff_format: DiffFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameRequest {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub expected_hash: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub diff_format: DiffFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppendRequest {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub create_if_missing: bool,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    /// Inserted before content, skipped when the file is empty
    #[serde(default)]
    pub separator: String,
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListRequest {
    pub path: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub recursive: bool,
    /// Attach the registry's current fingerprint to tracked files
    #[serde(default)]
    pub include_hashes: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusRequest {
    /// None = global status, Some = per-path status
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReadItem {
    pub path: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchWriteItem {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchUpdateItem {
    pub path: String,
    pub expected_hash: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub patches: Option<Vec<Patch>>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReadRequest {
    pub files: Vec<BatchReadItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchWriteRequest {
    pub files: Vec<BatchWriteItem>,
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchUpdateRequest {
    pub files: Vec<BatchUpdateItem>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub diff_format: DiffFormat,
}

fn default_true() -> bool {
    true
}

fn default_pattern() -> String {
    "*".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_defaults() {
        let req: ReadRequest = serde_json::from_str(r#"{"path": "notes.txt"}"#).unwrap();
        assert_eq!(req.offset, 0);
        assert!(req.limit.is_none());
        assert!(req.encoding.is_none());
    }

    #[test]
    fn write_request_create_dirs_defaults_on() {
        let req: WriteRequest =
            serde_json::from_str(r#"{"path": "a/b.txt", "content": "x"}"#).unwrap();
        assert!(req.create_dirs);
        assert!(req.timeout.is_none());
    }

    #[test]
    fn update_request_parses_patches() {
        let req: UpdateRequest = serde_json::from_str(
            r#"{
                "path": "f.txt",
                "expected_hash": "sha256:abc",
                "patches": [{"old_string": "a", "new_string": "b"}],
                "diff_format": "unified"
            }"#,
        )
        .unwrap();
        assert!(req.content.is_none());
        assert_eq!(req.patches.as_ref().unwrap().len(), 1);
        assert_eq!(req.diff_format, DiffFormat::Unified);
    }

    #[test]
    fn list_request_default_pattern() {
        let req: ListRequest = serde_json::from_str(r#"{"path": "."}"#).unwrap();
        assert_eq!(req.pattern, "*");
        assert!(!req.recursive);
        assert!(!req.include_hashes);
    }
}

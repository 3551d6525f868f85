//! Directory listing with glob filtering. Read-family: no lock is taken and
//! the snapshot is best-effort.

use super::{error_body, timestamp, OpState};
use crate::path::OpKind;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use syncpoint_types::{
    DirectoryEntry, EntryKind, ErrorCode, ListOutcome, ListRequest, ListSuccess, OpError,
};

pub async fn list(state: &OpState, req: ListRequest) -> ListOutcome {
    match list_inner(state, req).await {
        Ok(success) => ListOutcome::Ok(success),
        Err(err) => ListOutcome::Error(error_body(err)),
    }
}

async fn list_inner(state: &OpState, req: ListRequest) -> Result<ListSuccess, OpError> {
    let path = state.validator.validate_operation(&req.path, OpKind::List)?;

    let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
        OpError::new(
            ErrorCode::DirNotFound,
            format!("directory not found: {}", req.path),
        )
        .with_path(&req.path)
    })?;
    if !metadata.is_dir() {
        return Err(OpError::new(
            ErrorCode::DirNotFound,
            format!("path is not a directory: {}", req.path),
        )
        .with_path(&req.path));
    }

    let pattern = glob::Pattern::new(&req.pattern).map_err(|e| {
        OpError::new(
            ErrorCode::InvalidPath,
            format!("invalid glob pattern '{}': {}", req.pattern, e),
        )
    })?;

    let mut entries = Vec::new();
    let mut stack: Vec<(PathBuf, String)> = vec![(path.clone(), String::new())];

    while let Some((dir, prefix)) = stack.pop() {
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            // Entries that vanish or deny access mid-walk are skipped.
            Err(_) => continue,
        };

        while let Ok(Some(dir_entry)) = reader.next_entry().await {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let display_name = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };

            let Ok(file_type) = dir_entry.file_type().await else {
                continue;
            };
            let entry_meta = dir_entry.metadata().await.ok();
            let modified = entry_meta
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

            if file_type.is_dir() {
                if req.recursive {
                    stack.push((dir_entry.path(), display_name.clone()));
                }
                if matches_pattern(&pattern, &req.pattern, &name) {
                    entries.push(DirectoryEntry {
                        name: display_name,
                        kind: EntryKind::Directory,
                        size_bytes: None,
                        modified,
                        hash: None,
                    });
                }
            } else if matches_pattern(&pattern, &req.pattern, &name) {
                let hash = if req.include_hashes {
                    lookup_hash(state, &dir_entry.path())
                } else {
                    None
                };
                entries.push(DirectoryEntry {
                    name: display_name,
                    kind: EntryKind::File,
                    size_bytes: entry_meta.as_ref().map(|m| m.len()),
                    modified,
                    hash,
                });
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ListSuccess {
        path: path.to_string_lossy().into_owned(),
        total_entries: entries.len(),
        entries,
        pattern: req.pattern,
        recursive: req.recursive,
        timestamp: timestamp(),
    })
}

fn matches_pattern(pattern: &glob::Pattern, raw: &str, name: &str) -> bool {
    raw == "*" || pattern.matches(name)
}

/// Hashes come from the registry as-is; listing does not refresh fingerprints.
fn lookup_hash(state: &OpState, path: &Path) -> Option<String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    state.registry.get(&canonical)
}

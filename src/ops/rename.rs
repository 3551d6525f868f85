//! Rename under two exclusive locks taken in sorted order.

use super::{acquire_two_exclusive, error_body, timestamp, OpState};
use crate::io;
use crate::path::OpKind;
use syncpoint_types::diff::compute_diff;
use syncpoint_types::{Contention, ErrorCode, OpError, RenameOutcome, RenameRequest, RenameSuccess};
use syncpoint_watcher::{compute_file_hash, compute_hash, HashError};
use tokio_util::sync::CancellationToken;

pub async fn rename(
    state: &OpState,
    req: RenameRequest,
    cancel: &CancellationToken,
) -> RenameOutcome {
    match rename_inner(state, req, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => RenameOutcome::Error(error_body(err)),
    }
}

async fn rename_inner(
    state: &OpState,
    req: RenameRequest,
    cancel: &CancellationToken,
) -> Result<RenameOutcome, OpError> {
    let old_path = state
        .validator
        .validate_operation(&req.old_path, OpKind::RenameSrc)?;
    let new_path = state
        .validator
        .validate_operation(&req.new_path, OpKind::RenameDst)?;

    if old_path == new_path {
        return Err(OpError::new(
            ErrorCode::InvalidPath,
            "source and destination resolve to the same path",
        )
        .with_path(&req.old_path));
    }

    if !old_path.exists() {
        return Err(OpError::new(
            ErrorCode::FileNotFound,
            format!("source file not found: {}", req.old_path),
        )
        .with_path(&req.old_path));
    }

    if !req.overwrite && new_path.exists() {
        return Err(destination_exists(&req.new_path));
    }

    let timeout = state.settings.crud.effective_timeout(req.timeout);
    let (_old_guard, _new_guard) =
        acquire_two_exclusive(state, &old_path, &new_path, timeout, cancel).await?;

    // Re-check under the locks: a concurrent rename may have claimed the
    // destination between validation and grant.
    if !req.overwrite && new_path.exists() {
        return Err(destination_exists(&req.new_path));
    }
    if !old_path.exists() {
        return Err(OpError::new(
            ErrorCode::FileNotFound,
            format!("source file not found: {}", req.old_path),
        )
        .with_path(&req.old_path));
    }

    if let Some(expected_hash) = &req.expected_hash {
        let current_bytes =
            io::read_file_bytes(&old_path, state.settings.crud.max_file_size_bytes).await?;
        let current_hash = compute_hash(&current_bytes);

        if &current_hash != expected_hash {
            let current_content = String::from_utf8_lossy(&current_bytes).into_owned();
            state
                .versions
                .record(&old_path, &current_hash, &current_content);
            let expected_content = state
                .versions
                .lookup(&old_path, expected_hash)
                .unwrap_or_default();
            let diff = compute_diff(
                &expected_content,
                &current_content,
                req.diff_format,
                state.settings.crud.diff_context_lines,
            );

            return Ok(RenameOutcome::Contention(Contention {
                path: old_path.to_string_lossy().into_owned(),
                expected_hash: expected_hash.clone(),
                current_hash,
                message: format!(
                    "file has been modified (expected hash {}, current hash differs)",
                    expected_hash
                ),
                diff,
                patches_applicable: None,
                conflicts: None,
                non_conflicting_patches: None,
                timestamp: timestamp(),
            }));
        }
    }

    if req.create_dirs {
        if let Some(parent) = new_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OpError::new(
                    ErrorCode::RenameError,
                    format!("failed to create parent directories: {}", e),
                )
                .with_path(&req.new_path)
            })?;
        }
    }

    let cross_filesystem = io::safe_rename(&old_path, &new_path).await.map_err(|e| {
        OpError::new(
            ErrorCode::RenameError,
            format!("failed to rename file: {}", e),
        )
        .with_path(&req.old_path)
    })?;

    let hash = compute_file_hash(&new_path, state.settings.crud.max_file_size_bytes)
        .await
        .map_err(|e| match e {
            HashError::TooLarge { size, max } => OpError::new(
                ErrorCode::FileTooLarge,
                format!("file size {} exceeds maximum {} bytes", size, max),
            ),
            HashError::Io(e) => OpError::new(
                ErrorCode::ServerError,
                format!("failed to hash renamed file: {}", e),
            ),
        })?;

    // Move the registry entry and cached versions to the new key.
    state.registry.rename(&old_path, &new_path);
    state.versions.rename(&old_path, &new_path);
    state.publish(&new_path, &hash, None);

    Ok(RenameOutcome::Ok(RenameSuccess {
        old_path: old_path.to_string_lossy().into_owned(),
        new_path: new_path.to_string_lossy().into_owned(),
        hash,
        cross_filesystem,
        timestamp: timestamp(),
    }))
}

fn destination_exists(path: &str) -> OpError {
    OpError::new(
        ErrorCode::FileExists,
        format!("destination file already exists: {}", path),
    )
    .with_path(path)
}

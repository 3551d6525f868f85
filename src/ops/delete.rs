//! Delete with optional hash-guarded contention detection.

use super::{acquire_exclusive, error_body, timestamp, OpState};
use crate::io;
use crate::path::OpKind;
use syncpoint_types::diff::compute_diff;
use syncpoint_types::{Contention, DeleteOutcome, DeleteRequest, DeleteSuccess, ErrorCode, OpError};
use syncpoint_watcher::compute_hash;
use tokio_util::sync::CancellationToken;

pub async fn delete(
    state: &OpState,
    req: DeleteRequest,
    cancel: &CancellationToken,
) -> DeleteOutcome {
    match delete_inner(state, req, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => DeleteOutcome::Error(error_body(err)),
    }
}

async fn delete_inner(
    state: &OpState,
    req: DeleteRequest,
    cancel: &CancellationToken,
) -> Result<DeleteOutcome, OpError> {
    let path = state.validator.validate_operation(&req.path, OpKind::Delete)?;

    if !path.exists() {
        return Err(
            OpError::new(ErrorCode::FileNotFound, format!("file not found: {}", req.path))
                .with_path(&req.path),
        );
    }

    let timeout = state.settings.crud.effective_timeout(req.timeout);
    let _guard = acquire_exclusive(state, &path, timeout, cancel).await?;

    let current_bytes =
        io::read_file_bytes(&path, state.settings.crud.max_file_size_bytes).await?;
    let current_hash = compute_hash(&current_bytes);

    if let Some(expected_hash) = &req.expected_hash {
        if &current_hash != expected_hash {
            let current_content = String::from_utf8_lossy(&current_bytes).into_owned();
            state.versions.record(&path, &current_hash, &current_content);

            // Diff against the version the agent read when it is still
            // cached; an empty expected side otherwise.
            let expected_content = state
                .versions
                .lookup(&path, expected_hash)
                .unwrap_or_default();
            let diff = compute_diff(
                &expected_content,
                &current_content,
                req.diff_format,
                state.settings.crud.diff_context_lines,
            );

            return Ok(DeleteOutcome::Contention(Contention {
                path: path.to_string_lossy().into_owned(),
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

    tokio::fs::remove_file(&path).await.map_err(|e| {
        OpError::new(
            ErrorCode::DeleteError,
            format!("failed to delete file: {}", e),
        )
        .with_path(&req.path)
    })?;

    state.forget(&path);

    Ok(DeleteOutcome::Ok(DeleteSuccess {
        path: path.to_string_lossy().into_owned(),
        deleted_hash: current_hash,
        timestamp: timestamp(),
    }))
}

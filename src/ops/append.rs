//! Append under an exclusive lock.
//!
//! Appends carry no contention check: they are commutative at the protocol
//! level, and agents that need ordering guarantees use `update`. The whole
//! file is re-hashed after the write; appends are not a hot path.

use super::{acquire_exclusive, error_body, timestamp, OpState};
use crate::io;
use crate::path::OpKind;
use syncpoint_types::{AppendOutcome, AppendRequest, AppendSuccess, ErrorCode, OpError};
use syncpoint_watcher::compute_hash;
use tokio_util::sync::CancellationToken;

pub async fn append(
    state: &OpState,
    req: AppendRequest,
    cancel: &CancellationToken,
) -> AppendOutcome {
    match append_inner(state, req, cancel).await {
        Ok(success) => AppendOutcome::Ok(success),
        Err(err) => AppendOutcome::Error(error_body(err)),
    }
}

async fn append_inner(
    state: &OpState,
    req: AppendRequest,
    cancel: &CancellationToken,
) -> Result<AppendSuccess, OpError> {
    let path = state.validator.validate_operation(&req.path, OpKind::Append)?;

    if !path.exists() && !req.create_if_missing {
        return Err(
            OpError::new(ErrorCode::FileNotFound, format!("file not found: {}", req.path))
                .with_path(&req.path),
        );
    }

    let timeout = state.settings.crud.effective_timeout(req.timeout);
    let _guard = acquire_exclusive(state, &path, timeout, cancel).await?;

    if !path.exists() {
        if req.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    OpError::new(
                        ErrorCode::WriteError,
                        format!("failed to create parent directories: {}", e),
                    )
                    .with_path(&req.path)
                })?;
            }
        }
        io::create_empty(&path).await.map_err(|e| {
            OpError::new(
                ErrorCode::WriteError,
                format!("failed to create file: {}", e),
            )
            .with_path(&req.path)
        })?;
    }

    let size_before = tokio::fs::metadata(&path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    // Separator is skipped on an empty file so the first append starts clean.
    let payload = if size_before == 0 || req.separator.is_empty() {
        req.content.clone()
    } else {
        format!("{}{}", req.separator, req.content)
    };

    let encoding = state
        .settings
        .crud
        .effective_encoding(req.encoding.as_deref());
    let encoded = io::encode(&payload, encoding)?;
    let bytes_appended = encoded.len();

    if size_before + bytes_appended as u64 > state.settings.crud.max_file_size_bytes {
        return Err(OpError::new(
            ErrorCode::FileTooLarge,
            format!(
                "append would grow file past maximum {} bytes",
                state.settings.crud.max_file_size_bytes
            ),
        )
        .with_path(&req.path));
    }

    io::append_bytes(&path, encoded).await.map_err(|e| {
        OpError::new(
            ErrorCode::WriteError,
            format!("failed to append to file: {}", e),
        )
        .with_path(&req.path)
    })?;

    let full_bytes = io::read_file_bytes(&path, state.settings.crud.max_file_size_bytes).await?;
    let total_size_bytes = full_bytes.len();
    let hash = compute_hash(&full_bytes);

    let content = String::from_utf8(full_bytes).ok();
    state.publish(&path, &hash, content.as_deref());

    Ok(AppendSuccess {
        path: path.to_string_lossy().into_owned(),
        hash,
        bytes_appended,
        total_size_bytes,
        timestamp: timestamp(),
    })
}

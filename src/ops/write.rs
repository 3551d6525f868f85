//! Create-only atomic write.

use super::{acquire_exclusive, error_body, timestamp, OpState};
use crate::io;
use crate::path::OpKind;
use syncpoint_types::{ErrorCode, OpError, WriteOutcome, WriteRequest, WriteSuccess};
use syncpoint_watcher::compute_hash;
use tokio_util::sync::CancellationToken;

pub async fn write(state: &OpState, req: WriteRequest, cancel: &CancellationToken) -> WriteOutcome {
    match write_inner(state, req, cancel).await {
        Ok(success) => WriteOutcome::Ok(success),
        Err(err) => WriteOutcome::Error(error_body(err)),
    }
}

async fn write_inner(
    state: &OpState,
    req: WriteRequest,
    cancel: &CancellationToken,
) -> Result<WriteSuccess, OpError> {
    let path = state.validator.validate_operation(&req.path, OpKind::Write)?;

    if path.exists() {
        return Err(file_exists(&req.path));
    }

    let timeout = state.settings.crud.effective_timeout(req.timeout);
    let _guard = acquire_exclusive(state, &path, timeout, cancel).await?;

    // Re-check under the lock: another writer may have won the race.
    if path.exists() {
        return Err(file_exists(&req.path));
    }

    let encoding = state
        .settings
        .crud
        .effective_encoding(req.encoding.as_deref());
    let encoded = io::encode(&req.content, encoding)?;

    if encoded.len() as u64 > state.settings.crud.max_file_size_bytes {
        return Err(OpError::new(
            ErrorCode::FileTooLarge,
            format!(
                "content size {} exceeds maximum {} bytes",
                encoded.len(),
                state.settings.crud.max_file_size_bytes
            ),
        )
        .with_path(&req.path));
    }

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

    let bytes_written = encoded.len();
    io::atomic_write(&path, encoded).await.map_err(|e| {
        OpError::new(ErrorCode::WriteError, format!("failed to write file: {}", e))
            .with_path(&req.path)
    })?;

    let hash = compute_hash(req.content.as_bytes());
    state.publish(&path, &hash, Some(&req.content));

    Ok(WriteSuccess {
        path: path.to_string_lossy().into_owned(),
        hash,
        bytes_written,
        timestamp: timestamp(),
    })
}

fn file_exists(path: &str) -> OpError {
    OpError::new(
        ErrorCode::FileExists,
        format!("file already exists: {}", path),
    )
    .with_path(path)
}

//! Shared-lock file read with offset/limit windowing.

use super::{acquire_shared, error_body, timestamp, OpState};
use crate::io;
use crate::path::OpKind;
use syncpoint_types::{ErrorCode, OpError, ReadOutcome, ReadRequest, ReadSuccess};
use syncpoint_watcher::compute_hash;
use tokio_util::sync::CancellationToken;

pub async fn read(state: &OpState, req: ReadRequest, cancel: &CancellationToken) -> ReadOutcome {
    match read_inner(state, req, cancel).await {
        Ok(success) => ReadOutcome::Ok(success),
        Err(err) => ReadOutcome::Error(error_body(err)),
    }
}

async fn read_inner(
    state: &OpState,
    req: ReadRequest,
    cancel: &CancellationToken,
) -> Result<ReadSuccess, OpError> {
    let path = state.validator.validate_operation(&req.path, OpKind::Read)?;

    if !path.exists() {
        return Err(
            OpError::new(ErrorCode::FileNotFound, format!("file not found: {}", req.path))
                .with_path(&req.path),
        );
    }

    let timeout = state.settings.crud.effective_timeout(None);
    let _guard = acquire_shared(state, &path, timeout, cancel).await?;

    let bytes = io::read_file_bytes(&path, state.settings.crud.max_file_size_bytes).await?;
    let hash = compute_hash(&bytes);

    let encoding = state
        .settings
        .crud
        .effective_encoding(req.encoding.as_deref())
        .to_string();
    let content = io::decode(bytes, &encoding)?;

    // First successful read registers the file and seeds the version cache
    // so a later contention can diff against this exact version.
    state.publish(&path, &hash, Some(&content));

    // The fingerprint always covers the whole file; only the returned slice
    // honors the window.
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let total_lines = lines.len();
    let window: &[&str] = if req.offset >= total_lines {
        &[]
    } else {
        match req.limit {
            Some(limit) => &lines[req.offset..(req.offset + limit).min(total_lines)],
            None => &lines[req.offset..],
        }
    };
    let lines_returned = window.len();
    let sliced = window.concat();

    Ok(ReadSuccess {
        path: path.to_string_lossy().into_owned(),
        content: sliced,
        encoding,
        hash,
        total_lines,
        offset: req.offset,
        limit: req.limit,
        lines_returned,
        timestamp: timestamp(),
    })
}

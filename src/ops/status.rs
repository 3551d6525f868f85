//! Global and per-path status/introspection.

use super::{error_body, timestamp, OpState};
use crate::path::OpKind;
use syncpoint_types::responses::StatusBody;
use syncpoint_types::{
    ActiveLocks, FileStatus, GlobalStatus, OpError, PendingRequestInfo, ServerInfo, StatusOutcome,
    StatusRequest,
};

pub async fn status(state: &OpState, req: StatusRequest) -> StatusOutcome {
    match status_inner(state, req).await {
        Ok(body) => StatusOutcome::Ok(Box::new(body)),
        Err(err) => StatusOutcome::Error(error_body(err)),
    }
}

async fn status_inner(state: &OpState, req: StatusRequest) -> Result<StatusBody, OpError> {
    let Some(raw_path) = req.path else {
        return Ok(StatusBody::Global(global_status(state)));
    };

    let path = state.validator.validate_operation(&raw_path, OpKind::Status)?;
    let exists = path.exists();
    let hash = exists.then(|| state.registry.get(&path)).flatten();

    let lock_status = state.locks.status(&path);
    let lock_state = if lock_status.active_writer {
        "write_locked"
    } else if lock_status.active_readers > 0 {
        "read_locked"
    } else {
        "unlocked"
    };

    Ok(StatusBody::File(FileStatus {
        path: path.to_string_lossy().into_owned(),
        exists,
        hash,
        lock_state: lock_state.to_string(),
        queue_depth: lock_status.queued,
        active_readers: lock_status.active_readers,
        pending_requests: lock_status
            .pending
            .iter()
            .map(|w| PendingRequestInfo {
                kind: w.mode.to_string(),
                queued_at: w.queued_at.to_rfc3339(),
                timeout_at: w.deadline.to_rfc3339(),
            })
            .collect(),
        timestamp: timestamp(),
    }))
}

fn global_status(state: &OpState) -> GlobalStatus {
    let all = state.locks.all_status();
    let mut read = 0;
    let mut write = 0;
    let mut queue_depth = 0;
    for lock in &all {
        read += lock.active_readers;
        if lock.active_writer {
            write += 1;
        }
        queue_depth += lock.queued;
    }

    GlobalStatus {
        server: ServerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs_f64(),
            transport: state.transport.clone(),
            persistence: if state.settings.persistence.enabled {
                "enabled".to_string()
            } else {
                "disabled".to_string()
            },
        },
        tracked_files: state.registry.len(),
        active_locks: ActiveLocks { read, write },
        queue_depth,
        base_directories: state
            .validator
            .base_directories()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        timestamp: timestamp(),
    }
}

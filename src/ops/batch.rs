//! Batch variants: sequential, never transactional.
//!
//! Items are processed in order, each acquiring its own lock. Earlier
//! successes are not rolled back when a later item fails; the response always
//! carries the full per-item result vector plus a summary.

use super::{timestamp, OpState};
use syncpoint_types::{
    BatchReadRequest, BatchReadResponse, BatchSummary, BatchUpdateRequest, BatchUpdateResponse,
    BatchWriteRequest, BatchWriteResponse, ReadOutcome, ReadRequest, UpdateOutcome, UpdateRequest,
    WriteOutcome, WriteRequest,
};
use tokio_util::sync::CancellationToken;

pub async fn batch_read(
    state: &OpState,
    req: BatchReadRequest,
    cancel: &CancellationToken,
) -> BatchReadResponse {
    let total = req.files.len();
    let mut results = Vec::with_capacity(total);
    let mut succeeded = 0;

    for item in req.files {
        let outcome = super::read::read(
            state,
            ReadRequest {
                path: item.path,
                offset: item.offset,
                limit: item.limit,
                encoding: item.encoding,
            },
            cancel,
        )
        .await;
        if matches!(outcome, ReadOutcome::Ok(_)) {
            succeeded += 1;
        }
        results.push(outcome);
    }

    BatchReadResponse {
        status: "ok".to_string(),
        results,
        summary: BatchSummary {
            total,
            succeeded,
            failed: total - succeeded,
            contention: 0,
        },
        timestamp: timestamp(),
    }
}

pub async fn batch_write(
    state: &OpState,
    req: BatchWriteRequest,
    cancel: &CancellationToken,
) -> BatchWriteResponse {
    let total = req.files.len();
    let mut results = Vec::with_capacity(total);
    let mut succeeded = 0;

    for item in req.files {
        let outcome = super::write::write(
            state,
            WriteRequest {
                path: item.path,
                content: item.content,
                encoding: item.encoding,
                create_dirs: item.create_dirs,
                timeout: req.timeout,
            },
            cancel,
        )
        .await;
        if matches!(outcome, WriteOutcome::Ok(_)) {
            succeeded += 1;
        }
        results.push(outcome);
    }

    BatchWriteResponse {
        status: "ok".to_string(),
        results,
        summary: BatchSummary {
            total,
            succeeded,
            failed: total - succeeded,
            contention: 0,
        },
        timestamp: timestamp(),
    }
}

pub async fn batch_update(
    state: &OpState,
    req: BatchUpdateRequest,
    cancel: &CancellationToken,
) -> BatchUpdateResponse {
    let total = req.files.len();
    let mut results = Vec::with_capacity(total);
    let mut succeeded = 0;
    let mut contention = 0;
    let mut failed = 0;

    for item in req.files {
        let outcome = super::update::update(
            state,
            UpdateRequest {
                path: item.path,
                expected_hash: item.expected_hash,
                content: item.content,
                patches: item.patches,
                encoding: item.encoding,
                timeout: req.timeout,
                diff_format: req.diff_format,
            },
            cancel,
        )
        .await;
        match &outcome {
            UpdateOutcome::Ok(_) => succeeded += 1,
            UpdateOutcome::Contention(_) => contention += 1,
            UpdateOutcome::Error(_) => failed += 1,
        }
        results.push(outcome);
    }

    BatchUpdateResponse {
        status: "ok".to_string(),
        results,
        summary: BatchSummary {
            total,
            succeeded,
            failed,
            contention,
        },
        timestamp: timestamp(),
    }
}

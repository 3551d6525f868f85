//! Hash-guarded update with diff-based contention resolution.
//!
//! The fingerprint on disk is recomputed under the exclusive lock and
//! compared to the agent's `expected_hash`. On mismatch nothing is written;
//! the response carries a diff of what changed plus, for patch submissions, a
//! per-patch applicability report, so the agent can re-craft its edit without
//! re-reading the whole file.

use super::{acquire_exclusive, error_body, timestamp, OpState};
use crate::io;
use crate::path::OpKind;
use syncpoint_types::diff::{check_patches, compute_diff};
use syncpoint_types::{
    Contention, ErrorCode, OpError, Patch, UpdateOutcome, UpdateRequest, UpdateSuccess,
};
use syncpoint_watcher::compute_hash;
use tokio_util::sync::CancellationToken;

pub async fn update(
    state: &OpState,
    req: UpdateRequest,
    cancel: &CancellationToken,
) -> UpdateOutcome {
    match update_inner(state, req, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => UpdateOutcome::Error(error_body(err)),
    }
}

async fn update_inner(
    state: &OpState,
    req: UpdateRequest,
    cancel: &CancellationToken,
) -> Result<UpdateOutcome, OpError> {
    if req.content.is_some() == req.patches.is_some() {
        return Err(OpError::new(
            ErrorCode::ContentOrPatchesRequired,
            "exactly one of content or patches must be provided",
        )
        .with_path(&req.path));
    }

    let path = state.validator.validate_operation(&req.path, OpKind::Update)?;

    if !path.exists() {
        return Err(
            OpError::new(ErrorCode::FileNotFound, format!("file not found: {}", req.path))
                .with_path(&req.path),
        );
    }

    let timeout = state.settings.crud.effective_timeout(req.timeout);
    let _guard = acquire_exclusive(state, &path, timeout, cancel).await?;

    // The registry is not trusted here: recompute from the bytes on disk.
    let current_bytes =
        io::read_file_bytes(&path, state.settings.crud.max_file_size_bytes).await?;
    let current_hash = compute_hash(&current_bytes);

    let encoding = state
        .settings
        .crud
        .effective_encoding(req.encoding.as_deref())
        .to_string();

    if current_hash != req.expected_hash {
        let current_content = io::decode(current_bytes, &encoding)?;
        // Keep this version findable for diffs in later contentions.
        state.versions.record(&path, &current_hash, &current_content);

        let context = state.settings.crud.diff_context_lines;
        let expected_content = state.versions.lookup(&path, &req.expected_hash);

        let (diff, patches_applicable, conflicts, non_conflicting) = match (&req.content, &req.patches)
        {
            (Some(content), _) => {
                // The version the agent read when cached, otherwise the
                // content it meant to write.
                let expected = expected_content.as_deref().unwrap_or(content.as_str());
                (
                    compute_diff(expected, &current_content, req.diff_format, context),
                    None,
                    None,
                    None,
                )
            }
            (None, Some(patches)) => {
                let check = check_patches(&current_content, patches);
                let expected = expected_content.as_deref().unwrap_or(check.applied.as_str());
                (
                    compute_diff(expected, &current_content, req.diff_format, context),
                    Some(check.all_applicable),
                    (!check.conflicts.is_empty()).then_some(check.conflicts.clone()),
                    (!check.non_conflicting.is_empty()).then_some(check.non_conflicting.clone()),
                )
            }
            (None, None) => unreachable!("validated above"),
        };

        return Ok(UpdateOutcome::Contention(Contention {
            path: path.to_string_lossy().into_owned(),
            expected_hash: req.expected_hash.clone(),
            current_hash: current_hash.clone(),
            message: format!(
                "file has been modified since {}",
                truncate_hash(&req.expected_hash)
            ),
            diff,
            patches_applicable,
            conflicts,
            non_conflicting_patches: non_conflicting,
            timestamp: timestamp(),
        }));
    }

    // Hash matches: apply.
    let previous_hash = current_hash;
    let previous_content = io::decode(current_bytes, &encoding)?;

    let new_content = match (&req.content, &req.patches) {
        (Some(content), _) => content.clone(),
        (None, Some(patches)) => apply_patches(&previous_content, patches, &req.path)?,
        (None, None) => unreachable!("validated above"),
    };

    let encoded = io::encode(&new_content, &encoding)?;
    if encoded.len() as u64 > state.settings.crud.max_file_size_bytes {
        return Err(OpError::new(
            ErrorCode::FileTooLarge,
            format!(
                "updated content size {} exceeds maximum {} bytes",
                encoded.len(),
                state.settings.crud.max_file_size_bytes
            ),
        )
        .with_path(&req.path));
    }

    let bytes_written = encoded.len();
    io::atomic_write(&path, encoded).await.map_err(|e| {
        OpError::new(ErrorCode::WriteError, format!("failed to write file: {}", e))
            .with_path(&req.path)
    })?;

    let new_hash = compute_hash(new_content.as_bytes());
    // Keep the replaced version around so agents still holding its hash get
    // an exact diff, then publish the new one.
    state.versions.record(&path, &previous_hash, &previous_content);
    state.publish(&path, &new_hash, Some(&new_content));

    Ok(UpdateOutcome::Ok(UpdateSuccess {
        path: path.to_string_lossy().into_owned(),
        previous_hash,
        hash: new_hash,
        bytes_written,
        timestamp: timestamp(),
    }))
}

/// Apply patches in submitted order. Each patch must be uniquely locatable in
/// the content as already modified by its predecessors.
fn apply_patches(content: &str, patches: &[Patch], path: &str) -> Result<String, OpError> {
    let mut result = content.to_string();
    for (idx, patch) in patches.iter().enumerate() {
        let occurrences = if patch.old_string.is_empty() {
            usize::MAX
        } else {
            result.matches(patch.old_string.as_str()).count()
        };
        match occurrences {
            1 => {
                result = result.replacen(patch.old_string.as_str(), &patch.new_string, 1);
            }
            0 => {
                return Err(OpError::new(
                    ErrorCode::InvalidPatch,
                    format!(
                        "patch {}: old_string not found in file content: {}",
                        idx,
                        snippet(&patch.old_string)
                    ),
                )
                .with_path(path));
            }
            _ => {
                return Err(OpError::new(
                    ErrorCode::InvalidPatch,
                    format!(
                        "patch {}: old_string matches more than once: {}",
                        idx,
                        snippet(&patch.old_string)
                    ),
                )
                .with_path(path));
            }
        }
    }
    Ok(result)
}

fn snippet(s: &str) -> String {
    let mut out: String = s.chars().take(50).collect();
    if s.chars().count() > 50 {
        out.push_str("...");
    }
    out
}

fn truncate_hash(hash: &str) -> String {
    if hash.len() > 16 {
        format!("{}...", &hash[..16])
    } else {
        hash.to_string()
    }
}

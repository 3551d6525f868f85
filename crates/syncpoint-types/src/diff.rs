//! Diff engine for contention payloads and patch applicability.
//!
//! Files are treated as line sequences here; bytes are only used for hashing.
//! Structured diffs report change regions with surrounding context, unified
//! diffs are standard git-style text. Both carry the same summary shape.

use crate::requests::{DiffFormat, Patch};
use crate::responses::{
    ChangeKind, ConflictReason, Diff, DiffChange, DiffSummary, PatchConflict, RegionDiff,
    UnifiedDiff,
};
use similar::{DiffTag, TextDiff};

/// Compute a diff between the expected and current version of a file.
pub fn compute_diff(
    expected: &str,
    current: &str,
    format: DiffFormat,
    context_lines: usize,
) -> Diff {
    match format {
        DiffFormat::Json => Diff::Json(compute_region_diff(expected, current, context_lines)),
        DiffFormat::Unified => {
            Diff::Unified(compute_unified_diff(expected, current, context_lines))
        }
    }
}

/// Structured diff: ordered change regions tagged added/removed/modified,
/// with 1-based line numbers and up to `context_lines` of context either side.
pub fn compute_region_diff(expected: &str, current: &str, context_lines: usize) -> RegionDiff {
    let old_lines: Vec<&str> = expected.lines().collect();
    let new_lines: Vec<&str> = current.lines().collect();

    let text_diff = TextDiff::from_lines(expected, current);
    let ops: Vec<(DiffTag, std::ops::Range<usize>, std::ops::Range<usize>)> = text_diff
        .ops()
        .iter()
        .map(|op| op.as_tag_tuple())
        .collect();

    let mut changes = Vec::new();
    let mut lines_added = 0;
    let mut lines_removed = 0;
    let mut lines_modified = 0;

    for (idx, (tag, old_range, new_range)) in ops.iter().enumerate() {
        if *tag == DiffTag::Equal {
            continue;
        }

        // Context comes from the adjacent equal runs on the old side.
        let context_before = idx.checked_sub(1).and_then(|prev| {
            let (prev_tag, prev_old, _) = &ops[prev];
            if *prev_tag != DiffTag::Equal {
                return None;
            }
            let start = prev_old.end.saturating_sub(context_lines).max(prev_old.start);
            if start < prev_old.end {
                Some(old_lines[start..prev_old.end].join("\n"))
            } else {
                None
            }
        });
        let context_after = ops.get(idx + 1).and_then(|(next_tag, next_old, _)| {
            if *next_tag != DiffTag::Equal {
                return None;
            }
            let end = (next_old.start + context_lines).min(next_old.end);
            if next_old.start < end {
                Some(old_lines[next_old.start..end].join("\n"))
            } else {
                None
            }
        });

        let (i1, i2) = (old_range.start, old_range.end);
        let (j1, j2) = (new_range.start, new_range.end);

        match tag {
            DiffTag::Insert => {
                changes.push(DiffChange {
                    kind: ChangeKind::Added,
                    start_line: j1 + 1,
                    end_line: (j2 > j1 + 1).then_some(j2),
                    old_content: None,
                    new_content: Some(new_lines[j1..j2].join("\n")),
                    context_before,
                    context_after,
                });
                lines_added += j2 - j1;
            }
            DiffTag::Delete => {
                changes.push(DiffChange {
                    kind: ChangeKind::Removed,
                    start_line: i1 + 1,
                    end_line: (i2 > i1 + 1).then_some(i2),
                    old_content: Some(old_lines[i1..i2].join("\n")),
                    new_content: None,
                    context_before,
                    context_after,
                });
                lines_removed += i2 - i1;
            }
            DiffTag::Replace => {
                changes.push(DiffChange {
                    kind: ChangeKind::Modified,
                    start_line: i1 + 1,
                    end_line: (i2 > i1 + 1).then_some(i2),
                    old_content: Some(old_lines[i1..i2].join("\n")),
                    new_content: Some(new_lines[j1..j2].join("\n")),
                    context_before,
                    context_after,
                });
                lines_modified += (i2 - i1).max(j2 - j1);
            }
            DiffTag::Equal => unreachable!(),
        }
    }

    let summary = DiffSummary {
        lines_added,
        lines_removed,
        lines_modified,
        regions_changed: changes.len(),
    };

    RegionDiff { changes, summary }
}

/// Standard unified diff text between the two versions.
pub fn compute_unified_diff(expected: &str, current: &str, context_lines: usize) -> UnifiedDiff {
    let text_diff = TextDiff::from_lines(expected, current);
    let content = text_diff
        .unified_diff()
        .context_radius(context_lines)
        .header("expected", "current")
        .to_string();

    let mut lines_added = 0;
    let mut lines_removed = 0;
    let mut regions_changed = 0;

    for line in content.lines() {
        if line.starts_with("@@") {
            regions_changed += 1;
        } else if line.starts_with('+') && !line.starts_with("+++") {
            lines_added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            lines_removed += 1;
        }
    }

    // Paired adds/removes count as modifications.
    let lines_modified = lines_added.min(lines_removed);
    lines_added -= lines_modified;
    lines_removed -= lines_modified;

    UnifiedDiff {
        content,
        summary: DiffSummary {
            lines_added,
            lines_removed,
            lines_modified,
            regions_changed,
        },
    }
}

/// Result of checking a patch list against the current file content.
#[derive(Debug)]
pub struct PatchCheck {
    /// True iff every patch is still uniquely locatable
    pub all_applicable: bool,
    pub conflicts: Vec<PatchConflict>,
    /// Indices of patches that could still apply as-is
    pub non_conflicting: Vec<usize>,
    /// Content produced by applying the non-conflicting patches in order
    pub applied: String,
}

/// Check which patches can still apply against `current`.
///
/// A patch is applicable iff its `old_string` occurs exactly once in the
/// content as modified by the preceding applicable patches. Zero matches is
/// `not-found` (or `context-changed` when the text is still recognizable
/// modulo indentation drift); multiple matches is `ambiguous`.
pub fn check_patches(current: &str, patches: &[Patch]) -> PatchCheck {
    let mut applied = current.to_string();
    let mut conflicts = Vec::new();
    let mut non_conflicting = Vec::new();

    for (idx, patch) in patches.iter().enumerate() {
        if patch.old_string.is_empty() {
            conflicts.push(PatchConflict {
                patch_index: idx,
                reason: ConflictReason::Ambiguous,
            });
            continue;
        }

        match applied.matches(patch.old_string.as_str()).count() {
            1 => {
                applied = applied.replacen(patch.old_string.as_str(), &patch.new_string, 1);
                non_conflicting.push(idx);
            }
            0 => {
                let reason = if loose_contains(&applied, &patch.old_string) {
                    ConflictReason::ContextChanged
                } else {
                    ConflictReason::NotFound
                };
                conflicts.push(PatchConflict {
                    patch_index: idx,
                    reason,
                });
            }
            _ => {
                conflicts.push(PatchConflict {
                    patch_index: idx,
                    reason: ConflictReason::Ambiguous,
                });
            }
        }
    }

    PatchCheck {
        all_applicable: conflicts.is_empty(),
        conflicts,
        non_conflicting,
        applied,
    }
}

/// Whitespace-insensitive containment: the needle's lines, trimmed, appear as
/// a contiguous trimmed-line run in the haystack.
fn loose_contains(haystack: &str, needle: &str) -> bool {
    let needle_norm: Vec<&str> = needle.lines().map(str::trim).collect();
    if needle_norm.is_empty() || needle_norm.iter().all(|l| l.is_empty()) {
        return false;
    }
    let hay_norm: Vec<&str> = haystack.lines().map(str::trim).collect();
    if needle_norm.len() > hay_norm.len() {
        return false;
    }
    hay_norm
        .windows(needle_norm.len())
        .any(|w| w == needle_norm.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_versions_have_empty_diff() {
        let diff = compute_region_diff("a\nb\nc\n", "a\nb\nc\n", 3);
        assert!(diff.changes.is_empty());
        assert_eq!(diff.summary, DiffSummary::default());
    }

    #[test]
    fn single_line_modification() {
        let diff = compute_region_diff("a\nb\nc\n", "a\nB\nc\n", 3);
        assert_eq!(diff.changes.len(), 1);
        let change = &diff.changes[0];
        assert_eq!(change.kind, ChangeKind::Modified);
        assert_eq!(change.start_line, 2);
        assert_eq!(change.end_line, None);
        assert_eq!(change.old_content.as_deref(), Some("b"));
        assert_eq!(change.new_content.as_deref(), Some("B"));
        assert_eq!(change.context_before.as_deref(), Some("a"));
        assert_eq!(change.context_after.as_deref(), Some("c"));
        assert_eq!(diff.summary.lines_modified, 1);
        assert_eq!(diff.summary.regions_changed, 1);
    }

    #[test]
    fn added_lines_use_new_side_numbering() {
        let diff = compute_region_diff("a\nb\n", "a\nx\ny\nb\n", 3);
        assert_eq!(diff.changes.len(), 1);
        let change = &diff.changes[0];
        assert_eq!(change.kind, ChangeKind::Added);
        assert_eq!(change.start_line, 2);
        assert_eq!(change.end_line, Some(3));
        assert_eq!(change.new_content.as_deref(), Some("x\ny"));
        assert_eq!(diff.summary.lines_added, 2);
    }

    #[test]
    fn removed_lines_report_old_content() {
        let diff = compute_region_diff("a\nb\nc\n", "a\nc\n", 3);
        assert_eq!(diff.changes.len(), 1);
        let change = &diff.changes[0];
        assert_eq!(change.kind, ChangeKind::Removed);
        assert_eq!(change.start_line, 2);
        assert_eq!(change.old_content.as_deref(), Some("b"));
        assert_eq!(diff.summary.lines_removed, 1);
    }

    #[test]
    fn context_respects_width() {
        let old = "1\n2\n3\n4\n5\nX\n6\n7\n8\n9\n";
        let new = "1\n2\n3\n4\n5\nY\n6\n7\n8\n9\n";
        let diff = compute_region_diff(old, new, 2);
        let change = &diff.changes[0];
        assert_eq!(change.context_before.as_deref(), Some("4\n5"));
        assert_eq!(change.context_after.as_deref(), Some("6\n7"));
    }

    #[test]
    fn unified_diff_has_headers_and_summary() {
        let diff = compute_unified_diff("a\nb\nc\n", "a\nB\nc\n", 3);
        assert!(diff.content.contains("--- expected"));
        assert!(diff.content.contains("+++ current"));
        assert!(diff.content.contains("-b"));
        assert!(diff.content.contains("+B"));
        assert_eq!(diff.summary.lines_modified, 1);
        assert_eq!(diff.summary.regions_changed, 1);
    }

    #[test]
    fn unified_diff_of_identical_is_empty() {
        let diff = compute_unified_diff("same\n", "same\n", 3);
        assert_eq!(diff.summary, DiffSummary::default());
        assert_eq!(diff.summary.regions_changed, 0);
    }

    #[test]
    fn patch_applies_when_unique() {
        let check = check_patches(
            "a\nb\nc\n",
            &[Patch {
                old_string: "b".into(),
                new_string: "B".into(),
            }],
        );
        assert!(check.all_applicable);
        assert_eq!(check.non_conflicting, vec![0]);
        assert_eq!(check.applied, "a\nB\nc\n");
    }

    #[test]
    fn patch_not_found() {
        let check = check_patches(
            "a\nB\nc\n",
            &[Patch {
                old_string: "b".into(),
                new_string: "B2".into(),
            }],
        );
        assert!(!check.all_applicable);
        assert_eq!(check.conflicts.len(), 1);
        assert_eq!(check.conflicts[0].patch_index, 0);
        assert_eq!(check.conflicts[0].reason, ConflictReason::NotFound);
    }

    #[test]
    fn patch_ambiguous_on_multiple_matches() {
        let check = check_patches(
            "x\nx\n",
            &[Patch {
                old_string: "x".into(),
                new_string: "y".into(),
            }],
        );
        assert_eq!(check.conflicts[0].reason, ConflictReason::Ambiguous);
    }

    #[test]
    fn patch_context_changed_on_indent_drift() {
        let check = check_patches(
            "    let x = 1;\n",
            &[Patch {
                old_string: "let x = 1;".into(),
                new_string: "let x = 2;".into(),
            }],
        );
        assert_eq!(check.conflicts[0].reason, ConflictReason::ContextChanged);
    }

    #[test]
    fn patches_apply_sequentially() {
        let check = check_patches(
            "one two three\n",
            &[
                Patch {
                    old_string: "one".into(),
                    new_string: "1".into(),
                },
                Patch {
                    old_string: "three".into(),
                    new_string: "3".into(),
                },
            ],
        );
        assert!(check.all_applicable);
        assert_eq!(check.applied, "1 two 3\n");
    }

    #[test]
    fn later_patch_sees_earlier_result() {
        // The second patch matches text produced by the first.
        let check = check_patches(
            "alpha\n",
            &[
                Patch {
                    old_string: "alpha".into(),
                    new_string: "beta".into(),
                },
                Patch {
                    old_string: "beta".into(),
                    new_string: "gamma".into(),
                },
            ],
        );
        assert!(check.all_applicable);
        assert_eq!(check.applied, "gamma\n");
    }

    #[test]
    fn empty_old_string_is_ambiguous() {
        let check = check_patches(
            "abc",
            &[Patch {
                old_string: String::new(),
                new_string: "x".into(),
            }],
        );
        assert_eq!(check.conflicts[0].reason, ConflictReason::Ambiguous);
    }
}

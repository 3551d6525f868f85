//! Path validation: canonicalization, base-directory confinement, and the
//! access-rule policy applied to destructive operations.
//!
//! Every operation resolves its path here before touching the lock manager or
//! the filesystem. Symlinks are resolved before containment is checked, so a
//! link pointing outside a base directory cannot escape it.

use crate::config::{AccessRule, CrudConfig, PolicyAction};
use std::path::{Component, Path, PathBuf};
use syncpoint_types::{ErrorCode, OpError};

/// Operation kind as seen by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
    Update,
    Delete,
    RenameSrc,
    RenameDst,
    Append,
    List,
    Status,
}

impl OpKind {
    /// Read-family operations bypass the access-rule policy.
    pub fn is_read_family(self) -> bool {
        matches!(self, OpKind::Read | OpKind::List | OpKind::Status)
    }

    /// Name used to match against an access rule's operation set.
    fn policy_name(self) -> &'static str {
        match self {
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
            OpKind::RenameSrc | OpKind::RenameDst => "rename",
            OpKind::Append => "append",
            OpKind::List => "list",
            OpKind::Status => "status",
        }
    }
}

/// Validates user-supplied paths against the configured base directories and
/// access rules. Bases and rule prefixes are resolved once at construction.
pub struct PathValidator {
    bases: Vec<PathBuf>,
    /// (resolved prefix, rule), sorted by descending priority
    rules: Vec<(PathBuf, AccessRule)>,
    default_destructive_policy: PolicyAction,
}

impl PathValidator {
    pub fn new(crud: &CrudConfig) -> Self {
        let bases = crud
            .base_directories
            .iter()
            .map(|base| resolve_existing(base))
            .collect();

        let mut rules: Vec<(PathBuf, AccessRule)> = crud
            .access_rules
            .iter()
            .map(|rule| (resolve_existing(&rule.path), rule.clone()))
            .collect();
        // Descending priority; declaration order breaks ties.
        rules.sort_by_key(|(_, rule)| std::cmp::Reverse(rule.priority));

        Self {
            bases,
            rules,
            default_destructive_policy: crud.default_destructive_policy,
        }
    }

    /// Configured base directories after resolution.
    pub fn base_directories(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Resolve a path and check base-directory containment.
    pub fn validate(&self, raw: &str) -> Result<PathBuf, OpError> {
        if raw.is_empty() {
            return Err(OpError::new(ErrorCode::InvalidPath, "empty path"));
        }

        let canonical = canonicalize_lenient(Path::new(&expand_home(raw))).ok_or_else(|| {
            OpError::new(
                ErrorCode::InvalidPath,
                format!("cannot resolve path: {}", raw),
            )
            .with_path(raw)
        })?;

        // No bases configured means no restriction.
        if self.bases.is_empty() {
            return Ok(canonical);
        }

        let normalized = normalize_case(&canonical);
        for base in &self.bases {
            let base_norm = normalize_case(base);
            if normalized == base_norm || normalized.starts_with(&base_norm) {
                return Ok(canonical);
            }
        }

        Err(OpError::new(
            ErrorCode::PathOutsideBase,
            format!(
                "path is outside allowed base directories: {} (resolved to {})",
                raw,
                canonical.display()
            ),
        )
        .with_path(raw))
    }

    /// Resolve a path, check containment, then apply the access policy for
    /// the operation kind. Read-family kinds skip the policy step.
    pub fn validate_operation(&self, raw: &str, op: OpKind) -> Result<PathBuf, OpError> {
        let canonical = self.validate(raw)?;

        if op.is_read_family() {
            return Ok(canonical);
        }

        if self.rules.is_empty() {
            return match self.default_destructive_policy {
                PolicyAction::Allow => Ok(canonical),
                PolicyAction::Deny => Err(access_denied(raw, op, "default policy is deny")),
            };
        }

        let normalized = normalize_case(&canonical);
        for (prefix, rule) in &self.rules {
            let covers_op = rule
                .operations
                .iter()
                .any(|name| name == "*" || name == op.policy_name());
            if !covers_op {
                continue;
            }

            let prefix_norm = normalize_case(prefix);
            if normalized == prefix_norm || normalized.starts_with(&prefix_norm) {
                return match rule.action {
                    PolicyAction::Allow => Ok(canonical),
                    PolicyAction::Deny => Err(access_denied(
                        raw,
                        op,
                        &format!("blocked by access rule for {}", rule.path.display()),
                    )),
                };
            }
        }

        match self.default_destructive_policy {
            PolicyAction::Allow => Ok(canonical),
            PolicyAction::Deny => Err(access_denied(raw, op, "no matching access rule")),
        }
    }
}

fn access_denied(raw: &str, op: OpKind, why: &str) -> OpError {
    OpError::new(
        ErrorCode::AccessDenied,
        format!("operation '{}' denied on {}: {}", op.policy_name(), raw, why),
    )
    .with_path(raw)
}

fn expand_home(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home, rest);
        }
    }
    raw.to_string()
}

/// Resolve a path that is expected to exist (bases, rule prefixes); fall back
/// to lexical normalization when it does not.
fn resolve_existing(path: &Path) -> PathBuf {
    path.canonicalize()
        .ok()
        .or_else(|| canonicalize_lenient(path))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Canonicalize a path whose final components may not exist yet.
///
/// `.` and `..` are collapsed lexically first (the same order `realpath` of
/// an absolute path uses), then symlinks are resolved; when the final
/// components do not exist, the deepest existing ancestor is resolved and the
/// remainder re-joined.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut lexical = PathBuf::new();
    for comp in absolute.components() {
        match comp {
            Component::RootDir | Component::Prefix(_) => lexical.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Excess `..` at the root is dropped, as normpath does.
                lexical.pop();
            }
            Component::Normal(part) => lexical.push(part),
        }
    }

    if let Ok(canonical) = lexical.canonicalize() {
        return Some(canonical);
    }

    // Walk up to the deepest ancestor that exists.
    let mut existing = lexical.as_path();
    let mut suffix_parts: Vec<std::ffi::OsString> = Vec::new();
    while let Some(parent) = existing.parent() {
        suffix_parts.push(existing.file_name()?.to_os_string());
        existing = parent;
        if existing.exists() {
            break;
        }
    }

    let mut resolved = existing.canonicalize().ok()?;
    for part in suffix_parts.iter().rev() {
        resolved.push(part);
    }
    Some(resolved)
}

#[cfg(windows)]
fn normalize_case(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(windows))]
fn normalize_case(path: &Path) -> PathBuf {
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn validator_for(base: &Path) -> PathValidator {
        let crud = CrudConfig {
            base_directories: vec![base.to_path_buf()],
            ..Default::default()
        };
        PathValidator::new(&crud)
    }

    #[test]
    fn accepts_path_inside_base() {
        let dir = tempdir().unwrap();
        let validator = validator_for(dir.path());
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "x").unwrap();

        let resolved = validator.validate(file.to_str().unwrap()).unwrap();
        assert_eq!(resolved, file.canonicalize().unwrap());
    }

    #[test]
    fn accepts_nonexistent_file_inside_base() {
        let dir = tempdir().unwrap();
        let validator = validator_for(dir.path());
        let file = dir.path().join("new/deep/file.txt");

        let resolved = validator.validate(file.to_str().unwrap()).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn rejects_path_outside_base() {
        let dir = tempdir().unwrap();
        let validator = validator_for(dir.path());

        let err = validator.validate("/etc/passwd").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathOutsideBase);
    }

    #[test]
    fn rejects_dotdot_escape() {
        let dir = tempdir().unwrap();
        let validator = validator_for(dir.path());
        let sneaky = format!("{}/sub/../../../etc/passwd", dir.path().display());

        let err = validator.validate(&sneaky).unwrap_err();
        assert_eq!(err.code, ErrorCode::PathOutsideBase);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let outside = tempdir().unwrap();
        let base = tempdir().unwrap();
        let target = outside.path().join("secret.txt");
        std::fs::write(&target, "top secret").unwrap();

        let link = base.path().join("innocent.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let validator = validator_for(base.path());
        let err = validator.validate(link.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PathOutsideBase);
    }

    #[test]
    fn rejects_empty_path() {
        let dir = tempdir().unwrap();
        let validator = validator_for(dir.path());
        let err = validator.validate("").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPath);
    }

    #[test]
    fn no_bases_means_no_restriction() {
        let crud = CrudConfig::default();
        let validator = PathValidator::new(&crud);
        assert!(validator.validate("/etc/hosts").is_ok());
    }

    #[test]
    fn deny_rule_blocks_destructive_op() {
        let dir = tempdir().unwrap();
        let protected = dir.path().join("protected");
        std::fs::create_dir(&protected).unwrap();

        let crud = CrudConfig {
            base_directories: vec![dir.path().to_path_buf()],
            access_rules: vec![AccessRule {
                path: protected.clone(),
                operations: vec!["delete".into()],
                action: PolicyAction::Deny,
                priority: 10,
            }],
            ..Default::default()
        };
        let validator = PathValidator::new(&crud);
        let target = protected.join("f.txt");
        std::fs::write(&target, "x").unwrap();
        let raw = target.to_str().unwrap();

        let err = validator
            .validate_operation(raw, OpKind::Delete)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);

        // Rule only covers delete; update falls through to the allow default.
        assert!(validator.validate_operation(raw, OpKind::Update).is_ok());
        // Reads bypass rules entirely.
        assert!(validator.validate_operation(raw, OpKind::Read).is_ok());
    }

    #[test]
    fn higher_priority_rule_wins() {
        let dir = tempdir().unwrap();
        let crud = CrudConfig {
            base_directories: vec![dir.path().to_path_buf()],
            access_rules: vec![
                AccessRule {
                    path: dir.path().to_path_buf(),
                    operations: vec!["*".into()],
                    action: PolicyAction::Deny,
                    priority: 1,
                },
                AccessRule {
                    path: dir.path().to_path_buf(),
                    operations: vec!["*".into()],
                    action: PolicyAction::Allow,
                    priority: 5,
                },
            ],
            ..Default::default()
        };
        let validator = PathValidator::new(&crud);
        let target = dir.path().join("f.txt");
        std::fs::write(&target, "x").unwrap();

        assert!(validator
            .validate_operation(target.to_str().unwrap(), OpKind::Write)
            .is_ok());
    }

    #[test]
    fn default_deny_applies_when_no_rule_matches() {
        let dir = tempdir().unwrap();
        let crud = CrudConfig {
            base_directories: vec![dir.path().to_path_buf()],
            default_destructive_policy: PolicyAction::Deny,
            ..Default::default()
        };
        let validator = PathValidator::new(&crud);
        let target = dir.path().join("f.txt");
        std::fs::write(&target, "x").unwrap();
        let raw = target.to_str().unwrap();

        let err = validator.validate_operation(raw, OpKind::Write).unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);
        // Reads are unaffected by the destructive default.
        assert!(validator.validate_operation(raw, OpKind::Read).is_ok());
    }
}

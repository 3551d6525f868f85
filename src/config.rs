//! Engine configuration.
//!
//! The core consumes a pre-validated `Settings` value; parsing happens once
//! at startup from a JSON file plus defaults. Hot-reload plumbing lives
//! outside the core.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub crud: CrudConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub watcher: WatcherSection,
}

/// CRUD operation limits and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudConfig {
    /// Absolute paths that bound all canonical paths
    #[serde(default)]
    pub base_directories: Vec<PathBuf>,
    #[serde(default = "default_timeout")]
    pub default_timeout: f64,
    #[serde(default = "default_max_timeout")]
    pub max_timeout: f64,
    #[serde(default = "default_encoding")]
    pub default_encoding: String,
    #[serde(default = "default_context_lines")]
    pub diff_context_lines: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Ordered access policy for destructive operations
    #[serde(default)]
    pub access_rules: Vec<AccessRule>,
    /// Applied to destructive operations when no rule matches
    #[serde(default)]
    pub default_destructive_policy: PolicyAction,
}

impl Default for CrudConfig {
    fn default() -> Self {
        Self {
            base_directories: Vec::new(),
            default_timeout: default_timeout(),
            max_timeout: default_max_timeout(),
            default_encoding: default_encoding(),
            diff_context_lines: default_context_lines(),
            max_file_size_bytes: default_max_file_size(),
            access_rules: Vec::new(),
            default_destructive_policy: PolicyAction::default(),
        }
    }
}

impl CrudConfig {
    /// Resolve a request timeout against the configured default and ceiling.
    pub fn effective_timeout(&self, requested: Option<f64>) -> std::time::Duration {
        let secs = requested
            .unwrap_or(self.default_timeout)
            .clamp(0.0, self.max_timeout);
        std::time::Duration::from_secs_f64(secs)
    }

    /// Resolve a request encoding against the configured default.
    pub fn effective_encoding<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.default_encoding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    #[default]
    Allow,
    Deny,
}

/// One path-prefix access rule.
///
/// Rules are evaluated in descending priority, first match wins. Read-family
/// operations bypass rules entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    pub path: PathBuf,
    /// Operation names this rule covers; "*" matches all destructive ops
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    pub action: PolicyAction,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Snapshot location; None picks `state.json` under the data directory
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default = "default_write_debounce")]
    pub write_debounce: f64,
    /// TTL = lock timeout x multiplier, used to expire restored waiters
    #[serde(default = "default_ttl_multiplier")]
    pub ttl_multiplier: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            state_file: None,
            write_debounce: default_write_debounce(),
            ttl_multiplier: default_ttl_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        Ok(settings)
    }
}

fn default_timeout() -> f64 {
    30.0
}

fn default_max_timeout() -> f64 {
    300.0
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_context_lines() -> usize {
    3
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_operations() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_write_debounce() -> f64 {
    1.0
}

fn default_ttl_multiplier() -> f64 {
    2.0
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.crud.default_timeout, 30.0);
        assert_eq!(settings.crud.max_timeout, 300.0);
        assert_eq!(settings.crud.default_encoding, "utf-8");
        assert_eq!(settings.crud.max_file_size_bytes, 10 * 1024 * 1024);
        assert!(!settings.persistence.enabled);
        assert!(settings.watcher.enabled);
        assert_eq!(settings.watcher.debounce_ms, 100);
    }

    #[test]
    fn nested_sections_parse() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "crud": {
                    "base_directories": ["/data"],
                    "default_timeout": 5.0,
                    "access_rules": [
                        {"path": "/data/ro", "operations": ["delete"], "action": "deny", "priority": 10}
                    ],
                    "default_destructive_policy": "deny"
                },
                "persistence": {"enabled": true, "write_debounce": 0.5},
                "watcher": {"enabled": false, "debounce_ms": 250}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.crud.base_directories, vec![PathBuf::from("/data")]);
        assert_eq!(settings.crud.default_destructive_policy, PolicyAction::Deny);
        assert_eq!(settings.crud.access_rules.len(), 1);
        assert_eq!(settings.crud.access_rules[0].priority, 10);
        assert!(settings.persistence.enabled);
        assert!(!settings.watcher.enabled);
        assert_eq!(settings.watcher.debounce_ms, 250);
    }

    #[test]
    fn effective_timeout_clamps_to_ceiling() {
        let crud = CrudConfig {
            max_timeout: 10.0,
            ..Default::default()
        };
        assert_eq!(
            crud.effective_timeout(Some(60.0)),
            std::time::Duration::from_secs(10)
        );
        assert_eq!(
            crud.effective_timeout(None),
            std::time::Duration::from_secs(10)
        );
        assert_eq!(
            crud.effective_timeout(Some(2.0)),
            std::time::Duration::from_secs(2)
        );
    }
}

//! Storage configuration and path management.
//!
//! All file locations live on a `StorageConfig` value that is passed into each
//! component. Production code uses `StorageConfig::from_env()` (rooted at
//! `~/.claude`); tests use `StorageConfig::with_root(temp_dir)` so that parallel
//! test instances never share files.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{RestoreError, Result};

/// Environment override for the storage root.
pub const ROOT_ENV_VAR: &str = "SESSION_RESTORE_HOME";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the live-state, restore and snapshot files (default: ~/.claude)
    root: PathBuf,
    /// Claude per-project session logs (default: ~/.claude/projects)
    claude_projects: PathBuf,
}

impl StorageConfig {
    /// Resolves the default configuration, honouring `SESSION_RESTORE_HOME`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(RestoreError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(".claude")))
    }

    /// Creates a StorageConfig rooted at `root`, with the claude projects
    /// directory underneath it.
    pub fn with_root(root: PathBuf) -> Self {
        let claude_projects = root.join("projects");
        Self {
            root,
            claude_projects,
        }
    }

    /// Creates a StorageConfig with an explicit claude projects directory.
    pub fn with_roots(root: PathBuf, claude_projects: PathBuf) -> Self {
        Self {
            root,
            claude_projects,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of per-project claude session logs (`<encoded-cwd>/<uuid>.jsonl`).
    pub fn claude_projects_dir(&self) -> &Path {
        &self.claude_projects
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // State Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sessions observed on the most recent non-empty poll.
    pub fn live_state_file(&self) -> PathBuf {
        self.root.join("ghostty-live-state.json")
    }

    /// Sessions pending relaunch.
    pub fn restore_file(&self) -> PathBuf {
        self.root.join("ghostty-restore.json")
    }

    /// Raw process observations from the most recent poll.
    pub fn snapshot_file(&self) -> PathBuf {
        self.root.join("ghostty-snapshot.json")
    }

    /// cmux workspace id → title map, refreshed from cmux introspection.
    pub fn workspace_map_file(&self) -> PathBuf {
        self.root.join("cmux-workspace-map.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Logs
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn watcher_log_name(&self) -> &'static str {
        "ghostty-session-watcher.log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_places_all_files_under_root() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/restore-test"));
        assert_eq!(
            config.live_state_file(),
            PathBuf::from("/tmp/restore-test/ghostty-live-state.json")
        );
        assert_eq!(
            config.restore_file(),
            PathBuf::from("/tmp/restore-test/ghostty-restore.json")
        );
        assert_eq!(
            config.snapshot_file(),
            PathBuf::from("/tmp/restore-test/ghostty-snapshot.json")
        );
        assert_eq!(
            config.workspace_map_file(),
            PathBuf::from("/tmp/restore-test/cmux-workspace-map.json")
        );
        assert_eq!(
            config.claude_projects_dir(),
            Path::new("/tmp/restore-test/projects")
        );
    }

    #[test]
    fn test_with_roots_keeps_projects_separate() {
        let config =
            StorageConfig::with_roots(PathBuf::from("/state"), PathBuf::from("/claude/projects"));
        assert_eq!(config.root(), Path::new("/state"));
        assert_eq!(config.claude_projects_dir(), Path::new("/claude/projects"));
    }
}

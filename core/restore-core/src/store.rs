//! File-backed live-state, restore plan and snapshot persistence.
//!
//! Three JSON files live under the storage root:
//!
//! - **Live-State** (`ghostty-live-state.json`): bare array of records seen on
//!   the most recent non-empty poll.
//! - **Restore-File** (`ghostty-restore.json`): the queue of records pending
//!   relaunch.
//! - **Snapshot** (`ghostty-snapshot.json`): raw process observations from the
//!   last poll, used when the live-state file is unusable.
//!
//! # Restore-File Format
//!
//! ```json
//! {
//!   "version": 2,
//!   "savedAt": "2026-01-02T03:04:05Z",
//!   "sessions": [ ... records ... ]
//! }
//! ```
//!
//! A bare array is the legacy form and is still read.
//!
//! # Defensive Design
//!
//! The watcher and restore processes share these files without locking. Reads
//! never fail:
//! - Missing files (empty result)
//! - Empty or corrupt JSON (empty result, log warning)
//! - Version mismatches (empty result)
//! - Records without a `cwd` (dropped)
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a concurrent reader never sees a partial file.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{RestoreError, Result};
use crate::record::{normalize_entries, SessionRecord};
use crate::sessions::{resolve_sessions, ProcessEntry};
use crate::storage::StorageConfig;
use crate::types::{AgentTool, TerminalHost};

/// Restore-File schema version written by this crate.
pub const RESTORE_FILE_VERSION: u32 = 2;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestoreEnvelope<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    sessions: &'a [SessionRecord],
}

/// Counts reported by [`SessionStore::save_sessions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub total: usize,
    /// Records with a session id (relaunched with a resume directive).
    pub resumed: usize,
    /// Records without one (relaunched with continue, or bare).
    pub continued: usize,
}

impl SaveSummary {
    fn from_records(records: &[SessionRecord]) -> Self {
        let resumed = records.iter().filter(|r| r.session_id.is_some()).count();
        SaveSummary {
            total: records.len(),
            resumed,
            continued: records.len() - resumed,
        }
    }
}

/// Drops later copies of a resolved session (same host, tool, session id and
/// cwd). Unresolved records are all kept: each one is a separate process.
pub fn dedupe_records(records: Vec<SessionRecord>) -> Vec<SessionRecord> {
    let mut seen: HashSet<(TerminalHost, AgentTool, String, String)> = HashSet::new();
    records
        .into_iter()
        .filter(|record| match &record.session_id {
            Some(id) => seen.insert((
                record.terminal(),
                record.tool,
                id.clone(),
                record.cwd.clone(),
            )),
            None => true,
        })
        .collect()
}

/// Keeps records owned by `scope`, or everything when unscoped.
pub fn filter_by_scope(
    records: Vec<SessionRecord>,
    scope: Option<TerminalHost>,
) -> Vec<SessionRecord> {
    match scope {
        Some(host) => records.into_iter().filter(|r| r.terminal() == host).collect(),
        None => records,
    }
}

/// Merges `incoming` into `existing`. Existing order is kept; a record
/// matching a pending one replaces it in place, new ones are appended.
///
/// Unresolved records are matched by occurrence: the n-th incoming record
/// for a host/tool/cwd replaces the n-th pending one, so two unresolved
/// sessions in one directory stay two records.
pub fn merge_records(
    existing: Vec<SessionRecord>,
    incoming: &[SessionRecord],
) -> Vec<SessionRecord> {
    let mut merged = dedupe_records(existing);
    let mut unresolved_seen: HashMap<(TerminalHost, AgentTool, String), usize> = HashMap::new();
    for record in incoming {
        let occurrence = match record.session_id {
            Some(_) => 0,
            None => {
                let seen = unresolved_seen
                    .entry((record.terminal(), record.tool, record.cwd.clone()))
                    .or_insert(0);
                *seen += 1;
                *seen - 1
            }
        };
        let slot = merged
            .iter()
            .enumerate()
            .filter(|(_, current)| current.identity() == record.identity())
            .nth(occurrence)
            .map(|(index, _)| index);
        match slot {
            Some(index) => merged[index] = record.clone(),
            None => merged.push(record.clone()),
        }
    }
    merged
}

/// Reads a state file, treating "missing" and "empty" as nothing stored.
fn read_json(path: &Path, label: &str) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(error = %err, file = label, "Failed to read state file");
            return None;
        }
    };
    if content.trim().is_empty() {
        tracing::warn!(file = label, "Empty state file, treating as no records");
        return None;
    }
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                error = %err,
                file = label,
                "Corrupt state file, treating as no records"
            );
            None
        }
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RestoreError::NoParentDir(path.to_path_buf()))?;
    fs::create_dir_all(parent)
        .map_err(|e| RestoreError::io(format!("creating {}", parent.display()), e))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|e| RestoreError::io("creating temp state file", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| RestoreError::io("writing temp state file", e))?;
    temp_file
        .flush()
        .map_err(|e| RestoreError::io("flushing temp state file", e))?;
    temp_file
        .persist(path)
        .map_err(|e| RestoreError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RestoreError::io(format!("removing {}", path.display()), err)),
    }
}

/// Reads and writes the session state files under one storage root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    config: StorageConfig,
}

impl SessionStore {
    pub fn new(config: StorageConfig) -> Self {
        SessionStore { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Live-State
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn load_live_state(&self) -> Vec<SessionRecord> {
        read_json(&self.config.live_state_file(), "live-state")
            .map(|value| normalize_entries(&value))
            .unwrap_or_default()
    }

    /// Overwrites the live-state file with this poll's records.
    ///
    /// An empty observation never replaces a non-empty file; an empty poll is
    /// a gap until [`SessionStore::clear_live_state`] says otherwise. Returns
    /// the number of records written.
    pub fn persist_live_state(&self, records: &[SessionRecord]) -> Result<usize> {
        let records: Vec<SessionRecord> = records
            .iter()
            .filter(|r| r.is_restorable())
            .cloned()
            .collect();

        if records.is_empty() && !self.load_live_state().is_empty() {
            tracing::debug!("Empty observation, keeping previous live state");
            return Ok(0);
        }

        self.write_live_state(&records)?;
        Ok(records.len())
    }

    /// Empties the live-state file once sessions have been gone long enough.
    pub fn clear_live_state(&self) -> Result<()> {
        self.write_live_state(&[])
    }

    /// Deletes the live-state file after a restore consumed it.
    pub fn remove_live_state(&self) -> Result<()> {
        remove_if_exists(&self.config.live_state_file())
    }

    fn write_live_state(&self, records: &[SessionRecord]) -> Result<()> {
        let content = serde_json::to_string_pretty(records)
            .map_err(|e| RestoreError::json("serializing live state", e))?;
        write_atomic(&self.config.live_state_file(), &content)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Restore-File
    // ─────────────────────────────────────────────────────────────────────────────

    /// Pending records. Accepts the versioned envelope and the legacy bare array.
    pub fn load_restore_file(&self) -> Vec<SessionRecord> {
        let Some(value) = read_json(&self.config.restore_file(), "restore") else {
            return Vec::new();
        };
        match &value {
            Value::Array(_) => normalize_entries(&value),
            Value::Object(map) => match map.get("version").and_then(Value::as_u64) {
                Some(version) if version == u64::from(RESTORE_FILE_VERSION) => map
                    .get("sessions")
                    .map(normalize_entries)
                    .unwrap_or_default(),
                Some(version) => {
                    tracing::warn!(
                        version,
                        expected = RESTORE_FILE_VERSION,
                        "Unsupported restore file version, treating as empty"
                    );
                    Vec::new()
                }
                None => {
                    tracing::warn!("Restore file envelope has no version, treating as empty");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    /// Rewrites the restore plan; an empty plan removes the file.
    pub fn write_restore_file(&self, records: &[SessionRecord]) -> Result<()> {
        let path = self.config.restore_file();
        let records: Vec<SessionRecord> = dedupe_records(
            records.iter().filter(|r| r.is_restorable()).cloned().collect(),
        );
        if records.is_empty() {
            return remove_if_exists(&path);
        }
        let envelope = RestoreEnvelope {
            version: RESTORE_FILE_VERSION,
            saved_at: Utc::now(),
            sessions: &records,
        };
        let content = serde_json::to_string_pretty(&envelope)
            .map_err(|e| RestoreError::json("serializing restore file", e))?;
        write_atomic(&path, &content)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Snapshot
    // ─────────────────────────────────────────────────────────────────────────────

    /// Raw observations from the last poll. Malformed items are skipped.
    pub fn load_snapshot(&self) -> Vec<ProcessEntry> {
        let Some(Value::Array(items)) = read_json(&self.config.snapshot_file(), "snapshot") else {
            return Vec::new();
        };
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }

    pub fn write_snapshot(&self, entries: &[ProcessEntry]) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| RestoreError::json("serializing snapshot", e))?;
        write_atomic(&self.config.snapshot_file(), &content)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Save
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records that would be saved right now: live state, or the resolved last
    /// snapshot when live state is empty or unreadable.
    pub fn observed_sessions(&self) -> Vec<SessionRecord> {
        let live = self.load_live_state();
        if !live.is_empty() {
            return live;
        }
        let snapshot = self.load_snapshot();
        if snapshot.is_empty() {
            return Vec::new();
        }
        tracing::info!(entries = snapshot.len(), "Live state empty, saving from snapshot");
        resolve_sessions(&snapshot, self.config.claude_projects_dir())
            .into_iter()
            .filter(SessionRecord::is_restorable)
            .collect()
    }

    /// Promotes observed sessions owned by `scope` (all when `None`) into the
    /// restore plan.
    ///
    /// Records already pending, including those of other hosts, are kept;
    /// repeated saves of the same session never duplicate it.
    pub fn save_sessions(&self, scope: Option<TerminalHost>) -> Result<SaveSummary> {
        let saved = dedupe_records(filter_by_scope(self.observed_sessions(), scope));
        let summary = SaveSummary::from_records(&saved);
        if saved.is_empty() {
            tracing::info!(scope = ?scope, "No sessions to save");
            return Ok(summary);
        }

        let merged = merge_records(self.load_restore_file(), &saved);
        self.write_restore_file(&merged)?;

        tracing::info!(
            scope = ?scope,
            total = summary.total,
            resumed = summary.resumed,
            continued = summary.continued,
            pending = merged.len(),
            "Saved sessions for restore"
        );
        Ok(summary)
    }
}

//! Turns raw process observations into session records.
//!
//! A [`ProcessEntry`] is what the watcher sees for one live agent process. It
//! is also the unit of the snapshot file, so save can fall back to the last
//! raw observation when the live-state file is unusable.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::{extract_flags, tokenize};
use crate::identity::{
    find_project_dir, is_interactive, resolve_by_log_scan, resolve_by_open_handle,
    resolve_explicit_id, OpenFileInspector,
};
use crate::patterns::looks_like_uuid;
use crate::record::{MuxAddress, SessionRecord};
use crate::types::AgentTool;

/// One observed agent process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntry {
    pub pid: u32,
    #[serde(default)]
    pub cwd: String,
    /// Full command line as reported by the process table.
    #[serde(default)]
    pub args: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Set when the process runs inside a cmux surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_index: Option<u32>,
}

impl ProcessEntry {
    /// The tool this entry belongs to; inferred from the command line when the
    /// observer did not tag it.
    pub fn tool(&self) -> AgentTool {
        self.tool
            .as_deref()
            .and_then(AgentTool::from_id)
            .unwrap_or_else(|| AgentTool::infer_from_args(&self.args))
    }

    fn mux_address(&self) -> Option<MuxAddress> {
        let workspace_id = self.workspace_id.as_deref().filter(|id| !id.is_empty())?;
        Some(MuxAddress {
            workspace_id: Some(workspace_id.to_string()),
            workspace_name: self.workspace_name.clone().filter(|n| !n.is_empty()),
            surface_id: self.surface_id.clone().filter(|s| !s.is_empty()),
            surface_index: self.surface_index.unwrap_or(0),
        })
    }
}

/// Fills in codex session ids from the rollout logs each process holds open.
///
/// Returns the pids of interactive codex processes that still have no id.
pub fn attach_open_handle_ids(
    entries: &mut [ProcessEntry],
    inspector: &dyn OpenFileInspector,
) -> Vec<u32> {
    let mut unresolved = Vec::new();
    for entry in entries.iter_mut() {
        if entry.tool() != AgentTool::Codex {
            continue;
        }
        let tokens = tokenize(&entry.args);
        if entry.session_id.is_some() || resolve_explicit_id(&tokens, AgentTool::Codex).is_some() {
            continue;
        }
        match resolve_by_open_handle(inspector, entry.pid, AgentTool::Codex) {
            Some(session_id) => entry.session_id = Some(session_id),
            None => unresolved.push(entry.pid),
        }
    }
    unresolved
}

/// Builds session records from raw observations.
///
/// Explicit ids (recorded or on the command line) win. Claude entries left
/// without an id are matched against their project's recent real session
/// logs, most recent first, never reusing an id claimed elsewhere in the
/// batch. Non-interactive codex invocations are not resumable and are dropped.
pub fn resolve_sessions(entries: &[ProcessEntry], projects_dir: &Path) -> Vec<SessionRecord> {
    let mut records = Vec::with_capacity(entries.len());
    let mut claimed: HashSet<String> = HashSet::new();

    for entry in entries {
        let tool = entry.tool();
        let tokens = tokenize(&entry.args);

        if tool == AgentTool::Codex && !tokens.is_empty() && !is_interactive(&tokens) {
            tracing::debug!(pid = entry.pid, "Skipping non-interactive codex process");
            continue;
        }

        let session_id = entry
            .session_id
            .clone()
            .filter(|id| looks_like_uuid(id))
            .or_else(|| resolve_explicit_id(&tokens, tool));

        if tool == AgentTool::Claude {
            if let Some(id) = &session_id {
                claimed.insert(id.clone());
            }
        }

        let flags = extract_flags(&tokens, tool);
        let mut record = SessionRecord::new(tool, session_id, &entry.cwd, flags);
        record.mux = entry.mux_address();
        records.push(record);
    }

    // Group unresolved claude records by project dir, preserving discovery order.
    let mut groups: Vec<(PathBuf, Vec<usize>)> = Vec::new();
    let mut group_index: HashMap<PathBuf, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if record.tool != AgentTool::Claude || record.session_id.is_some() {
            continue;
        }
        let Some(project_dir) = find_project_dir(&record.cwd, projects_dir) else {
            continue;
        };
        let slot = *group_index.entry(project_dir.clone()).or_insert_with(|| {
            groups.push((project_dir, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(idx);
    }

    for (project_dir, members) in groups {
        let found = resolve_by_log_scan(&project_dir, members.len(), &claimed);
        tracing::debug!(
            project_dir = %project_dir.display(),
            unresolved = members.len(),
            found = found.len(),
            "Resolved claude sessions by log scan"
        );
        for (idx, session_id) in members.into_iter().zip(found) {
            claimed.insert(session_id.clone());
            records[idx].session_id = Some(session_id);
        }
    }

    records
}

//! Session identity resolution.
//!
//! Finds the session id a live agent process is attached to. In order of
//! preference:
//!
//! 1. **Explicit**: a resume directive followed by a session id on the command line.
//! 2. **Open handle** (codex): the rollout log the process holds open.
//! 3. **Log scan** (claude): the most recent per-project session logs that
//!    actually received user input, matched positionally against unresolved
//!    processes in the same project.
//!
//! A miss is always `None`/empty, never an error.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs_err as fs;
use serde_json::Value;

use crate::command::{
    strip_executable, FlagRules, CODEX_INTERACTIVE_SUBCOMMANDS, CODEX_NON_INTERACTIVE_SUBCOMMANDS,
};
use crate::patterns::{looks_like_uuid, RE_CODEX_ROLLOUT};
use crate::types::AgentTool;

/// Lines inspected when deciding whether a claude log received user input.
pub const REAL_SESSION_SCAN_LINES: usize = 25;

/// Index file claude keeps next to its session logs.
const SESSIONS_INDEX_FILE: &str = "sessions-index.json";

/// Returns the session id named explicitly on the command line.
pub fn resolve_explicit_id(tokens: &[String], tool: AgentTool) -> Option<String> {
    let is_directive = |token: &str| match tool {
        AgentTool::Claude => token == "--resume" || token == "-r",
        AgentTool::Codex => CODEX_INTERACTIVE_SUBCOMMANDS.contains(token),
    };

    tokens
        .windows(2)
        .find(|pair| is_directive(&pair[0]) && looks_like_uuid(&pair[1]))
        .map(|pair| pair[1].clone())
}

/// Classifies a codex invocation as interactive (worth tracking) or not.
///
/// The first bare token decides: known interactive subcommands and anything
/// unrecognised count as interactive (an unknown bare token is taken to be a
/// prompt for the default TUI mode, which is a heuristic rather than a
/// guarantee). Known one-shot subcommands do not. No subcommand at all is a
/// plain interactive launch.
pub fn is_interactive(tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let rules = FlagRules::for_tool(AgentTool::Codex);
    let tokens = strip_executable(tokens, AgentTool::Codex);

    let mut idx = 0;
    while idx < tokens.len() {
        let token = tokens[idx].as_str();
        if token.starts_with('-') {
            idx += if rules.opts_with_value.contains(token) && idx + 1 < tokens.len() {
                2
            } else {
                1
            };
            continue;
        }
        if CODEX_INTERACTIVE_SUBCOMMANDS.contains(token) {
            return true;
        }
        if CODEX_NON_INTERACTIVE_SUBCOMMANDS.contains(token) {
            return false;
        }
        return true;
    }
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Claude log scan
// ─────────────────────────────────────────────────────────────────────────────

/// Claude stores logs under the cwd with every `/` replaced by `-`.
fn encode_project_path(path: &Path) -> String {
    path.to_string_lossy().replace('/', "-")
}

/// Finds the claude project directory for `cwd`, trying each parent in turn.
pub fn find_project_dir(cwd: &str, projects_dir: &Path) -> Option<PathBuf> {
    if cwd.is_empty() {
        return None;
    }
    let mut path = Some(Path::new(cwd));
    while let Some(current) = path {
        let candidate = projects_dir.join(encode_project_path(current));
        if candidate.is_dir() {
            return Some(candidate);
        }
        path = current.parent();
    }
    None
}

/// True if one of the first `max_lines` entries was written by the user.
///
/// Stubs created on launch but never prompted carry only bookkeeping entries.
pub fn is_real_session(path: &Path, max_lines: usize) -> bool {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    BufReader::new(file)
        .lines()
        .take(max_lines)
        .map_while(|line| line.ok())
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .any(|entry| entry.get("type").and_then(Value::as_str) == Some("user"))
}

/// Returns up to `wanted` unclaimed, real session ids in `project_dir`,
/// most recently modified first.
pub fn resolve_by_log_scan(
    project_dir: &Path,
    wanted: usize,
    claimed: &HashSet<String>,
) -> Vec<String> {
    if wanted == 0 {
        return Vec::new();
    }

    let entries = match fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(error = %err, "Cannot list claude project dir");
            return Vec::new();
        }
    };

    let mut candidates: Vec<(SystemTime, String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == SESSIONS_INDEX_FILE {
                return None;
            }
            let session_id = name.strip_suffix(".jsonl")?.to_string();
            if claimed.contains(&session_id) || !looks_like_uuid(&session_id) {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, session_id, entry.path()))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    candidates
        .into_iter()
        .filter(|(_, _, path)| is_real_session(path, REAL_SESSION_SCAN_LINES))
        .map(|(_, session_id, _)| session_id)
        .take(wanted)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Open-handle inspection
// ─────────────────────────────────────────────────────────────────────────────

/// Supplies the raw open-file listing of a live process (e.g. `lsof -p`).
pub trait OpenFileInspector {
    /// `None` when the process cannot be inspected.
    fn open_files(&self, pid: u32) -> Option<String>;
}

/// Extracts a codex session id from an open-file listing.
pub fn session_id_from_open_files(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter_map(|line| RE_CODEX_ROLLOUT.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .find(|candidate| looks_like_uuid(candidate))
}

/// Resolves a session id from the logs a process holds open.
///
/// Only codex keeps its session log open for the lifetime of the process.
pub fn resolve_by_open_handle(
    inspector: &dyn OpenFileInspector,
    pid: u32,
    tool: AgentTool,
) -> Option<String> {
    if tool != AgentTool::Codex {
        return None;
    }
    let listing = inspector.open_files(pid)?;
    session_id_from_open_files(&listing)
}

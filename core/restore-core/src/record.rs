//! The normalized session record and its on-disk shape.
//!
//! Raw JSON entries (hand-edited restore files, legacy string flags, watcher
//! output from older versions) only ever enter the crate through
//! [`normalize_entry`]. Everything downstream works on [`SessionRecord`].
//!
//! # File Format
//!
//! ```json
//! {
//!   "tool": "claude",
//!   "sessionId": "904135b4-8584-42dd-aeb9-08b920d0e02e",
//!   "cwd": "/Users/me/project",
//!   "flags": ["--model", "sonnet"],
//!   "terminal": "cmux",
//!   "workspaceId": "ws-uuid-1",
//!   "workspaceName": "project",
//!   "surfaceId": "sf-uuid-1",
//!   "surfaceIndex": 0
//! }
//! ```
//!
//! The cmux fields are only written for cmux sessions. A missing `terminal`
//! means Ghostty; Ghostty records never carry an explicit tag.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::command::tokenize;
use crate::patterns::looks_like_uuid;
use crate::types::{AgentTool, TerminalHost};

/// Where a cmux session lived, as last observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxAddress {
    pub workspace_id: Option<String>,
    /// Human workspace title; cmux ids do not survive restarts, titles do.
    pub workspace_name: Option<String>,
    pub surface_id: Option<String>,
    /// Position among the workspace's surfaces; always valid once normalized.
    pub surface_index: u32,
}

/// One restorable agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub tool: AgentTool,
    /// Canonical-UUID session id, or `None` when unresolved.
    pub session_id: Option<String>,
    pub cwd: String,
    /// Replayed verbatim after the resume directive. Never contains resume bits.
    pub flags: Vec<String>,
    /// Present only for cmux sessions.
    pub mux: Option<MuxAddress>,
}

impl SessionRecord {
    pub fn new(tool: AgentTool, session_id: Option<String>, cwd: &str, flags: Vec<String>) -> Self {
        Self {
            tool,
            session_id: session_id.filter(|id| looks_like_uuid(id)),
            cwd: cwd.to_string(),
            flags,
            mux: None,
        }
    }

    pub fn with_mux(mut self, mux: MuxAddress) -> Self {
        self.mux = Some(mux);
        self
    }

    pub fn terminal(&self) -> TerminalHost {
        if self.mux.is_some() {
            TerminalHost::Cmux
        } else {
            TerminalHost::Ghostty
        }
    }

    /// Identity used to match pending records: owning host, tool, session id
    /// and cwd. Records of different hosts never share an identity.
    pub fn identity(&self) -> (TerminalHost, AgentTool, Option<&str>, &str) {
        (self.terminal(), self.tool, self.session_id.as_deref(), self.cwd.as_str())
    }

    pub fn is_restorable(&self) -> bool {
        !self.cwd.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalization
// ─────────────────────────────────────────────────────────────────────────────

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts a list of tokens (dropping non-string and empty items) or a legacy
/// command-line string.
pub fn normalize_flags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => tokenize(s),
        _ => Vec::new(),
    }
}

/// Coerces any surface index representation to a non-negative integer.
///
/// Negative, fractional, non-numeric and missing values all become 0.
pub fn coerce_surface_index(value: Option<&Value>) -> u32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n >= 0)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn is_cmux_tagged(entry: &Value) -> bool {
    entry
        .get("terminal")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<TerminalHost>().ok())
        == Some(TerminalHost::Cmux)
}

/// Reads the cmux address fields of a raw entry.
pub fn mux_address_from_value(entry: &Value) -> MuxAddress {
    MuxAddress {
        workspace_id: non_empty_string(entry.get("workspaceId")),
        workspace_name: non_empty_string(entry.get("workspaceName")),
        surface_id: non_empty_string(entry.get("surfaceId")),
        surface_index: coerce_surface_index(entry.get("surfaceIndex")),
    }
}

/// Turns any raw JSON entry into a structurally valid record.
///
/// Never fails. Records with an empty `cwd` are still returned; callers drop
/// them (see [`SessionRecord::is_restorable`]).
pub fn normalize_entry(entry: &Value) -> SessionRecord {
    let tool = entry
        .get("tool")
        .and_then(Value::as_str)
        .and_then(AgentTool::from_id)
        .unwrap_or_default();

    let session_id = non_empty_string(entry.get("sessionId")).filter(|id| looks_like_uuid(id));

    let cwd = match entry.get("cwd") {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    let mux = is_cmux_tagged(entry).then(|| mux_address_from_value(entry));

    SessionRecord {
        tool,
        session_id,
        cwd,
        flags: normalize_flags(entry.get("flags")),
        mux,
    }
}

/// Normalizes a JSON array of entries, dropping non-objects and records
/// without a working directory. Anything other than an array yields nothing.
pub fn normalize_entries(value: &Value) -> Vec<SessionRecord> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.is_object())
        .map(normalize_entry)
        .filter(SessionRecord::is_restorable)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Serde
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord<'a> {
    tool: AgentTool,
    session_id: Option<&'a str>,
    cwd: &'a str,
    flags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    terminal: Option<TerminalHost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workspace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workspace_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface_index: Option<u32>,
}

impl Serialize for SessionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mux = self.mux.as_ref();
        WireRecord {
            tool: self.tool,
            session_id: self.session_id.as_deref(),
            cwd: &self.cwd,
            flags: &self.flags,
            terminal: mux.map(|_| TerminalHost::Cmux),
            workspace_id: mux.and_then(|m| m.workspace_id.as_deref()),
            workspace_name: mux.and_then(|m| m.workspace_name.as_deref()),
            surface_id: mux.and_then(|m| m.surface_id.as_deref()),
            surface_index: mux.map(|m| m.surface_index),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SessionRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(normalize_entry(&value))
    }
}

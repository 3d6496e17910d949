//! cmux workspace/surface addressing.
//!
//! cmux ids do not survive an app restart but workspace titles do, so a saved
//! record is matched to a live workspace by title and then to a surface by id
//! (when the id is still live) or by position.

use std::collections::{BTreeMap, HashMap};

use fs_err as fs;
use serde_json::Value;

use crate::error::{RestoreError, Result};
use crate::plan::build_shell_command;
use crate::record::{MuxAddress, SessionRecord};
use crate::sessions::ProcessEntry;
use crate::storage::StorageConfig;

/// A live cmux workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub title: String,
    /// Opaque reference passed back to cmux (e.g. `workspace:1`).
    pub handle: String,
}

/// A live surface within a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: Option<String>,
    pub handle: String,
}

/// Introspection and relaunch actions offered by a running cmux.
pub trait MuxAdapter {
    /// Live workspaces, or `None` when cmux cannot be queried.
    fn workspaces(&self) -> Option<Vec<Workspace>>;

    /// Surfaces of one workspace, in cmux's own order.
    fn surfaces(&self, workspace: &Workspace) -> Option<Vec<Surface>>;

    /// Types `text` into a surface. Reports success.
    fn send_text(&self, surface: &Surface, text: &str) -> bool;

    /// Presses a named key (e.g. `enter`) in a surface. Reports success.
    fn send_key(&self, surface: &Surface, key: &str) -> bool;
}

/// Why a record could not be placed this attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressMiss {
    NotMuxRecord,
    NoWorkspaceName,
    Introspection,
    WorkspaceNotFound(String),
    SurfaceOutOfRange { index: u32, available: usize },
}

impl std::fmt::Display for AddressMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressMiss::NotMuxRecord => f.write_str("not a cmux session"),
            AddressMiss::NoWorkspaceName => f.write_str("no workspace name recorded"),
            AddressMiss::Introspection => f.write_str("cmux introspection failed"),
            AddressMiss::WorkspaceNotFound(name) => write!(f, "no workspace titled {:?}", name),
            AddressMiss::SurfaceOutOfRange { index, available } => write!(
                f,
                "surface index {} out of range ({} surfaces)",
                index, available
            ),
        }
    }
}

/// Finds the live surface a saved record belongs to.
///
/// `workspaces` is the live inventory; surfaces are fetched only for the
/// matched workspace.
pub fn resolve_surface(
    adapter: &dyn MuxAdapter,
    workspaces: &[Workspace],
    record: &SessionRecord,
) -> std::result::Result<Surface, AddressMiss> {
    let address = record.mux.as_ref().ok_or(AddressMiss::NotMuxRecord)?;
    let name = address
        .workspace_name
        .as_deref()
        .ok_or(AddressMiss::NoWorkspaceName)?;

    let workspace = workspaces
        .iter()
        .find(|ws| ws.title == name)
        .ok_or_else(|| AddressMiss::WorkspaceNotFound(name.to_string()))?;

    let surfaces = adapter
        .surfaces(workspace)
        .ok_or(AddressMiss::Introspection)?;

    if let Some(surface_id) = address.surface_id.as_deref() {
        if let Some(surface) = surfaces.iter().find(|s| s.id.as_deref() == Some(surface_id)) {
            return Ok(surface.clone());
        }
    }

    let index = address.surface_index;
    surfaces
        .get(index as usize)
        .cloned()
        .ok_or(AddressMiss::SurfaceOutOfRange {
            index,
            available: surfaces.len(),
        })
}

/// Sends the resume command to a surface and submits it.
///
/// Only counts as relaunched when both the text and the key press succeed.
pub fn relaunch_in_surface(
    adapter: &dyn MuxAdapter,
    surface: &Surface,
    record: &SessionRecord,
) -> bool {
    let command = build_shell_command(record);
    if !adapter.send_text(surface, &command) {
        tracing::warn!(surface = %surface.handle, "cmux send failed");
        return false;
    }
    if !adapter.send_key(surface, "enter") {
        tracing::warn!(surface = %surface.handle, "cmux send-key failed");
        return false;
    }
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts the object list from cmux `--json` output.
///
/// Accepts `{ "<key>": [...] }` and a bare array; anything else is empty.
pub fn parse_mux_json(raw: &str, key: &str) -> Vec<Value> {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(mut map)) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        Ok(Value::Array(items)) => items,
        _ => return Vec::new(),
    };
    items.into_iter().filter(Value::is_object).collect()
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `list-workspaces` output → workspaces. Items without a handle are skipped.
pub fn parse_workspaces(raw: &str) -> Vec<Workspace> {
    parse_mux_json(raw, "workspaces")
        .iter()
        .filter_map(|item| {
            let handle = string_field(item, "ref").or_else(|| string_field(item, "id"))?;
            Some(Workspace {
                id: string_field(item, "id").unwrap_or_default(),
                title: string_field(item, "title").unwrap_or_default(),
                handle,
            })
        })
        .collect()
}

/// `list-pane-surfaces` output → surfaces.
pub fn parse_surfaces(raw: &str) -> Vec<Surface> {
    parse_mux_json(raw, "surfaces")
        .iter()
        .filter_map(|item| {
            let id = string_field(item, "id");
            let handle = string_field(item, "ref").or_else(|| id.clone())?;
            Some(Surface { id, handle })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Workspace map
// ─────────────────────────────────────────────────────────────────────────────

/// Reads the persisted workspace id → title map. Missing or corrupt → empty.
pub fn load_workspace_map(config: &StorageConfig) -> HashMap<String, String> {
    let path = config.workspace_map_file();
    let Ok(content) = fs::read_to_string(&path) else {
        return HashMap::new();
    };
    match serde_json::from_str::<HashMap<String, Value>>(&content) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(id, title)| title.as_str().map(|t| (id, t.to_string())))
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "Corrupt cmux workspace map, ignoring");
            HashMap::new()
        }
    }
}

pub fn write_workspace_map(config: &StorageConfig, workspaces: &[Workspace]) -> Result<usize> {
    let map: BTreeMap<&str, &str> = workspaces
        .iter()
        .filter(|ws| !ws.id.is_empty())
        .map(|ws| (ws.id.as_str(), ws.title.as_str()))
        .collect();
    let path = config.workspace_map_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RestoreError::io(format!("creating {}", parent.display()), e))?;
    }
    let content = serde_json::to_string_pretty(&map)
        .map_err(|e| RestoreError::json("serializing workspace map", e))?;
    fs::write(&path, content)
        .map_err(|e| RestoreError::io(format!("writing {}", path.display()), e))?;
    Ok(map.len())
}

/// Refreshes the workspace map from live introspection.
///
/// Returns `Ok(None)` when cmux is not reachable; the existing map is kept.
pub fn update_workspace_map(
    config: &StorageConfig,
    adapter: &dyn MuxAdapter,
) -> Result<Option<usize>> {
    let Some(workspaces) = adapter.workspaces() else {
        tracing::debug!("cmux not reachable, workspace map unchanged");
        return Ok(None);
    };
    let written = write_workspace_map(config, &workspaces)?;
    tracing::info!(workspaces = written, "Updated cmux workspace map");
    Ok(Some(written))
}

/// [`update_workspace_map`] for callers that carry on without a fresh map.
///
/// Failures are logged; the previously stored map stays in place.
pub fn refresh_workspace_map(config: &StorageConfig, adapter: &dyn MuxAdapter) -> Option<usize> {
    match update_workspace_map(config, adapter) {
        Ok(written) => written,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to update cmux workspace map, using stored map");
            None
        }
    }
}

/// Attaches workspace titles and surface positions to cmux observations.
///
/// Surfaces of one workspace are numbered by sorting their ids, so the index
/// does not depend on process discovery order. Unknown workspaces keep no name.
pub fn enrich_with_workspace_names(entries: &mut [ProcessEntry], map: &HashMap<String, String>) {
    let mut by_workspace: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        if let Some(ws) = entry.workspace_id.as_deref().filter(|ws| !ws.is_empty()) {
            by_workspace.entry(ws.to_string()).or_default().push(idx);
        }
    }

    for (workspace_id, mut members) in by_workspace {
        members.sort_by(|a, b| entries[*a].surface_id.cmp(&entries[*b].surface_id));
        let name = map.get(&workspace_id).cloned();
        for (position, idx) in members.into_iter().enumerate() {
            let entry = &mut entries[idx];
            if name.is_some() {
                entry.workspace_name = name.clone();
            }
            entry.surface_index = Some(u32::try_from(position).unwrap_or(u32::MAX));
        }
    }
}

/// The address a record would be restored to, for display.
pub fn describe_address(address: &MuxAddress) -> String {
    format!(
        "{} #{}",
        address.workspace_name.as_deref().unwrap_or("?"),
        address.surface_index
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentTool;
    use std::cell::RefCell;
    use tempfile::tempdir;

    const SID: &str = "904135b4-8584-42dd-aeb9-08b920d0e02e";

    #[derive(Default)]
    struct FakeMux {
        workspaces: Vec<Workspace>,
        surfaces: HashMap<String, Vec<Surface>>,
        fail_text: bool,
        fail_key: bool,
        sent: RefCell<Vec<(String, String)>>,
    }

    impl MuxAdapter for FakeMux {
        fn workspaces(&self) -> Option<Vec<Workspace>> {
            Some(self.workspaces.clone())
        }

        fn surfaces(&self, workspace: &Workspace) -> Option<Vec<Surface>> {
            self.surfaces.get(&workspace.handle).cloned()
        }

        fn send_text(&self, surface: &Surface, text: &str) -> bool {
            self.sent.borrow_mut().push((surface.handle.clone(), text.to_string()));
            !self.fail_text
        }

        fn send_key(&self, surface: &Surface, key: &str) -> bool {
            self.sent.borrow_mut().push((surface.handle.clone(), key.to_string()));
            !self.fail_key
        }
    }

    fn dev_mux(surfaces: Vec<Surface>) -> FakeMux {
        let mut mux = FakeMux {
            workspaces: vec![Workspace {
                id: "ws-1".into(),
                title: "dev".into(),
                handle: "workspace:1".into(),
            }],
            ..Default::default()
        };
        mux.surfaces.insert("workspace:1".into(), surfaces);
        mux
    }

    fn surface(id: Option<&str>, handle: &str) -> Surface {
        Surface {
            id: id.map(str::to_string),
            handle: handle.to_string(),
        }
    }

    fn cmux_record(name: &str, surface_id: Option<&str>, index: u32) -> SessionRecord {
        SessionRecord::new(AgentTool::Claude, Some(SID.into()), "/proj", vec![]).with_mux(
            MuxAddress {
                workspace_id: Some("ws-stale".into()),
                workspace_name: Some(name.into()),
                surface_id: surface_id.map(str::to_string),
                surface_index: index,
            },
        )
    }

    #[test]
    fn test_matches_workspace_by_title_and_surface_by_index() {
        let mux = dev_mux(vec![surface(None, "surface:1"), surface(None, "surface:2")]);
        let ws = mux.workspaces().unwrap();
        let found = resolve_surface(&mux, &ws, &cmux_record("dev", None, 1)).unwrap();
        assert_eq!(found.handle, "surface:2");
    }

    #[test]
    fn test_surface_id_wins_over_stale_index() {
        let mux = dev_mux(vec![
            surface(Some("sf-other"), "surface:1"),
            surface(Some("sf-correct"), "surface:77"),
        ]);
        let ws = mux.workspaces().unwrap();
        let found = resolve_surface(&mux, &ws, &cmux_record("dev", Some("sf-correct"), 5)).unwrap();
        assert_eq!(found.handle, "surface:77");
    }

    #[test]
    fn test_misses_are_explicit() {
        let mux = dev_mux(vec![surface(None, "surface:1")]);
        let ws = mux.workspaces().unwrap();
        assert_eq!(
            resolve_surface(&mux, &ws, &cmux_record("dev", None, 5)),
            Err(AddressMiss::SurfaceOutOfRange { index: 5, available: 1 })
        );
        assert_eq!(
            resolve_surface(&mux, &ws, &cmux_record("prod", None, 0)),
            Err(AddressMiss::WorkspaceNotFound("prod".into()))
        );
        let ghostty = SessionRecord::new(AgentTool::Claude, None, "/p", vec![]);
        assert_eq!(resolve_surface(&mux, &ws, &ghostty), Err(AddressMiss::NotMuxRecord));
    }

    #[test]
    fn test_relaunch_requires_both_actions() {
        let record = cmux_record("dev", None, 0);
        let target = surface(None, "surface:1");

        let ok = dev_mux(vec![]);
        assert!(relaunch_in_surface(&ok, &target, &record));
        let sent = ok.sent.borrow();
        assert_eq!(sent[0].1, format!("cd /proj && claude --resume {SID}"));
        assert_eq!(sent[1].1, "enter");

        let failing_text = FakeMux { fail_text: true, ..Default::default() };
        assert!(!relaunch_in_surface(&failing_text, &target, &record));
        let failing_key = FakeMux { fail_key: true, ..Default::default() };
        assert!(!relaunch_in_surface(&failing_key, &target, &record));
    }

    #[test]
    fn test_parse_mux_json_shapes() {
        let nested = r#"{"workspaces": [{"id": "ws-1", "title": "dev", "ref": "workspace:1"}]}"#;
        assert_eq!(parse_mux_json(nested, "workspaces").len(), 1);
        assert_eq!(parse_mux_json(r#"[{"id": "a"}, 3]"#, "workspaces").len(), 1);
        assert!(parse_mux_json("not json", "workspaces").is_empty());
        assert!(parse_mux_json(r#"{"other": [{}]}"#, "workspaces").is_empty());
        assert!(parse_mux_json(r#""text""#, "workspaces").is_empty());

        let surfaces = parse_surfaces(
            r#"{"surfaces": [{"ref": "surface:1"}, {"id": "sf-2", "ref": "surface:2"}]}"#,
        );
        assert_eq!(
            surfaces,
            vec![surface(None, "surface:1"), surface(Some("sf-2"), "surface:2")]
        );

        let workspaces = parse_workspaces(nested);
        assert_eq!(workspaces[0].title, "dev");
        assert_eq!(workspaces[0].handle, "workspace:1");
    }

    #[test]
    fn test_workspace_map_uses_titles() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::with_root(temp.path().to_path_buf());
        let mux = dev_mux(vec![]);

        assert_eq!(update_workspace_map(&config, &mux).unwrap(), Some(1));
        let map = load_workspace_map(&config);
        assert_eq!(map.get("ws-1").map(String::as_str), Some("dev"));
    }

    #[test]
    fn test_map_refresh_failure_is_not_fatal() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let config = StorageConfig::with_root(blocker.join("root"));
        let mux = dev_mux(vec![]);

        assert!(update_workspace_map(&config, &mux).is_err());
        assert_eq!(refresh_workspace_map(&config, &mux), None);
        assert!(load_workspace_map(&config).is_empty());
    }

    #[test]
    fn test_missing_workspace_map_loads_empty() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::with_root(temp.path().to_path_buf());
        assert!(load_workspace_map(&config).is_empty());
    }

    #[test]
    fn test_enrichment_names_workspaces_and_orders_surfaces_by_id() {
        let entry = |pid: u32, ws: &str, sf: &str| ProcessEntry {
            pid,
            cwd: "/p".into(),
            args: "claude".into(),
            workspace_id: Some(ws.into()),
            surface_id: Some(sf.into()),
            ..Default::default()
        };
        let mut entries = vec![
            entry(1, "ws-1", "sf-b"),
            entry(2, "ws-2", "sf-z"),
            entry(3, "ws-1", "sf-a"),
            ProcessEntry { pid: 4, cwd: "/g".into(), ..Default::default() },
        ];
        let map = HashMap::from([("ws-1".to_string(), "Main".to_string())]);

        enrich_with_workspace_names(&mut entries, &map);

        assert_eq!(entries[0].workspace_name.as_deref(), Some("Main"));
        assert_eq!(entries[0].surface_index, Some(1));
        assert_eq!(entries[2].surface_index, Some(0));
        assert_eq!(entries[1].workspace_name, None);
        assert_eq!(entries[1].surface_index, Some(0));
        assert_eq!(entries[3].surface_index, None);
    }
}

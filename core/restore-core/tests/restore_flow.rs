//! Integration tests for cross-host restore reconciliation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use restore_core::{
    attempt_restore, AgentTool, MuxAdapter, MuxAddress, MuxLauncher, SessionRecord, SessionStore,
    StorageConfig, Surface, TerminalHost, Workspace,
};
use tempfile::tempdir;

const GHOSTTY_SID: &str = "904135b4-8584-42dd-aeb9-08b920d0e02e";
const CODEX_SID: &str = "019c5bce-a952-7380-b204-bfe40bf783b6";
const CMUX_SID: &str = "5b1e0c1e-6f7a-4d2b-9c3e-2a1f0e9d8c7b";
const CMUX_SID_2: &str = "6c2f1d2f-7a8b-4e3c-8d4f-3b2a1f0e9d8c";

/// In-memory cmux with scripted inventories and send results.
#[derive(Default)]
struct FakeMux {
    workspaces: Vec<Workspace>,
    surfaces: HashMap<String, Vec<Surface>>,
    failing_sends: Vec<String>,
    sent: RefCell<Vec<(String, String)>>,
}

impl FakeMux {
    fn with_workspace(mut self, title: &str, handle: &str, surfaces: Vec<Surface>) -> Self {
        self.workspaces.push(Workspace {
            id: format!("live-{title}"),
            title: title.to_string(),
            handle: handle.to_string(),
        });
        self.surfaces.insert(handle.to_string(), surfaces);
        self
    }
}

impl MuxAdapter for FakeMux {
    fn workspaces(&self) -> Option<Vec<Workspace>> {
        Some(self.workspaces.clone())
    }

    fn surfaces(&self, workspace: &Workspace) -> Option<Vec<Surface>> {
        self.surfaces.get(&workspace.handle).cloned()
    }

    fn send_text(&self, surface: &Surface, text: &str) -> bool {
        self.sent
            .borrow_mut()
            .push((surface.handle.clone(), text.to_string()));
        !self.failing_sends.contains(&surface.handle)
    }

    fn send_key(&self, surface: &Surface, key: &str) -> bool {
        self.sent
            .borrow_mut()
            .push((surface.handle.clone(), key.to_string()));
        true
    }
}

fn surface(id: Option<&str>, handle: &str) -> Surface {
    Surface {
        id: id.map(str::to_string),
        handle: handle.to_string(),
    }
}

fn store_in(dir: &Path) -> SessionStore {
    SessionStore::new(StorageConfig::with_root(dir.to_path_buf()))
}

fn ghostty_record(tool: AgentTool, sid: &str, cwd: &str) -> SessionRecord {
    SessionRecord::new(tool, Some(sid.to_string()), cwd, vec![])
}

fn cmux_record(sid: &str, workspace: &str, surface_id: Option<&str>, index: u32) -> SessionRecord {
    SessionRecord::new(AgentTool::Claude, Some(sid.to_string()), "/proj", vec![]).with_mux(
        MuxAddress {
            workspace_id: Some("ws-1".to_string()),
            workspace_name: Some(workspace.to_string()),
            surface_id: surface_id.map(str::to_string),
            surface_index: index,
        },
    )
}

#[test]
fn test_cmux_restore_leaves_ghostty_record_untouched() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    let ghostty = ghostty_record(AgentTool::Claude, GHOSTTY_SID, "/ghostty-proj");
    let cmux = cmux_record(CMUX_SID, "dev", Some("sf-1"), 0);
    store.write_restore_file(&[ghostty.clone(), cmux.clone()]).unwrap();

    let mux = FakeMux::default().with_workspace(
        "dev",
        "workspace:1",
        vec![surface(Some("sf-1"), "surface:1")],
    );
    let mut launcher = MuxLauncher::new(&mux);
    let outcome = attempt_restore(&store, TerminalHost::Cmux, &mut launcher).unwrap();

    assert_eq!(outcome.launched, vec![cmux]);
    assert_eq!(store.load_restore_file(), vec![ghostty]);
}

#[test]
fn test_second_restore_is_noop() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    let ghostty = ghostty_record(AgentTool::Claude, GHOSTTY_SID, "/ghostty-proj");
    let cmux = cmux_record(CMUX_SID, "dev", None, 0);
    store.write_restore_file(&[ghostty.clone(), cmux.clone()]).unwrap();
    store.persist_live_state(&[ghostty.clone(), cmux.clone()]).unwrap();

    let mut launched = Vec::new();
    let mut launcher = |record: &SessionRecord| {
        launched.push(record.clone());
        true
    };
    let first = attempt_restore(&store, TerminalHost::Ghostty, &mut launcher).unwrap();
    assert_eq!(first.launched, vec![ghostty]);

    let restore_path = store.config().restore_file();
    let before = std::fs::read(&restore_path).unwrap();

    let second = attempt_restore(&store, TerminalHost::Ghostty, &mut launcher).unwrap();
    assert!(second.is_noop());
    assert_eq!(std::fs::read(&restore_path).unwrap(), before);
    assert_eq!(store.load_restore_file(), vec![cmux]);
    assert_eq!(launched.len(), 1);
}

#[test]
fn test_partial_ghostty_failure_dedupes_cmux_from_both_files() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    let first = ghostty_record(AgentTool::Claude, GHOSTTY_SID, "/proj");
    let second = ghostty_record(AgentTool::Codex, CODEX_SID, "/proj");
    let cmux = cmux_record(CMUX_SID, "dev", Some("sf-1"), 0);
    let all = [first.clone(), second.clone(), cmux.clone()];
    store.write_restore_file(&all).unwrap();
    store.persist_live_state(&all).unwrap();

    // The first record is handed to the invoking shell; opening tabs fails.
    let mut handed_off = false;
    let mut launcher = |_: &SessionRecord| !std::mem::replace(&mut handed_off, true);
    let outcome = attempt_restore(&store, TerminalHost::Ghostty, &mut launcher).unwrap();

    assert_eq!(outcome.launched, vec![first]);
    assert_eq!(outcome.failed, vec![second.clone()]);
    assert_eq!(store.load_restore_file(), vec![cmux, second]);
    assert!(!store.config().live_state_file().exists());
}

#[test]
fn test_cmux_entries_from_live_state_are_preserved() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    let ghostty = ghostty_record(AgentTool::Claude, GHOSTTY_SID, "/proj");
    let cmux = cmux_record(CMUX_SID, "dev", None, 0);
    store.write_restore_file(&[ghostty.clone()]).unwrap();
    store.persist_live_state(&[cmux.clone()]).unwrap();

    let mut launcher = |_: &SessionRecord| true;
    attempt_restore(&store, TerminalHost::Ghostty, &mut launcher).unwrap();

    assert_eq!(store.load_restore_file(), vec![cmux]);
}

#[test]
fn test_out_of_range_surface_stays_pending() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    let record = cmux_record(CMUX_SID, "dev", None, 5);
    store.write_restore_file(&[record.clone()]).unwrap();

    let mux =
        FakeMux::default().with_workspace("dev", "workspace:1", vec![surface(None, "surface:1")]);
    let mut launcher = MuxLauncher::new(&mux);
    let outcome = attempt_restore(&store, TerminalHost::Cmux, &mut launcher).unwrap();

    assert!(outcome.launched.is_empty());
    assert!(mux.sent.borrow().is_empty());
    assert_eq!(store.load_restore_file(), vec![record]);
}

#[test]
fn test_surface_id_preferred_over_stale_index() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    store
        .write_restore_file(&[cmux_record(CMUX_SID, "dev", Some("sf-correct"), 5)])
        .unwrap();

    let mux = FakeMux::default().with_workspace(
        "dev",
        "workspace:1",
        vec![surface(Some("sf-correct"), "surface:77")],
    );
    let mut launcher = MuxLauncher::new(&mux);
    let outcome = attempt_restore(&store, TerminalHost::Cmux, &mut launcher).unwrap();

    assert_eq!(outcome.launched.len(), 1);
    let sent = mux.sent.borrow();
    assert_eq!(sent[0].0, "surface:77");
    assert_eq!(sent[0].1, format!("cd /proj && claude --resume {CMUX_SID}"));
    assert_eq!(sent[1], ("surface:77".to_string(), "enter".to_string()));
    assert!(!store.config().restore_file().exists());
}

#[test]
fn test_failed_send_and_missing_workspace_stay_pending() {
    let temp = tempdir().unwrap();
    let store = store_in(temp.path());
    let ok = cmux_record(CMUX_SID, "dev", None, 0);
    let failing = cmux_record(CMUX_SID_2, "dev", None, 1);
    let mut missing = cmux_record(CMUX_SID, "gone", None, 0);
    missing.cwd = "/elsewhere".to_string();
    store
        .write_restore_file(&[ok.clone(), failing.clone(), missing.clone()])
        .unwrap();

    let mut mux = FakeMux::default().with_workspace(
        "dev",
        "workspace:1",
        vec![surface(None, "surface:1"), surface(None, "surface:2")],
    );
    mux.failing_sends.push("surface:2".to_string());
    let mut launcher = MuxLauncher::new(&mux);
    let outcome = attempt_restore(&store, TerminalHost::Cmux, &mut launcher).unwrap();

    assert_eq!(outcome.launched, vec![ok]);
    assert_eq!(store.load_restore_file(), vec![failing, missing]);
}

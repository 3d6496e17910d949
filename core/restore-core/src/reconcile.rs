//! Shutdown scoping and restore reconciliation.
//!
//! Ghostty and cmux shut down independently. A save is scoped to the host
//! that went away, and a restore only ever consumes records of the host that
//! invoked it. Everything not confirmed launched stays in the Restore-File.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::mux::{relaunch_in_surface, resolve_surface, MuxAdapter, Workspace};
use crate::record::SessionRecord;
use crate::store::{dedupe_records, merge_records, SessionStore};
use crate::types::TerminalHost;

/// Save scope for a set of hosts that just closed.
///
/// Exactly one closed host scopes the save to it. Both closing within the
/// same poll (or none) saves everything.
pub fn scope_for_closed_hosts(closed: &BTreeSet<TerminalHost>) -> Option<TerminalHost> {
    let mut hosts = closed.iter();
    match (hosts.next(), hosts.next()) {
        (Some(host), None) => Some(*host),
        _ => None,
    }
}

/// Whether a stopping watcher should still save: some host is running, or
/// the last poll saw sessions.
pub fn should_save_on_shutdown(any_host_running: bool, last_snapshot_has_sessions: bool) -> bool {
    any_host_running || last_snapshot_has_sessions
}

/// Performs one relaunch. Returns `true` only when the session is confirmed
/// running again.
pub trait Launcher {
    fn launch(&mut self, record: &SessionRecord) -> bool;
}

impl<F> Launcher for F
where
    F: FnMut(&SessionRecord) -> bool,
{
    fn launch(&mut self, record: &SessionRecord) -> bool {
        self(record)
    }
}

/// Result of one restore attempt for a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub launched: Vec<SessionRecord>,
    /// This host's records that failed and remain pending.
    pub failed: Vec<SessionRecord>,
    /// Records of the other host carried forward untouched.
    pub preserved: Vec<SessionRecord>,
}

impl RestoreOutcome {
    pub fn is_noop(&self) -> bool {
        self.launched.is_empty() && self.failed.is_empty()
    }
}

fn for_host(records: &[SessionRecord], host: TerminalHost) -> Vec<SessionRecord> {
    records.iter().filter(|r| r.terminal() == host).cloned().collect()
}

/// Picks the records `host` should restore: its Restore-File entries, or its
/// Live-State entries when nothing was saved for it.
fn targets_for_host(
    planned: &[SessionRecord],
    live: &[SessionRecord],
    host: TerminalHost,
) -> Vec<SessionRecord> {
    let saved = for_host(planned, host);
    let source = if saved.is_empty() {
        for_host(live, host)
    } else {
        saved
    };
    dedupe_records(source)
}

/// Records `host` would restore right now.
pub fn pending_for_host(store: &SessionStore, host: TerminalHost) -> Vec<SessionRecord> {
    targets_for_host(&store.load_restore_file(), &store.load_live_state(), host)
}

/// Relaunches every pending record of `host` through `launcher`.
///
/// Only launched records leave the Restore-File. Failed records of `host`
/// and every record of the other host (from either state file) are written
/// back; the consumed Live-State file is removed. With nothing pending for
/// `host` no file is touched.
pub fn attempt_restore(
    store: &SessionStore,
    host: TerminalHost,
    launcher: &mut dyn Launcher,
) -> Result<RestoreOutcome> {
    let planned = store.load_restore_file();
    let live = store.load_live_state();

    let targets = targets_for_host(&planned, &live, host);
    if targets.is_empty() {
        tracing::debug!(host = %host, "Nothing pending to restore");
        return Ok(RestoreOutcome::default());
    }

    let other = host.other();
    let preserved = merge_records(for_host(&planned, other), &for_host(&live, other));

    let mut outcome = RestoreOutcome {
        preserved,
        ..Default::default()
    };
    for record in targets {
        if launcher.launch(&record) {
            tracing::info!(
                host = %host,
                tool = %record.tool,
                cwd = %record.cwd,
                "Restored session"
            );
            outcome.launched.push(record);
        } else {
            tracing::warn!(
                host = %host,
                tool = %record.tool,
                cwd = %record.cwd,
                "Restore failed, keeping pending"
            );
            outcome.failed.push(record);
        }
    }

    let mut kept = outcome.preserved.clone();
    kept.extend(outcome.failed.iter().cloned());
    store.write_restore_file(&kept)?;
    store.remove_live_state()?;

    tracing::info!(
        host = %host,
        launched = outcome.launched.len(),
        failed = outcome.failed.len(),
        preserved = outcome.preserved.len(),
        "Restore attempt finished"
    );
    Ok(outcome)
}

/// Relaunches cmux records in their original workspace surface.
///
/// The workspace inventory is fetched once per attempt.
pub struct MuxLauncher<'a> {
    adapter: &'a dyn MuxAdapter,
    workspaces: Option<Vec<Workspace>>,
}

impl<'a> MuxLauncher<'a> {
    pub fn new(adapter: &'a dyn MuxAdapter) -> Self {
        MuxLauncher {
            adapter,
            workspaces: None,
        }
    }

    fn workspaces(&mut self) -> Option<&[Workspace]> {
        if self.workspaces.is_none() {
            self.workspaces = self.adapter.workspaces();
        }
        self.workspaces.as_deref()
    }
}

impl Launcher for MuxLauncher<'_> {
    fn launch(&mut self, record: &SessionRecord) -> bool {
        let adapter = self.adapter;
        let Some(workspaces) = self.workspaces() else {
            tracing::warn!("cmux workspace listing unavailable");
            return false;
        };
        match resolve_surface(adapter, workspaces, record) {
            Ok(surface) => relaunch_in_surface(adapter, &surface, record),
            Err(miss) => {
                tracing::info!(
                    cwd = %record.cwd,
                    reason = %miss,
                    "cmux session not restorable yet"
                );
                false
            }
        }
    }
}

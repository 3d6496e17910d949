//! The polling loop that keeps live state current and saves on shutdown.
//!
//! Each poll:
//!
//! 1. Asks the [`HostProbe`] which hosts are running.
//! 2. If a host disappeared since the last poll, saves the live state it left
//!    behind (scoped to that host when it closed alone).
//! 3. Observes agent processes in the running hosts, names their cmux
//!    workspaces (refreshing the workspace map when an id is unknown),
//!    resolves them and writes the snapshot and live-state files.
//! 4. Sleeps through the [`Clock`].
//!
//! The loop checks its stop flag between polls only; a poll is never cut short.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::identity::OpenFileInspector;
use crate::mux::{
    enrich_with_workspace_names, load_workspace_map, refresh_workspace_map, MuxAdapter,
};
use crate::reconcile::{scope_for_closed_hosts, should_save_on_shutdown};
use crate::sessions::{attach_open_handle_ids, resolve_sessions, ProcessEntry};
use crate::store::{SaveSummary, SessionStore};
use crate::types::TerminalHost;

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    /// How long sessions must stay gone before live state is cleared.
    pub empty_grace: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            poll_interval: Duration::from_secs(2),
            empty_grace: Duration::from_secs(30),
        }
    }
}

/// Time source for the loop.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&mut self, duration: Duration);
}

/// Wall clock and real sleeps.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Observes the running terminal hosts and the agent processes inside them.
pub trait HostProbe {
    fn active_hosts(&mut self) -> BTreeSet<TerminalHost>;

    /// Agent processes running inside any of `hosts`.
    fn entries_for(&mut self, hosts: &BTreeSet<TerminalHost>) -> Vec<ProcessEntry>;
}

/// True once sessions have been absent for the whole grace period and the
/// live-state file has not been cleared yet.
pub fn should_clear_live_state(
    empty_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    already_cleared: bool,
    grace: Duration,
) -> bool {
    if already_cleared {
        return false;
    }
    let Some(start) = empty_since else {
        return false;
    };
    (now - start)
        .to_std()
        .map(|elapsed| elapsed >= grace)
        .unwrap_or(false)
}

/// Per-poll summary line. Unresolved codex pids are only mentioned when they
/// differ from the previous poll's.
pub fn snapshot_log_message(total: usize, unresolved: &[u32], previous: &[u32]) -> String {
    let mut message = format!("Snapshot: {} session(s)", total);
    if !unresolved.is_empty() && unresolved != previous {
        message.push_str(&format!(", {} codex unresolved", unresolved.len()));
    }
    message
}

/// What one poll did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub active_hosts: BTreeSet<TerminalHost>,
    pub closed_hosts: BTreeSet<TerminalHost>,
    pub saved: Option<SaveSummary>,
    pub sessions: usize,
    pub live_state_cleared: bool,
}

pub struct Watcher<P, C> {
    store: SessionStore,
    config: WatcherConfig,
    probe: P,
    clock: C,
    inspector: Option<Box<dyn OpenFileInspector>>,
    mux: Option<Box<dyn MuxAdapter>>,
    /// Workspace ids a map refresh was already attempted for.
    refreshed_workspaces: HashSet<String>,
    previous_hosts: BTreeSet<TerminalHost>,
    empty_since: Option<DateTime<Utc>>,
    live_cleared: bool,
    unresolved_codex: Vec<u32>,
}

impl<P: HostProbe, C: Clock> Watcher<P, C> {
    pub fn new(store: SessionStore, config: WatcherConfig, probe: P, clock: C) -> Self {
        Watcher {
            store,
            config,
            probe,
            clock,
            inspector: None,
            mux: None,
            refreshed_workspaces: HashSet::new(),
            previous_hosts: BTreeSet::new(),
            empty_since: None,
            live_cleared: false,
            unresolved_codex: Vec::new(),
        }
    }

    /// Resolves codex session ids from open rollout logs.
    pub fn with_inspector(mut self, inspector: Box<dyn OpenFileInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Refreshes the cmux workspace map when a session shows up in a
    /// workspace the map does not know yet.
    pub fn with_mux_adapter(mut self, adapter: Box<dyn MuxAdapter>) -> Self {
        self.mux = Some(adapter);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn poll_once(&mut self) -> Result<PollReport> {
        let active = self.probe.active_hosts();
        let closed: BTreeSet<TerminalHost> =
            self.previous_hosts.difference(&active).copied().collect();

        let saved = if closed.is_empty() {
            None
        } else {
            let scope = scope_for_closed_hosts(&closed);
            tracing::info!(
                closed = ?closed,
                scope = ?scope,
                "Terminal host closed, saving sessions"
            );
            Some(self.store.save_sessions(scope)?)
        };
        self.previous_hosts = active.clone();

        let mut entries = if active.is_empty() {
            Vec::new()
        } else {
            self.probe.entries_for(&active)
        };

        let mut unresolved = match &self.inspector {
            Some(inspector) => attach_open_handle_ids(&mut entries, inspector.as_ref()),
            None => Vec::new(),
        };
        unresolved.sort_unstable();

        if entries.iter().any(|e| e.workspace_id.is_some()) {
            let map = self.workspace_map(&entries);
            enrich_with_workspace_names(&mut entries, &map);
        }

        self.store.write_snapshot(&entries)?;
        let records = resolve_sessions(&entries, self.store.config().claude_projects_dir());
        self.store.persist_live_state(&records)?;

        let live_state_cleared = self.track_empty_period(records.is_empty())?;

        let message = snapshot_log_message(records.len(), &unresolved, &self.unresolved_codex);
        tracing::debug!(pids = ?unresolved, "{}", message);
        self.unresolved_codex = unresolved;

        Ok(PollReport {
            active_hosts: active,
            closed_hosts: closed,
            saved,
            sessions: records.len(),
            live_state_cleared,
        })
    }

    /// Stored workspace map, refreshed once per unknown workspace id.
    fn workspace_map(&mut self, entries: &[ProcessEntry]) -> HashMap<String, String> {
        let map = load_workspace_map(self.store.config());
        let Some(adapter) = self.mux.as_deref() else {
            return map;
        };
        let unknown: BTreeSet<&str> = entries
            .iter()
            .filter_map(|e| e.workspace_id.as_deref())
            .filter(|id| !id.is_empty() && !map.contains_key(*id))
            .filter(|id| !self.refreshed_workspaces.contains(*id))
            .collect();
        if unknown.is_empty() {
            return map;
        }
        self.refreshed_workspaces.extend(unknown.iter().map(|id| id.to_string()));

        match refresh_workspace_map(self.store.config(), adapter) {
            Some(count) => {
                tracing::debug!(
                    unknown = ?unknown,
                    workspaces = count,
                    "Refreshed cmux workspace map"
                );
                load_workspace_map(self.store.config())
            }
            None => map,
        }
    }

    fn track_empty_period(&mut self, empty: bool) -> Result<bool> {
        if !empty {
            self.empty_since = None;
            self.live_cleared = false;
            return Ok(false);
        }
        let now = self.clock.now();
        let since = *self.empty_since.get_or_insert(now);
        if should_clear_live_state(Some(since), now, self.live_cleared, self.config.empty_grace) {
            self.store.clear_live_state()?;
            self.live_cleared = true;
            tracing::info!("No sessions for the grace period, cleared live state");
            return Ok(true);
        }
        Ok(false)
    }

    /// Polls until `stop` is set, then performs a final unscoped save when
    /// anything is still worth saving.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        tracing::info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            root = %self.store.config().root().display(),
            "Session watcher started"
        );

        while !stop.load(Ordering::SeqCst) {
            if let Err(err) = self.poll_once() {
                tracing::warn!(error = %err, "Poll failed");
            }
            self.clock.sleep(self.config.poll_interval);
        }

        let any_running = !self.probe.active_hosts().is_empty();
        let has_sessions = !self.store.load_snapshot().is_empty();
        if should_save_on_shutdown(any_running, has_sessions) {
            let summary = self.store.save_sessions(None)?;
            tracing::info!(total = summary.total, "Final save on watcher shutdown");
        }
        tracing::info!("Session watcher stopped");
        Ok(())
    }
}

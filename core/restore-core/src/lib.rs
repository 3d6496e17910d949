//! # restore-core
//!
//! Session identity and restore reconciliation for `claude` and `codex`
//! sessions running in Ghostty or cmux.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The watcher is a plain polling loop.
//! - **Explicit configuration**: Every file location comes from a
//!   [`StorageConfig`] value; nothing reads process-wide paths.
//! - **Graceful degradation**: Missing or corrupt files read as empty,
//!   malformed fields degrade to defaults, failed external calls leave a
//!   record unresolved or pending. Only writes return errors.
//! - **Never lose a pending session**: A record leaves the restore plan only
//!   after a confirmed relaunch.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restore_core::{attempt_restore, SessionStore, StorageConfig, TerminalHost};
//!
//! let store = SessionStore::new(StorageConfig::from_env()?);
//! let mut launch = |record: &SessionRecord| open_tab(&build_shell_command(record));
//! let outcome = attempt_restore(&store, TerminalHost::Ghostty, &mut launch)?;
//! ```

// Public modules
pub mod command;
pub mod error;
pub mod identity;
pub mod mux;
pub mod patterns;
pub mod plan;
pub mod reconcile;
pub mod record;
pub mod sessions;
pub mod storage;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export commonly used items at crate root
pub use command::{extract_flags, extract_flags_from_args, tokenize};
pub use error::{RestoreError, Result};
pub use identity::{
    is_interactive, resolve_by_log_scan, resolve_by_open_handle, resolve_explicit_id,
    OpenFileInspector,
};
pub use mux::{
    enrich_with_workspace_names, parse_mux_json, refresh_workspace_map, update_workspace_map,
    AddressMiss, MuxAdapter, Surface, Workspace,
};
pub use plan::{build_restore_argv, build_shell_command};
pub use reconcile::{
    attempt_restore, pending_for_host, scope_for_closed_hosts, should_save_on_shutdown, Launcher,
    MuxLauncher, RestoreOutcome,
};
pub use record::{normalize_entry, MuxAddress, SessionRecord};
pub use sessions::{resolve_sessions, ProcessEntry};
pub use storage::StorageConfig;
pub use store::{SaveSummary, SessionStore};
pub use types::{AgentTool, TerminalHost};
pub use watcher::{Clock, HostProbe, PollReport, SystemClock, Watcher, WatcherConfig};

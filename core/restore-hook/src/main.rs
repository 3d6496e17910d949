//! session-restore: keeps agent CLI sessions alive across terminal restarts.
//!
//! ## Subcommands
//!
//! - `watch`: Poll running sessions and save them when Ghostty or cmux quits
//! - `restore`: Relaunch pending sessions (`--auto` for Ghostty, `--cmux` for cmux)
//! - `save`: Save observed sessions now, optionally for one terminal
//! - `show`: Print the pending restore plan
//! - `update-mux-map`: Refresh the cmux workspace id → title map

mod cmux;
mod ghostty;
mod inventory;
mod logging;
mod lsof;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use restore_core::mux::describe_address;
use restore_core::{
    attempt_restore, build_shell_command, pending_for_host, refresh_workspace_map,
    update_workspace_map, MuxLauncher, RestoreError, Result, SessionStore, StorageConfig,
    SystemClock, TerminalHost, Watcher, WatcherConfig,
};

use crate::cmux::CommandMuxAdapter;
use crate::ghostty::{HandoffLauncher, TabLauncher};
use crate::inventory::SysinfoProbe;
use crate::lsof::LsofInspector;

const COMMAND_LOG_NAME: &str = "session-restore.log";

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "session-restore")]
#[command(about = "Save and restore agent CLI sessions across Ghostty and cmux restarts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch running sessions and save them when a terminal quits
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Seconds without sessions before live state is cleared
        #[arg(long, default_value_t = 30)]
        grace: u64,
    },

    /// Relaunch pending sessions
    Restore {
        /// Ghostty startup mode: print the first session as JSON, open tabs for the rest
        #[arg(long)]
        auto: bool,

        /// Restore cmux sessions into their original workspace surfaces
        #[arg(long)]
        cmux: bool,
    },

    /// Save observed sessions to the restore plan now
    Save {
        /// Only save sessions of this terminal (ghostty or cmux)
        #[arg(long, value_name = "TERMINAL")]
        terminal: Option<TerminalHost>,
    },

    /// Print pending sessions and the commands that would resume them
    Show,

    /// Refresh the cmux workspace map from the running cmux
    UpdateMuxMap,
}

fn main() {
    let cli = Cli::parse();

    let config = match StorageConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("session-restore: {}", e);
            std::process::exit(1);
        }
    };

    let log_name = match cli.command {
        Commands::Watch { .. } => config.watcher_log_name(),
        _ => COMMAND_LOG_NAME,
    };
    let _logging_guard = logging::init(&config.log_dir(), log_name);

    let store = SessionStore::new(config);
    let result = match cli.command {
        Commands::Watch { interval, grace } => run_watch(store, interval, grace),
        Commands::Restore { auto, cmux } => run_restore(&store, auto, cmux),
        Commands::Save { terminal } => run_save(&store, terminal),
        Commands::Show => run_show(&store),
        Commands::UpdateMuxMap => run_update_mux_map(&store),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "session-restore failed");
        eprintln!("session-restore: {}", e);
        std::process::exit(1);
    }
}

extern "C" fn request_stop(_signal: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_stop_handlers() {
    let handler = request_stop as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGHUP, handler);
    }
}

fn run_watch(store: SessionStore, interval: u64, grace: u64) -> Result<()> {
    install_stop_handlers();
    let config = WatcherConfig {
        poll_interval: std::time::Duration::from_secs(interval.max(1)),
        empty_grace: std::time::Duration::from_secs(grace),
    };
    let mut watcher = Watcher::new(store, config, SysinfoProbe::new(), SystemClock)
        .with_inspector(Box::new(LsofInspector))
        .with_mux_adapter(Box::new(CommandMuxAdapter));
    watcher.run(&STOP_REQUESTED)
}

fn run_restore(store: &SessionStore, auto: bool, cmux: bool) -> Result<()> {
    if auto && cmux {
        return Err(RestoreError::ConflictingFlags(
            "--auto and --cmux cannot be combined".to_string(),
        ));
    }

    let outcome = if cmux {
        let adapter = CommandMuxAdapter;
        refresh_workspace_map(store.config(), &adapter);
        let mut launcher = MuxLauncher::new(&adapter);
        attempt_restore(store, TerminalHost::Cmux, &mut launcher)?
    } else if auto {
        let mut launcher = HandoffLauncher::new(io::stdout().lock(), TabLauncher);
        attempt_restore(store, TerminalHost::Ghostty, &mut launcher)?
    } else {
        let mut launcher = TabLauncher;
        attempt_restore(store, TerminalHost::Ghostty, &mut launcher)?
    };

    if !outcome.is_noop() {
        tracing::info!(
            launched = outcome.launched.len(),
            pending = outcome.failed.len(),
            "Restore complete"
        );
    }
    Ok(())
}

fn run_save(store: &SessionStore, terminal: Option<TerminalHost>) -> Result<()> {
    let summary = store.save_sessions(terminal)?;
    println!(
        "Saved {} session(s): {} resumable, {} continue",
        summary.total, summary.resumed, summary.continued
    );
    Ok(())
}

fn run_show(store: &SessionStore) -> Result<()> {
    let mut any = false;
    for host in [TerminalHost::Ghostty, TerminalHost::Cmux] {
        let pending = pending_for_host(store, host);
        if pending.is_empty() {
            continue;
        }
        any = true;
        println!("{} ({} pending)", host, pending.len());
        for record in &pending {
            let session = record.session_id.as_deref().unwrap_or("(unresolved)");
            match &record.mux {
                Some(address) => println!(
                    "  {} {} [{}]",
                    record.tool,
                    session,
                    describe_address(address)
                ),
                None => println!("  {} {}", record.tool, session),
            }
            println!("    {}", build_shell_command(record));
        }
    }
    if !any {
        println!("No sessions pending restore");
    }
    Ok(())
}

fn run_update_mux_map(store: &SessionStore) -> Result<()> {
    match update_workspace_map(store.config(), &CommandMuxAdapter)? {
        Some(count) => println!("Mapped {} cmux workspace(s)", count),
        None => tracing::info!("cmux not running, workspace map unchanged"),
    }
    Ok(())
}

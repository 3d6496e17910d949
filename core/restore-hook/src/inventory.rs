//! Live process inventory backed by sysinfo.
//!
//! Hosts are detected by process name. An agent process belongs to cmux when
//! its environment carries both cmux ids, otherwise to Ghostty when
//! `TERM_PROGRAM` says so; agents in any other terminal are ignored.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use restore_core::{AgentTool, HostProbe, ProcessEntry, TerminalHost};
use sysinfo::{Pid, Process, ProcessRefreshKind, System, UpdateKind};

const CMUX_WORKSPACE_VAR: &str = "CMUX_WORKSPACE_ID";
const CMUX_SURFACE_VAR: &str = "CMUX_SURFACE_ID";
const TERM_PROGRAM_VAR: &str = "TERM_PROGRAM";

/// Where an agent process is running, read from its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Ghostty,
    Cmux {
        workspace_id: String,
        surface_id: String,
    },
}

impl Placement {
    pub fn host(&self) -> TerminalHost {
        match self {
            Placement::Ghostty => TerminalHost::Ghostty,
            Placement::Cmux { .. } => TerminalHost::Cmux,
        }
    }
}

fn env_value<'a>(environ: &'a [String], key: &str) -> Option<&'a str> {
    environ.iter().find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key && !value.is_empty()).then_some(value)
    })
}

pub fn placement_from_environ(environ: &[String]) -> Option<Placement> {
    if let (Some(workspace_id), Some(surface_id)) = (
        env_value(environ, CMUX_WORKSPACE_VAR),
        env_value(environ, CMUX_SURFACE_VAR),
    ) {
        return Some(Placement::Cmux {
            workspace_id: workspace_id.to_string(),
            surface_id: surface_id.to_string(),
        });
    }
    env_value(environ, TERM_PROGRAM_VAR)
        .filter(|program| program.eq_ignore_ascii_case("ghostty"))
        .map(|_| Placement::Ghostty)
}

pub fn host_for_process_name(name: &str) -> Option<TerminalHost> {
    match name.to_ascii_lowercase().as_str() {
        "ghostty" => Some(TerminalHost::Ghostty),
        "cmux" => Some(TerminalHost::Cmux),
        _ => None,
    }
}

fn basename(token: &str) -> &str {
    Path::new(token)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(token)
}

/// The agent a process runs, by process name or by one of the first two
/// argv entries (agents launched through `node` keep their name in argv[1]).
pub fn agent_tool_for(name: &str, cmd: &[String]) -> Option<AgentTool> {
    std::iter::once(name)
        .chain(cmd.iter().take(2).map(|arg| basename(arg)))
        .find_map(|candidate| match candidate {
            "claude" => Some(AgentTool::Claude),
            "codex" => Some(AgentTool::Codex),
            _ => None,
        })
}

/// Reads hosts and agent processes from the OS process table.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        SysinfoProbe {
            system: System::new(),
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_environ(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::Always),
        );
    }

    fn entry_for(
        pid: Pid,
        process: &Process,
        tool: AgentTool,
        placement: Placement,
    ) -> Option<ProcessEntry> {
        let cwd = process.cwd()?.to_string_lossy().to_string();
        let (workspace_id, surface_id) = match placement {
            Placement::Ghostty => (None, None),
            Placement::Cmux {
                workspace_id,
                surface_id,
            } => (Some(workspace_id), Some(surface_id)),
        };
        Some(ProcessEntry {
            pid: pid.as_u32(),
            cwd,
            args: shell_words::join(process.cmd()),
            tool: Some(tool.id().to_string()),
            workspace_id,
            surface_id,
            ..Default::default()
        })
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn active_hosts(&mut self) -> BTreeSet<TerminalHost> {
        self.refresh();
        self.system
            .processes()
            .values()
            .filter_map(|process| host_for_process_name(process.name()))
            .collect()
    }

    fn entries_for(&mut self, hosts: &BTreeSet<TerminalHost>) -> Vec<ProcessEntry> {
        self.refresh();

        let candidates: Vec<(Pid, &Process, AgentTool, Placement)> = self
            .system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let tool = agent_tool_for(process.name(), process.cmd())?;
                let placement = placement_from_environ(process.environ())?;
                hosts
                    .contains(&placement.host())
                    .then_some((*pid, process, tool, placement))
            })
            .collect();

        // Helpers spawned by an agent inherit its environment; keep the root.
        let agent_pids: HashSet<Pid> = candidates.iter().map(|(pid, ..)| *pid).collect();

        let mut entries: Vec<ProcessEntry> = candidates
            .into_iter()
            .filter(|(_, process, ..)| {
                process
                    .parent()
                    .map_or(true, |parent| !agent_pids.contains(&parent))
            })
            .filter_map(|(pid, process, tool, placement)| {
                Self::entry_for(pid, process, tool, placement)
            })
            .collect();
        entries.sort_by_key(|entry| entry.pid);
        entries
    }
}

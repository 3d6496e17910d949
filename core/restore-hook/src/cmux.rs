//! cmux CLI adapter.

use std::process::Command;

use restore_core::error::{RestoreError, Result};
use restore_core::mux::{parse_surfaces, parse_workspaces};
use restore_core::{MuxAdapter, Surface, Workspace};

/// Talks to a running cmux through its command-line client.
#[derive(Debug, Clone, Default)]
pub struct CommandMuxAdapter;

fn run_cmux<const N: usize>(args: [&str; N]) -> Result<String> {
    let command = format!("cmux {}", args.join(" "));
    let output = Command::new("cmux")
        .args(args)
        .output()
        .map_err(|err| RestoreError::CommandFailed {
            command: command.clone(),
            details: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(RestoreError::CommandFailed {
            command,
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

impl MuxAdapter for CommandMuxAdapter {
    fn workspaces(&self) -> Option<Vec<Workspace>> {
        match run_cmux(["--json", "--id-format", "both", "list-workspaces"]) {
            Ok(raw) => Some(parse_workspaces(&raw)),
            Err(err) => {
                tracing::debug!(error = %err, "cmux workspace listing failed");
                None
            }
        }
    }

    fn surfaces(&self, workspace: &Workspace) -> Option<Vec<Surface>> {
        match run_cmux(["--json", "list-pane-surfaces", "--workspace", &workspace.handle]) {
            Ok(raw) => Some(parse_surfaces(&raw)),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    workspace = %workspace.title,
                    "cmux surface listing failed"
                );
                None
            }
        }
    }

    fn send_text(&self, surface: &Surface, text: &str) -> bool {
        run_cmux(["send", "--surface", &surface.handle, text])
            .map_err(|err| tracing::warn!(error = %err, "cmux send failed"))
            .is_ok()
    }

    fn send_key(&self, surface: &Surface, key: &str) -> bool {
        run_cmux(["send-key", "--surface", &surface.handle, key])
            .map_err(|err| tracing::warn!(error = %err, "cmux send-key failed"))
            .is_ok()
    }
}

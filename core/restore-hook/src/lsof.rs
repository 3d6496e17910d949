//! Open-file inspection through `lsof`.

use std::process::Command;

use restore_core::OpenFileInspector;

#[derive(Debug, Clone, Default)]
pub struct LsofInspector;

impl OpenFileInspector for LsofInspector {
    fn open_files(&self, pid: u32) -> Option<String> {
        let output = Command::new("lsof")
            .args(["-n", "-P", "-p", &pid.to_string(), "-Fn"])
            .output();
        match output {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                tracing::debug!(pid, status = ?output.status.code(), "lsof returned no listing");
                None
            }
            Err(err) => {
                tracing::debug!(pid, error = %err, "lsof unavailable");
                None
            }
        }
    }
}

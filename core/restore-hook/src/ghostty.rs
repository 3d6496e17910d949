//! Ghostty relaunch: stdout handoff for the invoking shell, new tabs for the rest.

use std::io::Write;
use std::process::Command;

use restore_core::{build_shell_command, Launcher, SessionRecord};

/// Quotes `text` as an AppleScript string literal.
pub fn applescript_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// AppleScript that opens a new Ghostty tab and runs `command` in it.
pub fn new_tab_script(command: &str) -> String {
    format!(
        r#"tell application "Ghostty" to activate
tell application "System Events"
    keystroke "t" using command down
    delay 0.4
    keystroke {}
    key code 36
end tell"#,
        applescript_string(command)
    )
}

/// Opens each record in a new Ghostty tab via `osascript`.
#[derive(Debug, Default)]
pub struct TabLauncher;

impl Launcher for TabLauncher {
    fn launch(&mut self, record: &SessionRecord) -> bool {
        let script = new_tab_script(&build_shell_command(record));
        match Command::new("osascript").args(["-e", &script]).output() {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    status = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "osascript failed to open tab"
                );
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "osascript unavailable");
                false
            }
        }
    }
}

/// `restore --auto`: the first record is written to `out` as JSON for the
/// invoking shell to exec; the rest go to new tabs.
pub struct HandoffLauncher<W: Write, L: Launcher> {
    out: W,
    tabs: L,
    handed_off: bool,
}

impl<W: Write, L: Launcher> HandoffLauncher<W, L> {
    pub fn new(out: W, tabs: L) -> Self {
        HandoffLauncher {
            out,
            tabs,
            handed_off: false,
        }
    }
}

impl<W: Write, L: Launcher> Launcher for HandoffLauncher<W, L> {
    fn launch(&mut self, record: &SessionRecord) -> bool {
        if self.handed_off {
            return self.tabs.launch(record);
        }
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize session for handoff");
                return false;
            }
        };
        if let Err(err) = writeln!(self.out, "{}", payload).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %err, "Failed to hand off session");
            return false;
        }
        self.handed_off = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restore_core::AgentTool;

    #[test]
    fn test_applescript_quoting() {
        assert_eq!(applescript_string("plain"), "\"plain\"");
        assert_eq!(
            applescript_string(r#"cd '/a b' && say "hi\n""#),
            r#""cd '/a b' && say \"hi\\n\"""#
        );
    }

    #[test]
    fn test_handoff_prints_first_and_delegates_rest() {
        let first = SessionRecord::new(
            AgentTool::Claude,
            Some("904135b4-8584-42dd-aeb9-08b920d0e02e".into()),
            "/p",
            vec!["--model".into(), "sonnet".into()],
        );
        let second = SessionRecord::new(AgentTool::Codex, None, "/q", vec![]);

        let mut tabs_seen = Vec::new();
        let mut out = Vec::new();
        {
            let tabs = |record: &SessionRecord| {
                tabs_seen.push(record.cwd.clone());
                false
            };
            let mut launcher = HandoffLauncher::new(&mut out, tabs);
            assert!(launcher.launch(&first));
            assert!(!launcher.launch(&second));
        }

        let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["sessionId"], "904135b4-8584-42dd-aeb9-08b920d0e02e");
        assert_eq!(printed["flags"], serde_json::json!(["--model", "sonnet"]));
        assert_eq!(tabs_seen, vec!["/q"]);
    }
}

//! Rebuilds the command that resumes a saved session.

use crate::record::SessionRecord;
use crate::types::AgentTool;

const CLAUDE_RESUME: &str = "--resume";
const CLAUDE_CONTINUE: &str = "--continue";
const CODEX_RESUME: &str = "resume";

/// Argv that resumes `record`.
///
/// Without a session id claude continues its most recent project session and
/// codex starts fresh with the same flags.
pub fn build_restore_argv(record: &SessionRecord) -> Vec<String> {
    let mut argv = vec![record.tool.id().to_string()];
    match (record.tool, record.session_id.as_deref()) {
        (AgentTool::Claude, Some(id)) => argv.extend([CLAUDE_RESUME.to_string(), id.to_string()]),
        (AgentTool::Claude, None) => argv.push(CLAUDE_CONTINUE.to_string()),
        (AgentTool::Codex, Some(id)) => argv.extend([CODEX_RESUME.to_string(), id.to_string()]),
        (AgentTool::Codex, None) => {}
    }
    argv.extend(record.flags.iter().cloned());
    argv
}

/// `cd <cwd> && <argv>`, quoted for a POSIX shell.
pub fn build_shell_command(record: &SessionRecord) -> String {
    let cwd = if record.cwd.is_empty() { "." } else { record.cwd.as_str() };
    format!(
        "cd {} && {}",
        shell_words::quote(cwd),
        shell_words::join(build_restore_argv(record))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::extract_flags;
    use crate::record::MuxAddress;

    const SID: &str = "904135b4-8584-42dd-aeb9-08b920d0e02e";
    const CODEX_SID: &str = "019c5bce-a952-7380-b204-bfe40bf783b6";

    fn record(tool: AgentTool, sid: Option<&str>, flags: &[&str]) -> SessionRecord {
        SessionRecord::new(
            tool,
            sid.map(str::to_string),
            "/work/app",
            flags.iter().map(|f| f.to_string()).collect(),
        )
    }

    #[test]
    fn test_claude_argv_with_and_without_id() {
        assert_eq!(
            build_restore_argv(&record(AgentTool::Claude, Some(SID), &["--model", "sonnet"])),
            vec!["claude", "--resume", SID, "--model", "sonnet"]
        );
        assert_eq!(
            build_restore_argv(&record(AgentTool::Claude, None, &["--verbose"])),
            vec!["claude", "--continue", "--verbose"]
        );
    }

    #[test]
    fn test_codex_without_id_relaunches_bare() {
        assert_eq!(
            build_restore_argv(&record(AgentTool::Codex, None, &["--model", "gpt-5"])),
            vec!["codex", "--model", "gpt-5"]
        );
        assert_eq!(
            build_restore_argv(&record(AgentTool::Codex, Some(CODEX_SID), &["--search"])),
            vec!["codex", "resume", CODEX_SID, "--search"]
        );
    }

    #[test]
    fn test_argv_ignores_mux_metadata() {
        let plain = record(AgentTool::Claude, Some(SID), &[]);
        let muxed = plain.clone().with_mux(MuxAddress {
            workspace_name: Some("dev".into()),
            surface_index: 3,
            ..Default::default()
        });
        assert_eq!(build_restore_argv(&plain), build_restore_argv(&muxed));
    }

    #[test]
    fn test_replayed_flags_are_stable_across_a_resume_cycle() {
        for (tool, sid, flags) in [
            (AgentTool::Claude, Some(SID), vec!["--model", "sonnet", "--verbose"]),
            (AgentTool::Claude, None, vec!["--add-dir", "/tmp/x"]),
            (AgentTool::Codex, Some(CODEX_SID), vec!["-m", "gpt-5", "--search"]),
            (AgentTool::Codex, None, vec!["--profile", "work"]),
        ] {
            let original = record(tool, sid, &flags);
            let argv = build_restore_argv(&original);
            assert_eq!(extract_flags(&argv, tool), original.flags, "{argv:?}");
        }
    }

    #[test]
    fn test_shell_command_quotes_cwd_and_argv() {
        let mut rec = record(AgentTool::Claude, Some(SID), &["--append-system-prompt", "be brief"]);
        rec.cwd = "/Users/me/project's one".to_string();
        assert_eq!(
            build_shell_command(&rec),
            format!(
                "cd '/Users/me/project'\\''s one' && claude --resume {SID} --append-system-prompt 'be brief'"
            )
        );
    }

    #[test]
    fn test_shell_command_defaults_empty_cwd() {
        let mut rec = record(AgentTool::Codex, None, &[]);
        rec.cwd.clear();
        assert_eq!(build_shell_command(&rec), "cd . && codex");
    }
}

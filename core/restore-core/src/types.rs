//! Shared enums for the agent tools and terminal hosts we track.

use serde::{Deserialize, Serialize};

/// Agent CLIs whose sessions can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTool {
    Claude,
    Codex,
}

impl AgentTool {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }

    /// Parses a tool id, case-insensitively. Unknown ids yield `None`.
    pub fn from_id(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            _ => None,
        }
    }

    /// Best-effort tool inference from a raw command line, used for snapshot
    /// entries written before the tool field existed.
    pub fn infer_from_args(args: &str) -> Self {
        if args.to_ascii_lowercase().contains("codex") {
            Self::Codex
        } else {
            Self::Claude
        }
    }
}

impl Default for AgentTool {
    fn default() -> Self {
        Self::Claude
    }
}

impl std::fmt::Display for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Terminal programs that own agent sessions.
///
/// Records only ever persist the multiplexer tag; an absent tag means Ghostty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalHost {
    Ghostty,
    Cmux,
}

impl TerminalHost {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Ghostty => "ghostty",
            Self::Cmux => "cmux",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Ghostty => Self::Cmux,
            Self::Cmux => Self::Ghostty,
        }
    }
}

impl std::fmt::Display for TerminalHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for TerminalHost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ghostty" => Ok(Self::Ghostty),
            "cmux" => Ok(Self::Cmux),
            other => Err(format!("unknown terminal: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_ids_round_trip() {
        for tool in [AgentTool::Claude, AgentTool::Codex] {
            assert_eq!(AgentTool::from_id(tool.id()), Some(tool));
        }
        assert_eq!(AgentTool::from_id(" CODEX "), Some(AgentTool::Codex));
        assert_eq!(AgentTool::from_id("aider"), None);
    }

    #[test]
    fn test_tool_inference_prefers_codex_mention() {
        assert_eq!(
            AgentTool::infer_from_args("/opt/bin/codex --model gpt-5"),
            AgentTool::Codex
        );
        assert_eq!(AgentTool::infer_from_args("claude --verbose"), AgentTool::Claude);
        assert_eq!(AgentTool::infer_from_args(""), AgentTool::Claude);
    }

    #[test]
    fn test_terminal_parses_and_flips() {
        assert_eq!("cmux".parse::<TerminalHost>(), Ok(TerminalHost::Cmux));
        assert_eq!("Ghostty".parse::<TerminalHost>(), Ok(TerminalHost::Ghostty));
        assert!("iterm".parse::<TerminalHost>().is_err());
        assert_eq!(TerminalHost::Cmux.other(), TerminalHost::Ghostty);
    }
}

//! Command-line tokenizing and replayable flag extraction.
//!
//! A process command line is split with POSIX quoting rules and then reduced to
//! the flags that must be replayed on relaunch. Resume/continue directives are
//! never kept; they are re-derived from the session id at restore time.
//!
//! Each tool owns its option tables because value conventions differ: `-c` is
//! `--continue` for claude but `--config <value>` for codex.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::patterns::looks_like_uuid;
use crate::types::AgentTool;

/// Claude options that consume the following token as their value.
/// `--opt=value` forms stay a single token and need no entry here.
static CLAUDE_OPTS_WITH_VALUE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "--add-dir",
        "--agent",
        "--agents",
        "--allowedTools",
        "--allowed-tools",
        "--append-system-prompt",
        "--betas",
        "--debug",
        "--debug-file",
        "--disallowedTools",
        "--disallowed-tools",
        "--effort",
        "--fallback-model",
        "--file",
        "--from-pr",
        "--input-format",
        "--json-schema",
        "--max-budget-usd",
        "--mcp-config",
        "--model",
        "--output-format",
        "--permission-mode",
        "--plugin-dir",
        "--session-id",
        "--setting-sources",
        "--settings",
        "--system-prompt",
        "--tools",
        "-r",
    ]
    .into_iter()
    .collect()
});

static CODEX_OPTS_WITH_VALUE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "-c",
        "--config",
        "--enable",
        "--disable",
        "-i",
        "--image",
        "-m",
        "--model",
        "--local-provider",
        "-p",
        "--profile",
        "-s",
        "--sandbox",
        "-a",
        "--ask-for-approval",
        "-C",
        "--cd",
        "--add-dir",
    ]
    .into_iter()
    .collect()
});

static CLAUDE_SKIP: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["--resume", "-r", "--continue", "-c"].into_iter().collect());

static CODEX_SKIP: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["--last", "--all"].into_iter().collect());

/// Codex subcommands that open an interactive, resumable session.
pub static CODEX_INTERACTIVE_SUBCOMMANDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["resume", "fork"].into_iter().collect());

/// Codex subcommands that never produce a resumable session.
pub static CODEX_NON_INTERACTIVE_SUBCOMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exec",
        "review",
        "login",
        "logout",
        "mcp",
        "mcp-server",
        "app-server",
        "app",
        "completion",
        "sandbox",
        "debug",
        "apply",
        "cloud",
        "features",
        "help",
    ]
    .into_iter()
    .collect()
});

/// Option tables for one tool.
pub struct FlagRules {
    pub opts_with_value: &'static HashSet<&'static str>,
    pub skip: &'static HashSet<&'static str>,
    /// Tokens after which a following session id is swallowed as well.
    pub skip_following_uuid: Option<&'static HashSet<&'static str>>,
}

impl FlagRules {
    pub fn for_tool(tool: AgentTool) -> Self {
        match tool {
            AgentTool::Claude => FlagRules {
                opts_with_value: &CLAUDE_OPTS_WITH_VALUE,
                skip: &CLAUDE_SKIP,
                skip_following_uuid: None,
            },
            AgentTool::Codex => FlagRules {
                opts_with_value: &CODEX_OPTS_WITH_VALUE,
                skip: &CODEX_SKIP,
                skip_following_uuid: Some(&CODEX_INTERACTIVE_SUBCOMMANDS),
            },
        }
    }

    fn takes_value(&self, token: &str) -> bool {
        self.opts_with_value.contains(token)
    }
}

/// Splits a command line into argv-like tokens.
///
/// Malformed quoting degrades to whitespace splitting instead of failing.
pub fn tokenize(command_line: &str) -> Vec<String> {
    if command_line.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(command_line) {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::debug!(error = %err, "Falling back to whitespace tokenization");
            command_line.split_whitespace().map(str::to_string).collect()
        }
    }
}

fn is_option(token: &str) -> bool {
    token.starts_with('-')
}

fn basename(token: &str) -> &str {
    Path::new(token)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(token)
}

/// Drops a leading executable token naming `tool` (full paths allowed).
pub fn strip_executable(tokens: &[String], tool: AgentTool) -> &[String] {
    match tokens.first() {
        Some(first) if basename(first) == tool.id() => &tokens[1..],
        _ => tokens,
    }
}

/// Reduces a tokenized command line to the flags worth replaying.
///
/// Positional arguments are dropped; options are kept with their value when
/// the option takes one and the next token is not itself an option.
pub fn extract_flags(tokens: &[String], tool: AgentTool) -> Vec<String> {
    let rules = FlagRules::for_tool(tool);
    let tokens = strip_executable(tokens, tool);

    let mut out = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        let token = tokens[idx].as_str();

        if rules.skip.contains(token) {
            idx += if rules.takes_value(token) && idx + 1 < tokens.len() {
                2
            } else {
                1
            };
            continue;
        }

        if rules
            .skip_following_uuid
            .is_some_and(|set| set.contains(token))
        {
            idx += 1;
            if tokens.get(idx).is_some_and(|next| looks_like_uuid(next)) {
                idx += 1;
            }
            continue;
        }

        if is_option(token) {
            out.push(token.to_string());
            if rules.takes_value(token) {
                if let Some(next) = tokens.get(idx + 1).filter(|next| !is_option(next)) {
                    out.push(next.clone());
                    idx += 2;
                    continue;
                }
            }
        }

        idx += 1;
    }
    out
}

/// Convenience wrapper: tokenize and extract in one step.
pub fn extract_flags_from_args(args: &str, tool: AgentTool) -> Vec<String> {
    extract_flags(&tokenize(args), tool)
}

//! Compiled regex patterns for session identifiers and session-log paths.
//!
//! Compiled once on first use. Update these when the agent CLIs change their
//! on-disk layout.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical 8-4-4-4-12 hexadecimal session id, anchored.
pub static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Codex rollout log held open by a live codex process.
pub static RE_CODEX_ROLLOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)/\.codex/(?:sessions/\d{4}/\d{2}/\d{2}|archived_sessions)/rollout-[^-\s]+-[0-9]{2}-[0-9]{2}T[0-9]{2}-[0-9]{2}-[0-9]{2}-([0-9a-f-]{36})\.jsonl",
    )
    .unwrap()
});

/// True when `value` has the canonical session id shape.
pub fn looks_like_uuid(value: &str) -> bool {
    RE_UUID.is_match(value)
}

//! Error types for restore-core operations.
//!
//! Reads degrade to empty values instead of erroring; these variants cover the
//! failures that callers actually need to see (writes, external commands).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Conflicting flags: {0}")]
    ConflictingFlags(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file has no parent directory: {0}")]
    NoParentDir(PathBuf),

    // ─────────────────────────────────────────────────────────────────────
    // External Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },
}

impl RestoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RestoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        RestoreError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using RestoreError.
pub type Result<T> = std::result::Result<T, RestoreError>;

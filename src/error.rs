//! Error taxonomy for byte edits, backups, external tools and patch operations.
//!
//! Every error raised while running a single [`Patch`](crate::patch::Patch) is
//! contained at that operation's boundary as a [`PatchError`]; the orchestrator
//! never lets one of them abort a run.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::config::ToolKind;

/// Failure of a pure byte-level edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// Search and replacement differ in length. Binary layouts are fixed-width,
    /// so the buffer length may never change.
    #[error("replacement is {actual} bytes but the search pattern is {expected} bytes")]
    LengthMismatch { expected: usize, actual: usize },
    /// The search pattern does not occur in the buffer.
    #[error("search pattern not found")]
    PatternNotFound,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("file to back up does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("no backup exists at {}", .0.display())]
    BackupMissing(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An external capability (key generator, debugger automation) could not be
/// run or reported failure.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} path is not configured")]
    NotConfigured(ToolKind),
    #[error("external tool not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} exited with {status}: {stderr}", program.display())]
    ExitStatus {
        program: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("expected tool output was not created: {}", .0.display())]
    MissingOutput(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A precondition of a patch is unmet. The patch is reported as skipped and
/// never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a JSON object of flags", .0.display())]
    NotAFlagMap(PathBuf),
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed settings document {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Everything that can go wrong inside a single patch operation.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("precondition failed: {0}")]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error("external tool failure: {0}")]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid patch configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

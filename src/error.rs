//! Error taxonomy for the enablement engine.
//!
//! Every variant that concerns a concrete filesystem entry carries the
//! offending path, so failures surfaced to the user always name the
//! file they can act on.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Package shape problems found by validation. No mutation has
/// happened when one of these is returned.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("README.txt not found in {0}")]
    MissingReadme(PathBuf),

    #[error("VERSION.txt not found in {0}")]
    MissingVersionFile(PathBuf),

    #[error("main subtree not found: {0}")]
    MissingMainSubtree(PathBuf),

    #[error("main subtree is named '{found}', expected '{expected}' (names are case-sensitive)")]
    NameMismatch { expected: String, found: String },

    #[error("not a usable package root: {0}")]
    InvalidRoot(PathBuf),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid package structure: {0}")]
    Structure(#[from] StructureError),

    #[error("conflict at {path}: {reason}")]
    Conflict { path: PathBuf, reason: String },

    #[error("refusing to remove {path}: expected target {expected}, found {found}")]
    OwnershipMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("corrupt patch markers in {path}: {reason}")]
    PatchCorruption { path: PathBuf, reason: String },

    #[error("invalid lifecycle state: {0}")]
    State(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// Wrap an `io::Error` together with the path it occurred at.
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Non-fatal problem recorded while a best-effort disable keeps going.
#[derive(Debug, Clone)]
pub struct Warning {
    pub path: PathBuf,
    pub detail: String,
}

impl Warning {
    pub fn new(path: &Path, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.detail)
    }
}

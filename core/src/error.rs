//! Error types for indexing and renaming.
//!
//! Parse and reference-resolution failures are local to one file: they are
//! recorded on the result and never abort a batch. Everything else fails the
//! call that produced it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised by the file index, the symbol index and the index engine.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The operation requires an existing file index entry
    #[error("file not indexed: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The engine has been disposed
    #[error("index engine has been disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cooperative cancellation was observed at a file boundary
    #[error("indexing cancelled after {indexed} files")]
    Cancelled { indexed: usize },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A parser failed on one file. Recorded on the file entry, not thrown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error in {}{}: {message}", .path.display(), .line.map(|l| format!(":{l}")).unwrap_or_default())]
pub struct ParseError {
    pub path: PathBuf,
    pub message: String,
    pub line: Option<usize>,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    pub const fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// References in one file could not be resolved during a rename scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot resolve references in {}: {reason}", .path.display())]
pub struct ReferenceResolutionError {
    pub path: PathBuf,
    pub reason: String,
}

impl ReferenceResolutionError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the rename engine before or instead of touching files.
#[derive(Error, Debug)]
pub enum RenameError {
    /// Another symbol with the new name is visible in the same scope
    #[error("renaming '{symbol}' to '{new_name}' conflicts with {} existing symbol(s)", .conflicts.len())]
    Conflict {
        symbol: String,
        new_name: String,
        conflicts: Vec<String>,
    },

    /// Undo on an unknown, expired or already-undone id
    #[error("rename operation not found: {0}")]
    OperationNotFound(Uuid),

    /// Another rename holds one of the files
    #[error("files are locked by another rename: {}", format_paths(.paths))]
    ConcurrentRename { paths: Vec<PathBuf> },

    #[error("invalid new name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error(transparent)]
    Index(#[from] IndexError),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

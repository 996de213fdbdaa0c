use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("no symbol named '{0}' in the index")]
    SymbolNotFound(String),

    #[error("'{name}' is ambiguous; pass --file to pick one of:\n  {}", .candidates.join("\n  "))]
    AmbiguousSymbol {
        name: String,
        candidates: Vec<String>,
    },

    #[error("rename left {} file(s) unchanged or failed", .failed.len())]
    RenameIncomplete { failed: Vec<PathBuf> },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Index(#[from] symdex_core::IndexError),

    #[error(transparent)]
    Rename(#[from] symdex_core::RenameError),

    #[error(transparent)]
    Ast(#[from] symdex_ast::AstError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

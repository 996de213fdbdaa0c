//! Symdex core: a multi-dimensional symbol index and a cross-file rename
//! engine with conflict detection and undo.
//!
//! The core never interprets source syntax. Parsers plug in through
//! [`LanguageParser`] and are looked up by file extension in a
//! [`ParserRegistry`]; disk access goes through the [`FileSystem`]
//! capability.

pub mod config;
pub mod engine;
pub mod error;
pub mod file_index;
pub mod fs;
pub mod parser;
pub mod rename;
pub mod search;
pub mod snapshot;
pub mod symbol_index;
pub mod types;

pub use config::IndexConfig;
pub use engine::EngineStats;
pub use engine::FileUpdate;
pub use engine::IndexEngine;
pub use engine::IndexSummary;
pub use error::IndexError;
pub use error::ParseError;
pub use error::ReferenceResolutionError;
pub use error::RenameError;
pub use error::Result;
pub use file_index::FileIndex;
pub use file_index::FileIndexEntry;
pub use fs::FileStat;
pub use fs::FileSystem;
pub use fs::LocalFileSystem;
pub use fs::WalkFilter;
pub use fs::normalize_path;
pub use parser::LanguageParser;
pub use parser::ParseResult;
pub use parser::ParserRegistry;
pub use parser::SourceTree;
pub use rename::RenameEngine;
pub use rename::RenameOperation;
pub use rename::RenameOptions;
pub use rename::RenamePreview;
pub use rename::RenameResult;
pub use rename::RenameStatus;
pub use rename::UndoResult;
pub use search::SearchOptions;
pub use symbol_index::IndexCommand;
pub use symbol_index::SymbolIndex;
pub use symbol_index::SymbolIndexEntry;
pub use symbol_index::SymbolMatch;
pub use types::Dependency;
pub use types::DependencyKind;
pub use types::FileInfo;
pub use types::Reference;
pub use types::ReferenceKind;
pub use types::Scope;
pub use types::ScopeKind;
pub use types::SourceLocation;
pub use types::Symbol;
pub use types::SymbolKind;
pub use types::TextEdit;
pub use types::Visibility;

/// Re-exported so callers can cancel long operations without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;

//! The parser capability and its per-extension registration table.
//!
//! The index never interprets source syntax itself. Each supported language
//! registers one [`LanguageParser`]; the engine looks parsers up by file
//! extension.

use std::any::Any;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ParseError;
use crate::types::Dependency;
use crate::types::Reference;
use crate::types::Scope;
use crate::types::ScopeKind;
use crate::types::Symbol;

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parsed source handed back to the parser that produced it.
///
/// The syntax payload is type-erased; only the producing parser knows its
/// concrete type and downcasts it with [`SourceTree::syntax`].
#[derive(Clone)]
pub struct SourceTree {
    pub path: PathBuf,
    pub source: Arc<str>,
    /// Names the file's module scope; workspace-relative once indexed
    module_path: PathBuf,
    syntax: Arc<dyn Any + Send + Sync>,
}

impl SourceTree {
    pub fn new<T>(path: impl Into<PathBuf>, source: impl Into<Arc<str>>, syntax: T) -> Self
    where
        T: Any + Send + Sync,
    {
        let path = path.into();
        Self {
            module_path: path.clone(),
            path,
            source: source.into(),
            syntax: Arc::new(syntax),
        }
    }

    /// Name the module scope by the path relative to `root`. Paths outside
    /// `root` keep their full name.
    pub fn relative_to(mut self, root: &Path) -> Self {
        if let Ok(relative) = self.path.strip_prefix(root)
            && !relative.as_os_str().is_empty()
        {
            self.module_path = relative.to_path_buf();
        }
        self
    }

    /// `/`-separated module path, e.g. `src/alpha/mod.rs`
    pub fn module_name(&self) -> String {
        self.module_path.to_string_lossy().replace('\\', "/")
    }

    /// Outermost scope of every symbol in the file. Two files never share
    /// it, even when their names do (`mod.rs`, `__init__.py`, `index.ts`).
    pub fn module_scope(&self) -> Scope {
        Scope::new(ScopeKind::Module, Some(self.module_name()))
    }

    /// Borrow the syntax payload as `T`, if that is what it holds.
    pub fn syntax<T: Any>(&self) -> Option<&T> {
        (*self.syntax).downcast_ref::<T>()
    }

    /// Same as [`SourceTree::syntax`] but reports a mismatch as a parse error.
    pub fn expect_syntax<T: Any>(&self) -> ParseResult<&T> {
        self.syntax::<T>().ok_or_else(|| {
            ParseError::new(
                &self.path,
                "source tree was produced by a different parser",
            )
        })
    }
}

impl fmt::Debug for SourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceTree")
            .field("path", &self.path)
            .field("module", &self.module_path)
            .field("source_len", &self.source.len())
            .finish_non_exhaustive()
    }
}

/// Per-language parsing capability.
pub trait LanguageParser: Send + Sync + fmt::Debug {
    /// Language display name, e.g. "Rust"
    fn language(&self) -> &str;

    /// Lower-case file extensions (without the dot) this parser accepts
    fn extensions(&self) -> &[&str];

    fn parse(&self, text: &str, path: &Path) -> ParseResult<SourceTree>;

    fn extract_symbols(&self, tree: &SourceTree) -> ParseResult<Vec<Symbol>>;

    fn extract_dependencies(&self, tree: &SourceTree) -> ParseResult<Vec<Dependency>>;

    /// Every occurrence of `symbol` in `tree`, its definition included.
    fn find_references(&self, tree: &SourceTree, symbol: &Symbol) -> ParseResult<Vec<Reference>>;
}

/// Registration table mapping file extensions to parsers
#[derive(Default, Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn LanguageParser>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `parser` under each of its extensions. A later registration
    /// for the same extension replaces the earlier one.
    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) -> &mut Self {
        for ext in parser.extensions() {
            self.parsers
                .insert(ext.to_ascii_lowercase(), Arc::clone(&parser));
        }
        self
    }

    pub fn parser_for_extension(&self, extension: &str) -> Option<Arc<dyn LanguageParser>> {
        self.parsers
            .get(extension.trim_start_matches('.').to_ascii_lowercase().as_str())
            .cloned()
    }

    pub fn parser_for_path(&self, path: &Path) -> Option<Arc<dyn LanguageParser>> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.parser_for_extension(ext))
    }

    pub fn language_for_path(&self, path: &Path) -> Option<String> {
        self.parser_for_path(path)
            .map(|parser| parser.language().to_string())
    }

    /// Registered extensions, sorted
    pub fn extensions(&self) -> Vec<String> {
        self.parsers
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Shared fixtures for the core integration tests.
//!
//! `LineParser` understands a tiny line-oriented language (`.toy` files):
//!
//! ```text
//! use other_module        # dependency
//! fn name                 # function, scoped to the file's module path
//! let name                # variable, scoped to the file's module
//! name()                  # any other whole-word occurrence is a reference
//! !!syntax-error          # makes the parse fail
//! ```

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use symdex_core::CancellationToken;
use symdex_core::Dependency;
use symdex_core::DependencyKind;
use symdex_core::FileStat;
use symdex_core::FileSystem;
use symdex_core::IndexConfig;
use symdex_core::IndexEngine;
use symdex_core::LanguageParser;
use symdex_core::LocalFileSystem;
use symdex_core::ParseError;
use symdex_core::ParseResult;
use symdex_core::ParserRegistry;
use symdex_core::Reference;
use symdex_core::ReferenceKind;
use symdex_core::SourceLocation;
use symdex_core::SourceTree;
use symdex_core::Symbol;
use symdex_core::SymbolKind;
use symdex_core::fs::WalkFilter;
use symdex_core::fs::WalkOutcome;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const SYNTAX_ERROR_MARKER: &str = "!!syntax-error";

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte ranges of whole-word occurrences of `word` in `text`
fn word_occurrences(text: &str, word: &str) -> Vec<(usize, usize)> {
    text.match_indices(word)
        .filter(|(start, _)| {
            let end = start + word.len();
            let before = text[..*start].chars().next_back().is_none_or(|c| !is_ident(c));
            let after = text[end..].chars().next().is_none_or(|c| !is_ident(c));
            before && after
        })
        .map(|(start, _)| (start, start + word.len()))
        .collect()
}

/// `(name, name_start)` for every `keyword name` line
fn declarations<'a>(source: &'a str, keyword: &str) -> Vec<(&'a str, usize)> {
    let mut found = Vec::new();
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if let Some(rest) = trimmed.strip_prefix(keyword)
            && let Some(rest) = rest.strip_prefix(' ')
        {
            let name_len = rest.find(|c: char| !is_ident(c)).unwrap_or(rest.len());
            if name_len > 0 {
                let start = offset + indent + keyword.len() + 1;
                found.push((&source[start..start + name_len], start));
            }
        }
        offset += line.len();
    }
    found
}

#[derive(Debug, Default)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageParser for LineParser {
    fn language(&self) -> &str {
        "Toy"
    }

    fn extensions(&self) -> &[&str] {
        &["toy"]
    }

    fn parse(&self, text: &str, path: &Path) -> ParseResult<SourceTree> {
        if let Some(offset) = text.find(SYNTAX_ERROR_MARKER) {
            let line = text[..offset].matches('\n').count() + 1;
            return Err(ParseError::new(path, "unexpected syntax error marker").at_line(line));
        }
        Ok(SourceTree::new(path, text, ()))
    }

    fn extract_symbols(&self, tree: &SourceTree) -> ParseResult<Vec<Symbol>> {
        let scope = tree.module_scope();
        let mut symbols = Vec::new();
        for (keyword, kind) in [("fn", SymbolKind::Function), ("let", SymbolKind::Variable)] {
            for (name, start) in declarations(&tree.source, keyword) {
                let location =
                    SourceLocation::from_byte_range(&tree.path, &tree.source, start, start + name.len());
                symbols.push(
                    Symbol::new(name, kind, location)
                        .with_scope(scope.clone())
                        .with_signature(format!("{keyword} {name}")),
                );
            }
        }
        symbols.sort_by_key(|s| s.location.byte_range);
        Ok(symbols)
    }

    fn extract_dependencies(&self, tree: &SourceTree) -> ParseResult<Vec<Dependency>> {
        Ok(declarations(&tree.source, "use")
            .into_iter()
            .map(|(name, start)| {
                let mut dependency = Dependency::new(name, DependencyKind::Import);
                dependency.location = Some(SourceLocation::from_byte_range(
                    &tree.path,
                    &tree.source,
                    start,
                    start + name.len(),
                ));
                dependency
            })
            .collect())
    }

    fn find_references(&self, tree: &SourceTree, symbol: &Symbol) -> ParseResult<Vec<Reference>> {
        let definitions: HashSet<usize> = declarations(&tree.source, "fn")
            .into_iter()
            .chain(declarations(&tree.source, "let"))
            .map(|(_, start)| start)
            .collect();
        Ok(word_occurrences(&tree.source, &symbol.name)
            .into_iter()
            .map(|(start, end)| Reference {
                location: SourceLocation::from_byte_range(&tree.path, &tree.source, start, end),
                kind: if definitions.contains(&start) {
                    ReferenceKind::Definition
                } else {
                    ReferenceKind::Read
                },
            })
            .collect())
    }
}

/// Wraps [`LineParser`] and fires `cancel` on the `after`-th parse
#[derive(Debug)]
pub struct CancellingParser {
    inner: LineParser,
    cancel: CancellationToken,
    after: usize,
    parses: AtomicUsize,
}

impl CancellingParser {
    pub fn new(cancel: CancellationToken, after: usize) -> Self {
        Self {
            inner: LineParser,
            cancel,
            after,
            parses: AtomicUsize::new(0),
        }
    }
}

impl LanguageParser for CancellingParser {
    fn language(&self) -> &str {
        self.inner.language()
    }

    fn extensions(&self) -> &[&str] {
        self.inner.extensions()
    }

    fn parse(&self, text: &str, path: &Path) -> ParseResult<SourceTree> {
        if self.parses.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.cancel.cancel();
        }
        self.inner.parse(text, path)
    }

    fn extract_symbols(&self, tree: &SourceTree) -> ParseResult<Vec<Symbol>> {
        self.inner.extract_symbols(tree)
    }

    fn extract_dependencies(&self, tree: &SourceTree) -> ParseResult<Vec<Dependency>> {
        self.inner.extract_dependencies(tree)
    }

    fn find_references(&self, tree: &SourceTree, symbol: &Symbol) -> ParseResult<Vec<Reference>> {
        self.inner.find_references(tree, symbol)
    }
}

/// Local disk, except that writes to chosen paths fail
#[derive(Debug, Default)]
pub struct FailingFileSystem {
    inner: LocalFileSystem,
    failing: Mutex<HashSet<PathBuf>>,
}

impl FailingFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.lock().unwrap().insert(path.into());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl FileSystem for FailingFileSystem {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner.read_to_string(path).await
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(io::Error::other("injected write failure"));
        }
        self.inner.write(path, contents).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.inner.stat(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.canonicalize(path).await
    }

    async fn walk(&self, root: &Path, filter: &WalkFilter) -> io::Result<WalkOutcome> {
        self.inner.walk(root, filter).await
    }
}

/// Local disk; the next read of a chosen path signals `entered` and then
/// waits for `release`
#[derive(Debug, Default)]
pub struct GatedFileSystem {
    inner: LocalFileSystem,
    gated: Mutex<Option<PathBuf>>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate_next_read_of(&self, path: impl Into<PathBuf>) {
        *self.gated.lock().unwrap() = Some(path.into());
    }
}

#[async_trait]
impl FileSystem for GatedFileSystem {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let hit = {
            let mut gated = self.gated.lock().unwrap();
            if gated.as_deref() == Some(path) {
                gated.take();
                true
            } else {
                false
            }
        };
        if hit {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.read_to_string(path).await
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.inner.write(path, contents).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.inner.stat(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.canonicalize(path).await
    }

    async fn walk(&self, root: &Path, filter: &WalkFilter) -> io::Result<WalkOutcome> {
        self.inner.walk(root, filter).await
    }
}

pub fn toy_registry() -> Arc<ParserRegistry> {
    let mut registry = ParserRegistry::new();
    registry.register(Arc::new(LineParser::new()));
    Arc::new(registry)
}

pub fn toy_config(root: &Path) -> IndexConfig {
    IndexConfig {
        include_extensions: vec!["toy".to_string()],
        ..IndexConfig::for_workspace(root)
    }
}

pub fn toy_engine(root: &Path) -> IndexEngine {
    IndexEngine::new(toy_config(root), toy_registry()).unwrap()
}

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Temporary workspace with a small multi-file project
pub fn toy_project() -> (TempDir, Vec<PathBuf>) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let files = vec![
        write_file(
            root,
            "src/store.toy",
            "use net\nfn load\nlet cache\nload()\ncache = load()\n",
        ),
        write_file(root, "src/app.toy", "use store\nfn main\nmain()\nload()\nreload()\n"),
        write_file(root, "src/util.toy", "fn helper\nhelper()\n"),
    ];
    (dir, files)
}

//! The index engine: walks a tree, hands each file to its parser and keeps
//! the file index and the symbol index in step.
//!
//! Both indexes sit behind their own `RwLock`. A per-file write always takes
//! the file index lock first and the symbol index lock second, and holds both
//! until the file is fully written, so readers never see half a file.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::error::ParseError;
use crate::error::Result;
use crate::file_index::FileIndex;
use crate::file_index::FileIndexEntry;
use crate::file_index::FileIndexStats;
use crate::fs::FileSystem;
use crate::fs::LocalFileSystem;
use crate::fs::WalkFilter;
use crate::fs::normalize_path;
use crate::parser::LanguageParser;
use crate::parser::ParseResult;
use crate::parser::ParserRegistry;
use crate::search::SearchOptions;
use crate::snapshot::IndexSnapshot;
use crate::symbol_index::IndexCommand;
use crate::symbol_index::SymbolIndex;
use crate::symbol_index::SymbolIndexEntry;
use crate::symbol_index::SymbolIndexStats;
use crate::symbol_index::SymbolMatch;
use crate::types::Dependency;
use crate::types::FileInfo;
use crate::types::Symbol;
use crate::types::SymbolKind;

/// What one `index_project` run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub root: PathBuf,
    /// Files accepted by the walk filter, oversized ones included
    pub discovered: usize,
    pub indexed: usize,
    /// Unchanged since the last index, oversized, or without a parser
    pub skipped: usize,
    pub failed: usize,
    /// Stale entries under `root` whose file is gone
    pub removed: usize,
    /// Symbols extracted during this run
    pub symbols: usize,
    pub failures: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
}

impl IndexSummary {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            discovered: 0,
            indexed: 0,
            skipped: 0,
            failed: 0,
            removed: 0,
            symbols: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Outcome of a single-file operation
#[derive(Debug, Clone, PartialEq)]
pub enum FileUpdate {
    Indexed { symbols: usize },
    /// The parser failed; the error is recorded on the file entry
    ParseFailed(ParseError),
    Unchanged,
    /// No parser for the extension, or over the size limit
    Skipped,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub files: FileIndexStats,
    pub symbols: SymbolIndexStats,
}

/// Parse result for one file, computed without holding any index lock
#[derive(Debug)]
enum FileAnalysis {
    Unchanged,
    Unsupported,
    Oversized(u64),
    Parsed {
        info: FileInfo,
        symbols: Vec<Symbol>,
        dependencies: Vec<Dependency>,
    },
    ParseFailed {
        info: FileInfo,
        error: ParseError,
    },
}

/// The read-only half of indexing, cloneable into worker tasks
#[derive(Clone)]
struct Analyzer {
    fs: Arc<dyn FileSystem>,
    parsers: Arc<ParserRegistry>,
    file_index: Arc<RwLock<FileIndex>>,
    workspace: PathBuf,
    max_file_size: u64,
}

impl Analyzer {
    async fn analyze(&self, path: &Path, force: bool) -> Result<FileAnalysis> {
        let Some(parser) = self.parsers.parser_for_path(path) else {
            return Ok(FileAnalysis::Unsupported);
        };
        let stat = self
            .fs
            .stat(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        if stat.size > self.max_file_size {
            return Ok(FileAnalysis::Oversized(stat.size));
        }
        if !force
            && !self
                .file_index
                .read()
                .await
                .needs_reindexing(path, stat.modified)
        {
            return Ok(FileAnalysis::Unchanged);
        }

        let content = self
            .fs
            .read_to_string(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        let info = FileInfo::from_content(
            path,
            &content,
            stat.modified,
            Some(parser.language().to_string()),
        );
        match extract(parser.as_ref(), &content, path, &self.workspace) {
            Ok((symbols, dependencies)) => Ok(FileAnalysis::Parsed {
                info,
                symbols,
                dependencies,
            }),
            Err(error) => Ok(FileAnalysis::ParseFailed { info, error }),
        }
    }
}

fn extract(
    parser: &dyn LanguageParser,
    content: &str,
    path: &Path,
    workspace: &Path,
) -> ParseResult<(Vec<Symbol>, Vec<Dependency>)> {
    let tree = parser.parse(content, path)?.relative_to(workspace);
    let symbols = parser.extract_symbols(&tree)?;
    let dependencies = parser.extract_dependencies(&tree)?;
    Ok((symbols, dependencies))
}

fn symbol_entries(
    info: &FileInfo,
    symbols: &[Symbol],
    dependencies: &[Dependency],
) -> Vec<SymbolIndexEntry> {
    let names: Vec<String> = dependencies.iter().map(|d| d.name.clone()).collect();
    symbols
        .iter()
        .map(|symbol| SymbolIndexEntry::new(symbol.clone(), info.clone(), names.clone()))
        .collect()
}

type TaskOutput = (PathBuf, Option<Result<FileAnalysis>>);

pub struct IndexEngine {
    config: IndexConfig,
    parsers: Arc<ParserRegistry>,
    fs: Arc<dyn FileSystem>,
    file_index: Arc<RwLock<FileIndex>>,
    symbol_index: Arc<RwLock<SymbolIndex>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine")
            .field("workspace", &self.config.workspace_path)
            .field("parsers", &self.parsers)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl IndexEngine {
    /// Create an engine over the local filesystem
    pub fn new(config: IndexConfig, parsers: Arc<ParserRegistry>) -> Result<Self> {
        Self::with_file_system(config, parsers, Arc::new(LocalFileSystem::new()))
    }

    pub fn with_file_system(
        config: IndexConfig,
        parsers: Arc<ParserRegistry>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        config.validate()?;
        let mut config = config;
        let absolute = std::path::absolute(&config.workspace_path)
            .map_err(|e| IndexError::io(&config.workspace_path, e))?;
        config.workspace_path = normalize_path(&absolute);
        Ok(Self {
            config,
            parsers,
            fs,
            file_index: Arc::new(RwLock::new(FileIndex::new())),
            symbol_index: Arc::new(RwLock::new(SymbolIndex::new())),
            disposed: AtomicBool::new(false),
        })
    }

    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn parsers(&self) -> Arc<ParserRegistry> {
        Arc::clone(&self.parsers)
    }

    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fails with [`IndexError::Disposed`] once `dispose` has run
    pub fn check_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(IndexError::Disposed);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    pub async fn index_project(&self, root: &Path) -> Result<IndexSummary> {
        self.index_project_with_cancel(root, &CancellationToken::new())
            .await
    }

    /// Walk `root` and (re)index every accepted file that needs it.
    ///
    /// Parsing runs on up to `max_concurrency` tasks; results are written
    /// one file at a time. When `cancel` fires, no new file is started and
    /// the call fails with [`IndexError::Cancelled`]; files already written
    /// stay in the index.
    #[instrument(skip(self, root, cancel), fields(root = %root.display()))]
    pub async fn index_project_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexSummary> {
        self.check_active()?;
        let started = Instant::now();
        let root = self.resolve(root);
        let filter = WalkFilter::from_config(&self.config);
        let walk = self
            .fs
            .walk(&root, &filter)
            .await
            .map_err(|e| IndexError::io(&root, e))?;

        let mut summary = IndexSummary::new(root.clone());
        summary.discovered = walk.files.len() + walk.oversized.len();
        summary.skipped = walk.oversized.len();
        for path in &walk.oversized {
            debug!(path = %path.display(), "skipping oversized file");
        }
        summary.removed = self.prune_missing(&root, &walk.files).await;
        info!(
            files = walk.files.len(),
            removed = summary.removed,
            "indexing project"
        );

        let analyzer = self.analyzer();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let mut cancelled = false;

        for path in walk.files {
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                cancelled = true;
                break;
            };

            let analyzer = analyzer.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return (path, None);
                }
                let analysis = analyzer.analyze(&path, false).await;
                (path, Some(analysis))
            });

            while let Some(joined) = tasks.try_join_next() {
                cancelled |= self.record(joined, &mut summary).await?;
            }
        }
        while let Some(joined) = tasks.join_next().await {
            cancelled |= self.record(joined, &mut summary).await?;
        }

        summary.elapsed = started.elapsed();
        if cancelled {
            info!(indexed = summary.indexed, "indexing cancelled");
            return Err(IndexError::Cancelled {
                indexed: summary.indexed,
            });
        }
        info!(
            indexed = summary.indexed,
            skipped = summary.skipped,
            failed = summary.failed,
            symbols = summary.symbols,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "indexing complete"
        );
        Ok(summary)
    }

    /// Apply one finished task to the indexes; returns true when the task
    /// was abandoned because of cancellation.
    async fn record(
        &self,
        joined: std::result::Result<TaskOutput, JoinError>,
        summary: &mut IndexSummary,
    ) -> Result<bool> {
        let (path, analysis) = match joined {
            Ok(output) => output,
            Err(err) => {
                warn!("indexing task failed: {err}");
                summary.failed += 1;
                return Ok(false);
            }
        };
        let analysis = match analysis {
            None => return Ok(true),
            Some(Ok(analysis)) => analysis,
            Some(Err(err)) => {
                warn!(path = %path.display(), "cannot index file: {err}");
                summary.failed += 1;
                summary.failures.push((path, err.to_string()));
                return Ok(false);
            }
        };

        match self.commit(&path, analysis).await? {
            FileUpdate::Indexed { symbols } => {
                summary.indexed += 1;
                summary.symbols += symbols;
            }
            FileUpdate::ParseFailed(error) => {
                summary.failed += 1;
                summary.failures.push((path, error.to_string()));
            }
            FileUpdate::Unchanged | FileUpdate::Skipped | FileUpdate::Removed => {
                summary.skipped += 1;
            }
        }
        Ok(false)
    }

    /// Write one analysed file into both indexes under both write locks
    async fn commit(&self, path: &Path, analysis: FileAnalysis) -> Result<FileUpdate> {
        match analysis {
            FileAnalysis::Unchanged => Ok(FileUpdate::Unchanged),
            FileAnalysis::Unsupported => Ok(FileUpdate::Skipped),
            FileAnalysis::Oversized(size) => {
                debug!(path = %path.display(), size, "skipping oversized file");
                Ok(FileUpdate::Skipped)
            }
            FileAnalysis::Parsed {
                info,
                symbols,
                dependencies,
            } => {
                let entries = symbol_entries(&info, &symbols, &dependencies);
                let count = entries.len();

                let mut files = self.file_index.write().await;
                let mut index = self.symbol_index.write().await;
                files.add_file(info);
                files.set_file_symbols(path, symbols)?;
                files.set_file_dependencies(path, dependencies)?;
                index.apply(IndexCommand::ReplaceFile {
                    file_path: path.to_path_buf(),
                    entries,
                });

                debug!(path = %path.display(), symbols = count, "indexed file");
                Ok(FileUpdate::Indexed { symbols: count })
            }
            FileAnalysis::ParseFailed { info, error } => {
                let mut files = self.file_index.write().await;
                let mut index = self.symbol_index.write().await;
                files.add_file(info);
                files.set_file_parse_errors(path, vec![error.to_string()])?;
                index.remove_file_symbols(path);

                warn!(path = %path.display(), "{error}");
                Ok(FileUpdate::ParseFailed(error))
            }
        }
    }

    /// Drop entries under `root` that the walk no longer yields
    async fn prune_missing(&self, root: &Path, discovered: &[PathBuf]) -> usize {
        let discovered: HashSet<&PathBuf> = discovered.iter().collect();
        let stale: Vec<PathBuf> = self
            .file_index
            .read()
            .await
            .file_paths()
            .into_iter()
            .filter(|path| path.starts_with(root) && !discovered.contains(path))
            .collect();
        for path in &stale {
            debug!(path = %path.display(), "removing stale entry");
            self.remove_entries(path).await;
        }
        stale.len()
    }

    async fn remove_entries(&self, path: &Path) -> bool {
        let mut files = self.file_index.write().await;
        let mut index = self.symbol_index.write().await;
        index.remove_file_symbols(path);
        files.remove_file(path).is_some()
    }

    fn analyzer(&self) -> Analyzer {
        Analyzer {
            fs: Arc::clone(&self.fs),
            parsers: Arc::clone(&self.parsers),
            file_index: Arc::clone(&self.file_index),
            workspace: self.config.workspace_path.clone(),
            max_file_size: self.config.max_file_size,
        }
    }

    /// Relative paths are taken relative to the workspace
    /// Absolute, lexically normalized form of `path`; relative paths are
    /// taken against the workspace. Every index key goes through here.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.config.workspace_path.join(path))
        }
    }

    // ------------------------------------------------------------------
    // Incremental operations
    // ------------------------------------------------------------------

    /// Index one file unless it is unchanged since its last successful index
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn index_file(&self, path: &Path) -> Result<FileUpdate> {
        self.check_active()?;
        let path = self.resolve(path);
        let analysis = self.analyzer().analyze(&path, false).await?;
        self.commit(&path, analysis).await
    }

    /// Like `index_file`, but a file that has disappeared from disk is
    /// removed from the index.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn update_file(&self, path: &Path) -> Result<FileUpdate> {
        self.check_active()?;
        let path = self.resolve(path);
        if !self.fs.exists(&path).await {
            return Ok(if self.remove_entries(&path).await {
                FileUpdate::Removed
            } else {
                FileUpdate::Unchanged
            });
        }
        let analysis = self.analyzer().analyze(&path, false).await?;
        self.commit(&path, analysis).await
    }

    /// Reindex regardless of modification time
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn reindex_file(&self, path: &Path) -> Result<FileUpdate> {
        self.check_active()?;
        let path = self.resolve(path);
        let analysis = self.analyzer().analyze(&path, true).await?;
        self.commit(&path, analysis).await
    }

    /// Returns whether the file was in the index
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        self.check_active()?;
        let path = self.resolve(path);
        Ok(self.remove_entries(&path).await)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get_stats(&self) -> Result<EngineStats> {
        self.check_active()?;
        let files = self.file_index.read().await;
        let symbols = self.symbol_index.read().await;
        Ok(EngineStats {
            files: files.get_stats(),
            symbols: symbols.get_stats(),
        })
    }

    pub async fn find_symbol(&self, name: &str) -> Result<Vec<SymbolMatch>> {
        self.check_active()?;
        Ok(self.symbol_index.read().await.find_symbol(name))
    }

    pub async fn search_symbols(
        &self,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SymbolMatch>> {
        self.check_active()?;
        Ok(self
            .symbol_index
            .read()
            .await
            .search_symbols(pattern, options))
    }

    pub async fn find_symbols_by_type(&self, kind: SymbolKind) -> Result<Vec<Arc<SymbolIndexEntry>>> {
        self.check_active()?;
        Ok(self.symbol_index.read().await.find_symbols_by_type(kind))
    }

    pub async fn find_symbols_in_scope(&self, scope_key: &str) -> Result<Vec<Arc<SymbolIndexEntry>>> {
        self.check_active()?;
        Ok(self
            .symbol_index
            .read()
            .await
            .find_symbols_in_scope(scope_key))
    }

    pub async fn find_symbols_in_file(&self, path: &Path) -> Result<Vec<Arc<SymbolIndexEntry>>> {
        self.check_active()?;
        let path = self.resolve(path);
        Ok(self.symbol_index.read().await.find_symbols_in_file(&path))
    }

    pub async fn find_files_by_extension(&self, extension: &str) -> Result<Vec<FileInfo>> {
        self.check_active()?;
        Ok(self
            .file_index
            .read()
            .await
            .find_files_by_extension(extension))
    }

    pub async fn find_files_by_language(&self, language: &str) -> Result<Vec<FileInfo>> {
        self.check_active()?;
        Ok(self
            .file_index
            .read()
            .await
            .find_files_by_language(language))
    }

    pub async fn get_file_parse_errors(&self, path: &Path) -> Result<Vec<String>> {
        self.check_active()?;
        let path = self.resolve(path);
        Ok(self.file_index.read().await.get_file_parse_errors(&path))
    }

    pub async fn get_file_entry(&self, path: &Path) -> Result<Option<Arc<FileIndexEntry>>> {
        self.check_active()?;
        let path = self.resolve(path);
        Ok(self.file_index.read().await.get_entry(&path))
    }

    /// Every indexed path, sorted
    pub async fn indexed_files(&self) -> Result<Vec<PathBuf>> {
        self.check_active()?;
        Ok(self.file_index.read().await.file_paths())
    }

    // ------------------------------------------------------------------
    // Persistence and lifecycle
    // ------------------------------------------------------------------

    /// Write a snapshot of the file index to the configured location
    pub async fn persist(&self) -> Result<PathBuf> {
        self.check_active()?;
        self.write_snapshot().await
    }

    async fn write_snapshot(&self) -> Result<PathBuf> {
        let path = self.config.snapshot_path();
        let entries: Vec<FileIndexEntry> = self
            .file_index
            .read()
            .await
            .entries()
            .map(|entry| FileIndexEntry::clone(entry))
            .collect();
        let count = entries.len();
        IndexSnapshot::new(&self.config.workspace_path, entries)
            .save(self.fs.as_ref(), &path)
            .await?;
        info!(path = %path.display(), files = count, "index snapshot written");
        Ok(path)
    }

    /// Replace both indexes with the stored snapshot. Returns the number of
    /// files restored, zero when there is no snapshot or it cannot be read
    /// back; the next `index_project` then rebuilds everything.
    pub async fn restore(&self) -> Result<usize> {
        self.check_active()?;
        let path = self.config.snapshot_path();
        let snapshot = match IndexSnapshot::load(&path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(path = %path.display(), "no index snapshot to restore");
                return Ok(0);
            }
            Err(IndexError::Persistence(reason)) => {
                warn!(path = %path.display(), "ignoring unusable index snapshot: {reason}");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        let mut files = self.file_index.write().await;
        let mut index = self.symbol_index.write().await;
        files.clear();
        index.clear();
        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            if entry.is_indexed {
                index.add_symbols(symbol_entries(&entry.info, &entry.symbols, &entry.dependencies));
            }
            files.restore_entry(entry);
        }
        info!(path = %path.display(), files = count, "index snapshot restored");
        Ok(count)
    }

    /// Release the indexes. Idempotent: only the first call persists (when
    /// enabled) and clears; later calls return `Ok(())`.
    pub async fn dispose(&self) -> Result<()> {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let persisted = if self.config.enable_persistence {
            self.write_snapshot().await.map(|_| ())
        } else {
            Ok(())
        };

        let mut files = self.file_index.write().await;
        let mut index = self.symbol_index.write().await;
        files.clear();
        index.clear();
        info!("index engine disposed");
        persisted
    }
}

//! Cross-file rename with conflict detection and undo.
//!
//! A rename runs through `Pending -> Previewed -> Applying` and ends in
//! `Completed`, `Failed` or `Cancelled`. Every file that was written is
//! recorded together with the inverse of its edits, so `undo` can revert
//! exactly what was applied even when the rename stopped half way.

mod edits;
mod locks;
mod reference_updater;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use uuid::Uuid;

pub use edits::AppliedEdits;
pub use edits::EditError;
pub use edits::apply_edits;
pub use locks::FileLockGuard;
pub use locks::FileLockTable;
pub use reference_updater::FileEdits;
pub use reference_updater::ReferenceUpdater;

use crate::engine::IndexEngine;
use crate::error::ReferenceResolutionError;
use crate::error::RenameError;
use crate::symbol_index::SymbolIndexEntry;
use crate::types::SourceLocation;
use crate::types::Symbol;
use crate::types::SymbolKind;
use crate::types::TextEdit;
use crate::types::checksum;

pub type RenameResultOf<T> = std::result::Result<T, RenameError>;

const PER_FILE_ESTIMATE: Duration = Duration::from_millis(10);
const PER_EDIT_ESTIMATE: Duration = Duration::from_micros(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameStatus {
    Pending,
    Previewed,
    Applying,
    Completed,
    Failed,
    Cancelled,
    Undone,
}

impl RenameStatus {
    pub const fn can_transition_to(self, next: Self) -> bool {
        use RenameStatus::*;
        matches!(
            (self, next),
            (Pending, Previewed)
                | (Pending, Applying)
                | (Previewed, Applying)
                | (Applying, Completed)
                | (Applying, Failed)
                | (Applying, Cancelled)
                | (Completed, Undone)
                | (Failed, Undone)
                | (Cancelled, Undone)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Undone
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// References could not be located or matched
    Resolve,
    Write,
    /// The file was written but the index could not be refreshed
    Reindex,
    /// The file changed after the rename and was left alone
    Undo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub stage: FailureStage,
    pub message: String,
}

impl FileFailure {
    fn new(path: &Path, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            stage,
            message: message.into(),
        }
    }
}

impl From<&ReferenceResolutionError> for FileFailure {
    fn from(err: &ReferenceResolutionError) -> Self {
        Self::new(&err.path, FailureStage::Resolve, err.reason.clone())
    }
}

/// One written file: the edits applied and the edits that revert them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFile {
    pub path: PathBuf,
    pub edits: Vec<TextEdit>,
    pub inverse: Vec<TextEdit>,
    /// Checksum of the content before the rename
    pub original_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOperation {
    pub id: Uuid,
    pub symbol: Symbol,
    pub new_name: String,
    pub files: Vec<PathBuf>,
    pub status: RenameStatus,
    /// In application order
    pub applied: Vec<AppliedFile>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RenameOperation {
    fn new(symbol: Symbol, new_name: &str, files: Vec<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            new_name: new_name.to_string(),
            files,
            status: RenameStatus::Pending,
            applied: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn transition(&mut self, next: RenameStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "invalid rename transition {:?} -> {next:?}",
            self.status
        );
        debug!(id = %self.id, from = ?self.status, to = ?next, "rename status");
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn edit_count(&self) -> usize {
        self.applied.iter().map(|f| f.edits.len()).sum()
    }
}

/// An existing symbol that already uses the new name in the target's scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameConflict {
    pub name: String,
    pub kind: SymbolKind,
    pub location: SourceLocation,
    pub scope: Option<String>,
}

impl From<&SymbolIndexEntry> for RenameConflict {
    fn from(entry: &SymbolIndexEntry) -> Self {
        Self {
            name: entry.symbol.name.clone(),
            kind: entry.symbol.kind,
            location: entry.symbol.location.clone(),
            scope: entry.symbol.scope_key(),
        }
    }
}

impl fmt::Display for RenameConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' at {}", self.kind, self.name, self.location)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenameOptions {
    /// Apply even when conflicts were found
    pub force: bool,
    /// Checked before each file is scanned and before each file is written
    pub cancel: CancellationToken,
}

impl RenameOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenamePreview {
    pub symbol: String,
    pub new_name: String,
    pub affected_files: Vec<PathBuf>,
    pub reference_count: usize,
    pub conflicts: Vec<RenameConflict>,
    pub edits: Vec<FileEdits>,
    pub errors: Vec<FileFailure>,
    pub estimated_duration: Duration,
    /// False when conflicts would block an unforced rename
    pub can_execute: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameResult {
    pub operation_id: Uuid,
    pub status: RenameStatus,
    pub success: bool,
    pub files_changed: Vec<PathBuf>,
    pub edits_applied: usize,
    pub failures: Vec<FileFailure>,
    /// Files not attempted after a write failure or cancellation
    pub skipped: Vec<PathBuf>,
    /// Conflicts overridden by `force`
    pub conflicts: Vec<RenameConflict>,
    pub cancelled: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoResult {
    pub operation_id: Uuid,
    pub status: RenameStatus,
    pub restored: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
    /// True when every file was reverted and the operation left the log
    pub complete: bool,
}

/// Check that `new_name` is an identifier distinct from the current name
pub fn validate_new_name(symbol: &Symbol, new_name: &str) -> RenameResultOf<()> {
    let invalid = |reason: &str| RenameError::InvalidName {
        name: new_name.to_string(),
        reason: reason.to_string(),
    };
    let is_ident_char = |c: char| c.is_alphanumeric() || c == '_' || c == '$';

    let Some(first) = new_name.chars().next() else {
        return Err(invalid("name is empty"));
    };
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return Err(invalid("must start with a letter or underscore"));
    }
    if let Some(bad) = new_name.chars().find(|c| !is_ident_char(*c)) {
        return Err(invalid(&format!("contains {bad:?}")));
    }
    if new_name == symbol.name {
        return Err(invalid("same as the current name"));
    }
    Ok(())
}

pub struct RenameEngine {
    index: Arc<IndexEngine>,
    updater: ReferenceUpdater,
    operations: DashMap<Uuid, RenameOperation>,
    locks: FileLockTable,
}

impl fmt::Debug for RenameEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenameEngine")
            .field("index", &self.index)
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

impl RenameEngine {
    pub fn new(index: Arc<IndexEngine>) -> Self {
        let updater = ReferenceUpdater::new(index.parsers(), index.file_system());
        Self {
            index,
            updater,
            operations: DashMap::new(),
            locks: FileLockTable::new(),
        }
    }

    pub fn index(&self) -> &Arc<IndexEngine> {
        &self.index
    }

    /// Resolve `files` the way the index keys them and pair each with the
    /// real path its lock is taken on. Aliases of one file collapse into one
    /// entry. Sorted by lock key.
    async fn resolve_files(&self, files: &[PathBuf]) -> BTreeMap<PathBuf, PathBuf> {
        let fs = self.index.file_system();
        let mut resolved = BTreeMap::new();
        for file in files {
            let path = self.index.resolve(file);
            let key = match fs.canonicalize(&path).await {
                Ok(real) => real,
                Err(err) => {
                    debug!(path = %path.display(), "cannot canonicalize, locking as given: {err}");
                    path.clone()
                }
            };
            resolved.entry(key).or_insert(path);
        }
        resolved
    }

    /// Lock every file in `resolved` or fail naming the busy ones
    fn lock_files(
        &self,
        resolved: &BTreeMap<PathBuf, PathBuf>,
    ) -> RenameResultOf<FileLockGuard<'_>> {
        self.locks
            .try_acquire(resolved.keys().cloned())
            .map_err(|busy| RenameError::ConcurrentRename {
                paths: busy
                    .iter()
                    .map(|key| resolved.get(key).cloned().unwrap_or_else(|| key.clone()))
                    .collect(),
            })
    }

    /// Indexed files in the same language as the symbol's own file
    pub async fn candidate_files(&self, symbol: &Symbol) -> RenameResultOf<Vec<PathBuf>> {
        let language = self
            .index
            .get_file_entry(symbol.file_path())
            .await?
            .and_then(|entry| entry.info.language.clone());
        let files = match language {
            Some(language) => self.index.find_files_by_language(&language).await?,
            None => {
                let extension = symbol
                    .file_path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                self.index.find_files_by_extension(extension).await?
            }
        };
        Ok(files.into_iter().map(|info| info.file_path).collect())
    }

    /// Symbols already named `new_name` in the target's scope. A symbol
    /// without a scope conflicts with unscoped symbols of its own file.
    pub async fn find_conflicts(
        &self,
        symbol: &Symbol,
        new_name: &str,
    ) -> RenameResultOf<Vec<RenameConflict>> {
        let candidates = match symbol.scope_key() {
            Some(key) => self.index.find_symbols_in_scope(&key).await?,
            None => self
                .index
                .find_symbols_in_file(symbol.file_path())
                .await?
                .into_iter()
                .filter(|entry| entry.symbol.scope.is_none())
                .collect(),
        };
        Ok(candidates
            .iter()
            .filter(|entry| entry.symbol.name == new_name)
            .map(|entry| RenameConflict::from(entry.as_ref()))
            .collect())
    }

    /// Dry run: conflicts, affected files and the edits a rename would make
    #[instrument(skip(self, symbol, files), fields(symbol = %symbol.name, files = files.len()))]
    pub async fn preview_rename(
        &self,
        symbol: &Symbol,
        new_name: &str,
        files: &[PathBuf],
    ) -> RenameResultOf<RenamePreview> {
        self.index.check_active()?;
        validate_new_name(symbol, new_name)?;

        let conflicts = self.find_conflicts(symbol, new_name).await?;
        let files: Vec<PathBuf> = self.resolve_files(files).await.into_values().collect();
        let scan = self
            .updater
            .scan(symbol, new_name, &files, &CancellationToken::new())
            .await;
        let reference_count = scan.reference_count();
        let estimated_duration = PER_FILE_ESTIMATE * scan.plans.len() as u32
            + PER_EDIT_ESTIMATE * reference_count as u32;

        Ok(RenamePreview {
            symbol: symbol.name.clone(),
            new_name: new_name.to_string(),
            affected_files: scan.plans.iter().map(|p| p.edits.path.clone()).collect(),
            reference_count,
            can_execute: conflicts.is_empty(),
            conflicts,
            edits: scan.plans.into_iter().map(|p| p.edits).collect(),
            errors: scan.errors.iter().map(FileFailure::from).collect(),
            estimated_duration,
        })
    }

    /// Rename `symbol` to `new_name` across `files`.
    ///
    /// Files are written one at a time in path order. The first write
    /// failure stops the run; files already written stay written and are
    /// recorded so `undo` can revert them.
    #[instrument(skip(self, symbol, files, options), fields(symbol = %symbol.name, files = files.len()))]
    pub async fn rename(
        &self,
        symbol: &Symbol,
        new_name: &str,
        files: &[PathBuf],
        options: RenameOptions,
    ) -> RenameResultOf<RenameResult> {
        self.index.check_active()?;
        validate_new_name(symbol, new_name)?;
        let started = Instant::now();

        let conflicts = self.find_conflicts(symbol, new_name).await?;
        if !conflicts.is_empty() && !options.force {
            return Err(RenameError::Conflict {
                symbol: symbol.name.clone(),
                new_name: new_name.to_string(),
                conflicts: conflicts.iter().map(ToString::to_string).collect(),
            });
        }

        let resolved = self.resolve_files(files).await;
        let guard = self.lock_files(&resolved)?;
        let mut files: Vec<PathBuf> = resolved.into_values().collect();
        files.sort();
        let mut operation = RenameOperation::new(symbol.clone(), new_name, files.clone());

        let scan = self
            .updater
            .scan(symbol, new_name, &files, &options.cancel)
            .await;
        operation.transition(RenameStatus::Previewed);

        let mut failures: Vec<FileFailure> = scan.errors.iter().map(FileFailure::from).collect();
        let mut cancelled = !scan.unscanned.is_empty();
        let mut skipped = scan.unscanned;

        operation.transition(RenameStatus::Applying);
        let fs = self.index.file_system();
        let mut plans = scan.plans.into_iter();
        for plan in plans.by_ref() {
            let path = plan.edits.path;
            if options.cancel.is_cancelled() {
                cancelled = true;
                skipped.push(path);
                break;
            }
            let applied = match apply_edits(&path, &plan.content, &plan.edits.edits) {
                Ok(applied) => applied,
                Err(err) => {
                    warn!(path = %path.display(), "cannot apply edits: {err}");
                    failures.push(FileFailure::new(&path, FailureStage::Resolve, err.to_string()));
                    continue;
                }
            };
            if let Err(err) = fs.write(&path, &applied.content).await {
                warn!(path = %path.display(), "write failed: {err}");
                failures.push(FileFailure::new(&path, FailureStage::Write, err.to_string()));
                break;
            }
            debug!(path = %path.display(), edits = plan.edits.edits.len(), "file rewritten");
            operation.applied.push(AppliedFile {
                original_checksum: checksum(&plan.content),
                path,
                edits: plan.edits.edits,
                inverse: applied.inverse,
            });
        }
        skipped.extend(plans.map(|plan| plan.edits.path));

        for file in &operation.applied {
            if let Err(err) = self.index.reindex_file(&file.path).await {
                warn!(path = %file.path.display(), "reindex after rename failed: {err}");
                failures.push(FileFailure::new(&file.path, FailureStage::Reindex, err.to_string()));
            }
        }

        let status = if cancelled {
            RenameStatus::Cancelled
        } else if failures.is_empty() {
            RenameStatus::Completed
        } else {
            RenameStatus::Failed
        };
        operation.transition(status);
        drop(guard);

        let result = RenameResult {
            operation_id: operation.id,
            status,
            success: status == RenameStatus::Completed,
            files_changed: operation.applied.iter().map(|f| f.path.clone()).collect(),
            edits_applied: operation.edit_count(),
            failures,
            skipped,
            conflicts,
            cancelled,
            duration: started.elapsed(),
        };
        info!(
            id = %operation.id,
            status = ?status,
            files = result.files_changed.len(),
            edits = result.edits_applied,
            "rename finished"
        );
        if status == RenameStatus::Completed || !operation.applied.is_empty() {
            self.operations.insert(operation.id, operation);
        }
        Ok(result)
    }

    /// Revert a stored rename, last written file first.
    ///
    /// A file whose renamed text is no longer where the rename put it is
    /// left untouched and reported; the operation then stays in the log
    /// holding only those files.
    #[instrument(skip(self))]
    pub async fn undo(&self, id: Uuid) -> RenameResultOf<UndoResult> {
        self.index.check_active()?;
        let paths: Vec<PathBuf> = self
            .operations
            .get(&id)
            .map(|op| op.applied.iter().map(|f| f.path.clone()).collect())
            .ok_or(RenameError::OperationNotFound(id))?;
        let resolved = self.resolve_files(&paths).await;
        let guard = self.lock_files(&resolved)?;
        // re-read under the locks: a concurrent undo may have consumed it
        let operation = self
            .operations
            .get(&id)
            .map(|op| op.clone())
            .ok_or(RenameError::OperationNotFound(id))?;

        let mut restored = Vec::new();
        let mut failures = Vec::new();
        let mut remaining = Vec::new();
        for file in operation.applied.iter().rev() {
            match self.revert_file(file).await {
                Ok(()) => restored.push(file.path.clone()),
                Err(failure) => {
                    failures.push(failure);
                    remaining.push(file.clone());
                }
            }
        }
        for path in &restored {
            if let Err(err) = self.index.reindex_file(path).await {
                warn!(path = %path.display(), "reindex after undo failed: {err}");
                failures.push(FileFailure::new(path, FailureStage::Reindex, err.to_string()));
            }
        }

        let complete = remaining.is_empty();
        let status = if complete {
            self.operations.remove(&id);
            RenameStatus::Undone
        } else {
            remaining.reverse();
            if let Some(mut stored) = self.operations.get_mut(&id) {
                stored.applied = remaining;
            }
            operation.status
        };
        drop(guard);

        info!(%id, restored = restored.len(), complete, "undo finished");
        Ok(UndoResult {
            operation_id: id,
            status,
            restored,
            failures,
            complete,
        })
    }

    async fn revert_file(&self, file: &AppliedFile) -> Result<(), FileFailure> {
        let fs = self.index.file_system();
        let content = fs
            .read_to_string(&file.path)
            .await
            .map_err(|e| FileFailure::new(&file.path, FailureStage::Undo, format!("cannot read file: {e}")))?;
        let reverted = apply_edits(&file.path, &content, &file.inverse).map_err(|e| {
            FileFailure::new(
                &file.path,
                FailureStage::Undo,
                format!("file changed since rename: {e}"),
            )
        })?;
        fs.write(&file.path, &reverted.content)
            .await
            .map_err(|e| FileFailure::new(&file.path, FailureStage::Write, e.to_string()))?;

        if checksum(&reverted.content) == file.original_checksum {
            debug!(path = %file.path.display(), "restored original content");
        } else {
            debug!(path = %file.path.display(), "reverted rename, unrelated changes kept");
        }
        Ok(())
    }

    pub fn operation(&self, id: Uuid) -> Option<RenameOperation> {
        self.operations.get(&id).map(|op| op.clone())
    }

    /// Stored operations, oldest first
    pub fn operations(&self) -> Vec<RenameOperation> {
        let mut all: Vec<RenameOperation> = self
            .operations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|op| op.created_at);
        all
    }

    /// Forget an operation without reverting it
    pub fn discard(&self, id: Uuid) -> bool {
        self.operations.remove(&id).is_some()
    }
}

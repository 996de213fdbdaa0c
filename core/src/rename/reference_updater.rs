//! Turns a symbol's references into per-file literal edits.

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::ReferenceResolutionError;
use crate::fs::FileSystem;
use crate::parser::ParserRegistry;
use crate::types::Symbol;
use crate::types::TextEdit;

/// Edits for one file, in ascending byte order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEdits {
    pub path: PathBuf,
    pub edits: Vec<TextEdit>,
}

/// A file's edits together with the content they were computed against
#[derive(Debug, Clone)]
pub(crate) struct FilePlan {
    pub(crate) edits: FileEdits,
    pub(crate) content: String,
}

#[derive(Debug, Default)]
pub(crate) struct ReferenceScan {
    /// Files with at least one reference, sorted by path
    pub(crate) plans: Vec<FilePlan>,
    pub(crate) errors: Vec<ReferenceResolutionError>,
    /// Files never scanned because the scan was cancelled
    pub(crate) unscanned: Vec<PathBuf>,
}

impl ReferenceScan {
    pub(crate) fn reference_count(&self) -> usize {
        self.plans.iter().map(|p| p.edits.edits.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceUpdater {
    parsers: Arc<ParserRegistry>,
    fs: Arc<dyn FileSystem>,
}

impl ReferenceUpdater {
    pub fn new(parsers: Arc<ParserRegistry>, fs: Arc<dyn FileSystem>) -> Self {
        Self { parsers, fs }
    }

    /// Edits renaming every reference to `symbol` in `path` to `new_name`.
    /// An empty list means the file does not mention the symbol.
    pub async fn edits_for_file(
        &self,
        symbol: &Symbol,
        new_name: &str,
        path: &Path,
    ) -> Result<FileEdits, ReferenceResolutionError> {
        self.plan_file(symbol, new_name, path).await.map(|plan| plan.edits)
    }

    pub(crate) async fn scan(
        &self,
        symbol: &Symbol,
        new_name: &str,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> ReferenceScan {
        let ordered: BTreeSet<&PathBuf> = files.iter().collect();
        let mut scan = ReferenceScan::default();

        for path in ordered {
            if cancel.is_cancelled() {
                scan.unscanned.push(path.clone());
                continue;
            }
            match self.plan_file(symbol, new_name, path).await {
                Ok(plan) if plan.edits.edits.is_empty() => {
                    debug!(path = %path.display(), "no references");
                }
                Ok(plan) => scan.plans.push(plan),
                Err(err) => {
                    warn!("{err}");
                    scan.errors.push(err);
                }
            }
        }
        scan
    }

    async fn plan_file(
        &self,
        symbol: &Symbol,
        new_name: &str,
        path: &Path,
    ) -> Result<FilePlan, ReferenceResolutionError> {
        let parser = self.parsers.parser_for_path(path).ok_or_else(|| {
            ReferenceResolutionError::new(path, "no parser registered for this file type")
        })?;
        let content = self
            .fs
            .read_to_string(path)
            .await
            .map_err(|e| ReferenceResolutionError::new(path, format!("cannot read file: {e}")))?;
        let tree = parser
            .parse(&content, path)
            .map_err(|e| ReferenceResolutionError::new(path, e.to_string()))?;
        let mut references = parser
            .find_references(&tree, symbol)
            .map_err(|e| ReferenceResolutionError::new(path, e.to_string()))?;

        references.sort_by_key(|r| r.location.byte_range);
        references.dedup_by_key(|r| r.location.byte_range);

        let mut edits = Vec::with_capacity(references.len());
        for reference in references {
            let (start, end) = reference.location.byte_range;
            let found = content.get(start..end);
            if found != Some(symbol.name.as_str()) {
                return Err(ReferenceResolutionError::new(
                    path,
                    format!(
                        "expected '{}' at {}, found {:?}",
                        symbol.name,
                        reference.location,
                        found.unwrap_or("<out of range>")
                    ),
                ));
            }
            edits.push(TextEdit {
                location: reference.location,
                old_text: symbol.name.clone(),
                new_text: new_name.to_string(),
            });
        }

        Ok(FilePlan {
            edits: FileEdits {
                path: path.to_path_buf(),
                edits,
            },
            content,
        })
    }
}

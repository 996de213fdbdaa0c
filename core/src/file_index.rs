//! Durable per-file records: metadata, extracted symbols, dependencies and
//! parse errors, keyed by file path.
//!
//! Entries are immutable values behind `Arc`; every mutation builds a new
//! entry and swaps it in, so a reader holding an old entry never sees a torn
//! update.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::IndexError;
use crate::error::Result;
use crate::types::Dependency;
use crate::types::FileInfo;
use crate::types::Symbol;

/// Fixed per-entry overhead used by the memory estimate (bytes)
const ENTRY_OVERHEAD_BYTES: usize = 256;
/// Estimated cost of one stored symbol (bytes)
const SYMBOL_BYTES: usize = 200;
/// Estimated cost of one stored dependency (bytes)
const DEPENDENCY_BYTES: usize = 100;

/// Everything known about one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub info: FileInfo,
    pub symbols: Vec<Symbol>,
    pub dependencies: Vec<Dependency>,
    pub is_indexed: bool,
    pub last_indexed: Option<DateTime<Utc>>,
    pub parse_errors: Vec<String>,
}

impl FileIndexEntry {
    fn new(info: FileInfo) -> Self {
        Self {
            info,
            symbols: Vec::new(),
            dependencies: Vec::new(),
            is_indexed: false,
            last_indexed: None,
            parse_errors: Vec::new(),
        }
    }

    fn estimated_bytes(&self) -> usize {
        self.info.file_path.as_os_str().len() * 2
            + ENTRY_OVERHEAD_BYTES
            + self.symbols.len() * SYMBOL_BYTES
            + self.dependencies.len() * DEPENDENCY_BYTES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexStats {
    pub total_files: usize,
    pub indexed_files: usize,
    pub total_symbols: usize,
    pub total_dependencies: usize,
    pub files_with_errors: usize,
    /// Rough estimate, not a measurement
    pub memory_usage_bytes: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FileIndex {
    entries: HashMap<PathBuf, Arc<FileIndexEntry>>,
    last_updated: DateTime<Utc>,
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIndex {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Record a file. Replaces any previous entry for the same path with a
    /// fresh, not-yet-indexed one.
    pub fn add_file(&mut self, info: FileInfo) -> Arc<FileIndexEntry> {
        let entry = Arc::new(FileIndexEntry::new(info));
        self.entries
            .insert(entry.info.file_path.clone(), Arc::clone(&entry));
        self.touch();
        entry
    }

    /// Re-insert a previously stored entry as-is (snapshot restore).
    pub(crate) fn restore_entry(&mut self, entry: FileIndexEntry) {
        self.entries
            .insert(entry.info.file_path.clone(), Arc::new(entry));
        self.touch();
    }

    pub fn set_file_symbols(&mut self, path: &Path, symbols: Vec<Symbol>) -> Result<()> {
        self.replace_entry(path, |entry| {
            entry.symbols = symbols;
            entry.parse_errors.clear();
            mark_indexed(entry);
        })
    }

    pub fn set_file_dependencies(&mut self, path: &Path, dependencies: Vec<Dependency>) -> Result<()> {
        self.replace_entry(path, |entry| {
            entry.dependencies = dependencies;
            mark_indexed(entry);
        })
    }

    /// Record parser failures. The file stays "not successfully indexed" so
    /// the next reindex check retries it.
    pub fn set_file_parse_errors(&mut self, path: &Path, errors: Vec<String>) -> Result<()> {
        self.replace_entry(path, |entry| {
            entry.parse_errors = errors;
            entry.symbols.clear();
            entry.dependencies.clear();
            entry.is_indexed = false;
        })
    }

    pub fn get_file_parse_errors(&self, path: &Path) -> Vec<String> {
        self.entries
            .get(path)
            .map(|e| e.parse_errors.clone())
            .unwrap_or_default()
    }

    /// Returns the removed entry, if there was one
    pub fn remove_file(&mut self, path: &Path) -> Option<Arc<FileIndexEntry>> {
        let removed = self.entries.remove(path);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_file_indexed(&self, path: &Path) -> bool {
        self.entries.get(path).is_some_and(|e| e.is_indexed)
    }

    pub fn get_file_info(&self, path: &Path) -> Option<FileInfo> {
        self.entries.get(path).map(|e| e.info.clone())
    }

    pub fn get_entry(&self, path: &Path) -> Option<Arc<FileIndexEntry>> {
        self.entries.get(path).cloned()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<FileIndexEntry>> {
        self.entries.values()
    }

    /// All indexed paths, sorted
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Full scan; `extension` may be given with or without the dot
    pub fn find_files_by_extension(&self, extension: &str) -> Vec<FileInfo> {
        let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
        self.collect_sorted(|info| info.extension == wanted)
    }

    /// Full scan, case-insensitive on the language name
    pub fn find_files_by_language(&self, language: &str) -> Vec<FileInfo> {
        self.collect_sorted(|info| {
            info.language
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(language))
        })
    }

    /// True when the file is unknown, was never successfully indexed, or
    /// `modified` is strictly newer than the recorded modification time.
    /// Equal timestamps do not trigger a reindex.
    pub fn needs_reindexing(&self, path: &Path, modified: DateTime<Utc>) -> bool {
        match self.entries.get(path) {
            None => true,
            Some(entry) if !entry.is_indexed => true,
            Some(entry) => modified > entry.info.last_modified,
        }
    }

    pub fn get_stats(&self) -> FileIndexStats {
        let mut stats = FileIndexStats {
            total_files: self.entries.len(),
            indexed_files: 0,
            total_symbols: 0,
            total_dependencies: 0,
            files_with_errors: 0,
            memory_usage_bytes: 0,
            last_updated: self.last_updated,
        };
        for entry in self.entries.values() {
            if entry.is_indexed {
                stats.indexed_files += 1;
            }
            if !entry.parse_errors.is_empty() {
                stats.files_with_errors += 1;
            }
            stats.total_symbols += entry.symbols.len();
            stats.total_dependencies += entry.dependencies.len();
            stats.memory_usage_bytes += entry.estimated_bytes();
        }
        stats
    }

    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.touch();
    }

    /// Copy-on-write: clone the current entry, mutate the copy, swap it in.
    fn replace_entry(&mut self, path: &Path, mutate: impl FnOnce(&mut FileIndexEntry)) -> Result<()> {
        let current = self
            .entries
            .get(path)
            .ok_or_else(|| IndexError::FileNotFound(path.to_path_buf()))?;
        let mut next = FileIndexEntry::clone(current);
        mutate(&mut next);
        self.entries.insert(path.to_path_buf(), Arc::new(next));
        self.touch();
        Ok(())
    }

    fn collect_sorted(&self, predicate: impl Fn(&FileInfo) -> bool) -> Vec<FileInfo> {
        let mut found: Vec<FileInfo> = self
            .entries
            .values()
            .filter(|e| predicate(&e.info))
            .map(|e| e.info.clone())
            .collect();
        found.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        found
    }

    /// `last_updated` never moves backwards, even if the wall clock does
    fn touch(&mut self) {
        self.last_updated = self.last_updated.max(Utc::now());
    }
}

fn mark_indexed(entry: &mut FileIndexEntry) {
    entry.is_indexed = true;
    entry.last_indexed = Some(Utc::now());
}

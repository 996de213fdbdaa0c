//! Advisory per-file locks held for the duration of a rename or undo.

use std::collections::BTreeSet;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

#[derive(Debug, Default)]
pub struct FileLockTable {
    held: Mutex<HashSet<PathBuf>>,
}

impl FileLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every path or none. On contention returns the busy paths, sorted.
    pub fn try_acquire<I>(&self, paths: I) -> Result<FileLockGuard<'_>, Vec<PathBuf>>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let wanted: BTreeSet<PathBuf> = paths.into_iter().collect();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        let busy: Vec<PathBuf> = wanted
            .iter()
            .filter(|path| held.contains(*path))
            .cloned()
            .collect();
        if !busy.is_empty() {
            return Err(busy);
        }

        held.extend(wanted.iter().cloned());
        Ok(FileLockGuard {
            table: self,
            paths: wanted.into_iter().collect(),
        })
    }

    pub fn is_locked(&self, path: &std::path::Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// Releases its paths on drop
#[derive(Debug)]
pub struct FileLockGuard<'a> {
    table: &'a FileLockTable,
    paths: Vec<PathBuf>,
}

impl FileLockGuard<'_> {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .table
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for path in &self.paths {
            held.remove(path);
        }
    }
}

//! Filesystem capability: read, write, stat and directory walk.

use std::fmt;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use walkdir::WalkDir;
use wildmatch::WildMatch;

use crate::config::IndexConfig;

/// Size and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Which files a walk yields
#[derive(Debug, Clone)]
pub struct WalkFilter {
    include_extensions: Vec<String>,
    exclude_patterns: Vec<WildMatch>,
    max_file_size: u64,
}

impl WalkFilter {
    pub fn new(include_extensions: &[String], exclude_patterns: &[String], max_file_size: u64) -> Self {
        Self {
            include_extensions: include_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_patterns: exclude_patterns.iter().map(|p| WildMatch::new(p)).collect(),
            max_file_size,
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(
            &config.include_extensions,
            &config.exclude_patterns,
            config.max_file_size,
        )
    }

    /// `relative` is the workspace-relative path. Directories are matched
    /// with a trailing slash so `**/target/**` prunes the directory itself.
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        let mut candidate = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
        if is_dir {
            candidate.push('/');
        }
        self.exclude_patterns.iter().any(|p| p.matches(&candidate))
    }

    pub fn is_included(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.include_extensions.iter().any(|inc| *inc == ext)
            })
    }

    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

/// Drop `.` components and fold `..` into its parent without touching the
/// disk. A `..` that would climb above the root or a relative start is kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(Component::CurDir);
    }
    normalized
}

/// Files found by a walk, plus the ones left out for size
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    pub files: Vec<PathBuf>,
    pub oversized: Vec<PathBuf>,
}

#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the whole content of `path`
    async fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    async fn exists(&self, path: &Path) -> bool;

    /// The file's real path, with symlinks resolved
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Files under `root` accepted by `filter`, in a stable (sorted) order
    async fn walk(&self, root: &Path, filter: &WalkFilter) -> io::Result<WalkOutcome>;
}

/// The local disk, via `tokio::fs` and `walkdir`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub const fn new() -> Self {
        Self
    }

    fn walk_blocking(root: &Path, filter: &WalkFilter) -> io::Result<WalkOutcome> {
        let mut outcome = WalkOutcome::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                relative.as_os_str().is_empty()
                    || !filter.is_excluded(relative, entry.file_type().is_dir())
            });

        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() || !filter.is_included(entry.path()) {
                continue;
            }
            let size = entry.metadata().map_err(io::Error::other)?.len();
            if size > filter.max_file_size() {
                outcome.oversized.push(entry.into_path());
            } else {
                outcome.files.push(entry.into_path());
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        // A symlink is written through to its target, keeping the link
        let target = match tokio::fs::canonicalize(path).await {
            Ok(target) => target,
            Err(err) if err.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
            Err(err) => return Err(err),
        };
        let permissions = match tokio::fs::metadata(&target).await {
            Ok(metadata) => Some(metadata.permissions()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };

        // Write next to the target and rename over it so readers never see a partial file
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let temp_path = target.with_file_name(format!(".{file_name}.symdex.tmp"));
        tokio::fs::write(&temp_path, contents).await?;
        let mut replaced = match permissions {
            Some(permissions) => tokio::fs::set_permissions(&temp_path, permissions).await,
            None => Ok(()),
        };
        if replaced.is_ok() {
            replaced = tokio::fs::rename(&temp_path, &target).await;
        }
        if let Err(err) = replaced {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err);
        }
        Ok(())
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }

    async fn walk(&self, root: &Path, filter: &WalkFilter) -> io::Result<WalkOutcome> {
        let root = root.to_path_buf();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || Self::walk_blocking(&root, &filter))
            .await
            .map_err(io::Error::other)?
    }
}

//! JSON snapshots of the file index.
//!
//! Only [`FileIndexEntry`] values are stored; the symbol index is rebuilt
//! from their symbols on restore.

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::IndexError;
use crate::error::Result;
use crate::file_index::FileIndexEntry;
use crate::fs::FileSystem;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub workspace_path: PathBuf,
    pub entries: Vec<FileIndexEntry>,
}

impl IndexSnapshot {
    pub fn new(workspace_path: impl Into<PathBuf>, mut entries: Vec<FileIndexEntry>) -> Self {
        entries.sort_by(|a, b| a.info.file_path.cmp(&b.info.file_path));
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            workspace_path: workspace_path.into(),
            entries,
        }
    }

    /// Write the snapshot through `fs`, creating parent directories as
    /// needed. A crash mid-write leaves the previous snapshot in place.
    pub async fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IndexError::Persistence(format!("failed to encode snapshot: {e}")))?;
        fs.write(path, &json)
            .await
            .map_err(|e| IndexError::io(path, e))
    }

    /// `Ok(None)` when no snapshot exists at `path`
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndexError::io(path, e)),
        };
        let snapshot: Self = serde_json::from_str(&json).map_err(|e| {
            IndexError::Persistence(format!("corrupt snapshot {}: {e}", path.display()))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::Persistence(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let loaded = IndexSnapshot::load(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn saves_into_new_directory_and_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".symdex").join("index.json");
        let snapshot = IndexSnapshot::new(dir.path(), Vec::new());

        snapshot.save(&LocalFileSystem, &path).await.unwrap();
        let loaded = IndexSnapshot::load(&path).await.unwrap().unwrap();

        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.workspace_path, dir.path());
        assert!(loaded.entries.is_empty());
    }

    #[tokio::test]
    async fn rejects_corrupt_and_future_snapshots() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            IndexSnapshot::load(&path).await,
            Err(IndexError::Persistence(_))
        ));

        let mut snapshot = IndexSnapshot::new(dir.path(), Vec::new());
        snapshot.version = SNAPSHOT_VERSION + 1;
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert!(matches!(
            IndexSnapshot::load(&path).await,
            Err(IndexError::Persistence(_))
        ));
    }
}

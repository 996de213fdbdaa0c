//! Index engine configuration, loadable from TOML.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::IndexError;
use crate::error::Result;

/// Configuration for the index engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Root of the tree to index
    pub workspace_path: PathBuf,

    /// File extensions to include in indexing (without the dot)
    pub include_extensions: Vec<String>,

    /// Glob patterns matched against the `/`-prefixed workspace-relative path
    pub exclude_patterns: Vec<String>,

    /// Files larger than this are skipped (bytes)
    pub max_file_size: u64,

    /// Number of files parsed in parallel
    pub max_concurrency: usize,

    /// Persist the file index to `persistence_path` on dispose
    pub enable_persistence: bool,

    /// Snapshot location; defaults to `<workspace>/.symdex/index.json`
    pub persistence_path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workspace_path: PathBuf::from("."),
            include_extensions: vec![
                "rs".to_string(),
                "py".to_string(),
                "js".to_string(),
                "jsx".to_string(),
                "mjs".to_string(),
                "ts".to_string(),
                "tsx".to_string(),
                "go".to_string(),
            ],
            exclude_patterns: vec![
                "**/target/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
                "**/.symdex/**".to_string(),
            ],
            max_file_size: 1024 * 1024, // 1MB
            max_concurrency: 4,
            enable_persistence: false,
            persistence_path: None,
        }
    }
}

impl IndexConfig {
    /// Default configuration rooted at `workspace_path`
    pub fn for_workspace(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| IndexError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IndexError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workspace_path.as_os_str().is_empty() {
            return Err(IndexError::InvalidConfig(
                "workspace path must not be empty".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(IndexError::InvalidConfig(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.include_extensions.is_empty() {
            return Err(IndexError::InvalidConfig(
                "at least one include extension is required".to_string(),
            ));
        }
        if let Some(ext) = self
            .include_extensions
            .iter()
            .find(|ext| ext.trim_start_matches('.').is_empty())
        {
            return Err(IndexError::InvalidConfig(format!(
                "invalid include extension: {ext:?}"
            )));
        }
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(IndexError::InvalidConfig(
                "exclude patterns must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Where snapshots are written when persistence is enabled
    pub fn snapshot_path(&self) -> PathBuf {
        self.persistence_path
            .clone()
            .unwrap_or_else(|| self.workspace_path.join(".symdex").join("index.json"))
    }
}

//! Runtime configuration
//!
//! Loaded from a YAML file; every key is optional and falls back to the
//! defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BookmarkError, Result};

/// What a delete request on a bookmark removes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DeleteBehavior {
    /// Ask the user every time.
    #[default]
    Ask,
    BookmarkOnly,
    BookmarkAndOriginal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkConfig {
    pub delete_behavior: DeleteBehavior,
    /// Directory under the workspace root holding descriptor files.
    pub descriptor_dir: String,
    pub load_batch_size: usize,
    pub refresh_debounce_ms: u64,
    pub copy_concurrency: usize,
    pub preserve_times: bool,
    /// Report MODIFIED when a bookmarked file's content hash drifts.
    pub detect_content_drift: bool,
    pub max_log_lines: usize,
}

impl Default for BookmarkConfig {
    fn default() -> Self {
        Self {
            delete_behavior: DeleteBehavior::Ask,
            descriptor_dir: ".bookmark".to_string(),
            load_batch_size: 10,
            refresh_debounce_ms: 150,
            copy_concurrency: 8,
            preserve_times: true,
            detect_content_drift: false,
            max_log_lines: crate::logging::DEFAULT_MAX_LOG_LINES,
        }
    }
}

impl BookmarkConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(BookmarkError::Io(err)),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| BookmarkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let dir = self.descriptor_dir.trim();
        if dir.is_empty() {
            return Err(BookmarkError::Config("descriptorDir cannot be empty".to_string()));
        }
        if dir.contains('/') || dir.contains('\\') || dir == "." || dir == ".." {
            return Err(BookmarkError::Config(format!(
                "descriptorDir must be a single directory name: '{dir}'"
            )));
        }
        if self.load_batch_size == 0 {
            return Err(BookmarkError::Config("loadBatchSize must be at least 1".to_string()));
        }
        if self.copy_concurrency == 0 {
            return Err(BookmarkError::Config("copyConcurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the directory under the storage root that holds pipeline state
pub const STATE_DIR_NAME: &str = ".insight";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root for archived scripts and pipeline state
    pub storage_dir: PathBuf,

    /// Resources archived (and their maps fetched) at once
    pub max_concurrent: usize,

    /// Scripts above this size are logged as large; the worker windows them
    pub large_file_bytes: usize,

    /// Maps above this size are ignored
    pub max_map_bytes: usize,

    /// Look for maps over the network when none was captured
    pub fetch_maps: bool,

    pub fetch_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("insight-data"),
            max_concurrent: 5,
            large_file_bytes: 5 * 1024 * 1024,
            max_map_bytes: 50 * 1024 * 1024,
            fetch_maps: true,
            fetch_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    pub fn with_storage_dir(mut self, storage_dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = storage_dir.into();
        self
    }

    pub fn state_dir(&self) -> PathBuf {
        self.storage_dir.join(STATE_DIR_NAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir().join("ledger.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.state_dir().join("vectors.json")
    }

    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.state_dir().join("cache").join("embeddings")
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be > 0".to_string());
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err("storage_dir must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_lives_under_storage() {
        let config = PipelineConfig::default().with_storage_dir("/data");
        assert_eq!(config.ledger_path(), PathBuf::from("/data/.insight/ledger.json"));
        assert_eq!(config.index_path(), PathBuf::from("/data/.insight/vectors.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str("max_concurrent = 2").unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert!(config.fetch_maps);
    }
}

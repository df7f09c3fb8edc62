use anyhow::{bail, Context, Result};
use insight_code_chunker::ChunkerConfig;
use insight_indexer::PipelineConfig;
use insight_vector_store::{EmbeddingConfig, WriterConfig};
use insight_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "insight.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Overrides `pipeline.storage_dir`
    pub dir: Option<PathBuf>,

    /// Reuse embeddings of identical chunk text across captures
    pub embedding_cache: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            dir: None,
            embedding_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Worker executable; defaults to this binary's `worker` subcommand
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub request_timeout_ms: u64,
    pub max_restarts: u32,
    pub queue_depth: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        let defaults = WorkerConfig::default();
        Self {
            program: None,
            args: Vec::new(),
            request_timeout_ms: defaults.request_timeout_ms,
            max_restarts: defaults.max_restarts,
            queue_depth: defaults.queue_depth,
        }
    }
}

/// Contents of `insight.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub storage: StorageSection,
    pub pipeline: PipelineConfig,
    pub worker: WorkerSection,
    pub embedding: EmbeddingConfig,
    pub chunker: ChunkerConfig,
    pub writer: WriterConfig,
}

impl InsightConfig {
    /// Read `explicit`, or `./insight.toml` if it exists, or fall back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| path.is_file()),
        };
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                let config: Self = toml::from_str(&raw)
                    .with_context(|| format!("Invalid config {}", path.display()))?;
                log::debug!("Loaded config from {}", path.display());
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("pipeline", self.pipeline.validate()),
            ("embedding", self.embedding.validate()),
            ("chunker", self.chunker.validate()),
            ("writer", self.writer.validate()),
        ];
        for (section, check) in checks {
            if let Err(message) = check {
                bail!("Invalid [{section}] config: {message}");
            }
        }
        if self.worker.request_timeout_ms == 0 {
            bail!("Invalid [worker] config: request_timeout_ms must be > 0");
        }
        Ok(())
    }

    /// Apply the `--storage` flag
    pub fn with_storage_override(mut self, dir: Option<PathBuf>) -> Self {
        if dir.is_some() {
            self.storage.dir = dir;
        }
        self
    }

    pub fn pipeline(&self) -> PipelineConfig {
        match &self.storage.dir {
            Some(dir) => self.pipeline.clone().with_storage_dir(dir.clone()),
            None => self.pipeline.clone(),
        }
    }

    /// Worker launch settings; without a configured program the bridge runs
    /// `<this executable> worker`
    pub fn worker(&self) -> Result<WorkerConfig> {
        let (program, args) = match &self.worker.program {
            Some(program) => (program.clone(), self.worker.args.clone()),
            None => {
                let exe = std::env::current_exe().context("Failed to locate the insight binary")?;
                (exe, vec!["worker".to_string()])
            }
        };
        Ok(WorkerConfig {
            request_timeout_ms: self.worker.request_timeout_ms,
            max_restarts: self.worker.max_restarts,
            queue_depth: self.worker.queue_depth,
            chunker: self.chunker.clone(),
            ..WorkerConfig::default()
        }
        .with_command(program, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_vector_store::EmbeddingMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn sections_are_optional() {
        let config: InsightConfig = toml::from_str(
            r#"
            [storage]
            dir = "captures"

            [embedding]
            mode = "stub"
            dimension = 64

            [chunker]
            line_window = 50
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.mode, EmbeddingMode::Stub);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.chunker.line_window, 50);
        assert_eq!(config.pipeline().storage_dir, PathBuf::from("captures"));
        assert_eq!(config.writer, WriterConfig::default());
        assert!(config.storage.embedding_cache);
    }

    #[test]
    fn storage_flag_wins_over_file() {
        let config = InsightConfig {
            storage: StorageSection {
                dir: Some(PathBuf::from("from-file")),
                ..StorageSection::default()
            },
            ..InsightConfig::default()
        }
        .with_storage_override(Some(PathBuf::from("from-flag")));
        assert_eq!(config.pipeline().storage_dir, PathBuf::from("from-flag"));

        let untouched = InsightConfig::default().with_storage_override(None);
        assert_eq!(untouched.pipeline().storage_dir, PipelineConfig::default().storage_dir);
    }

    #[test]
    fn invalid_sections_are_named() {
        let config = InsightConfig {
            writer: WriterConfig {
                batch_size: 0,
                ..WriterConfig::default()
            },
            ..InsightConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("[writer]"), "{err}");
    }

    #[test]
    fn worker_defaults_to_own_subcommand() {
        let config = InsightConfig::default();
        let worker = config.worker().unwrap();
        assert_eq!(worker.args, vec!["worker".to_string()]);
        assert_eq!(worker.chunker, config.chunker);

        let custom = InsightConfig {
            worker: WorkerSection {
                program: Some(PathBuf::from("/opt/insight-worker")),
                ..WorkerSection::default()
            },
            ..InsightConfig::default()
        };
        let worker = custom.worker().unwrap();
        assert_eq!(worker.program, PathBuf::from("/opt/insight-worker"));
        assert!(worker.args.is_empty());
    }
}

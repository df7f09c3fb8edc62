use crate::config::InsightConfig;
use anyhow::{Context, Result};
use insight_indexer::{
    CaptureOrchestrator, HttpMapFetcher, InProcessProcessor, MapFetcher, NoMapFetcher,
    ScriptProcessor,
};
use insight_vector_store::{create_embedder, EmbeddingCache, IndexWriter, JsonVectorIndex};
use insight_worker::{FileProcessor, WorkerBridge};
use std::sync::Arc;
use std::time::Duration;

/// Where scripts get restored and chunked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processing {
    /// Separate worker process behind the bridge
    Worker,
    /// On this process's blocking pool
    InProcess,
}

/// A ready orchestrator plus the worker it may own
pub struct Pipeline {
    pub orchestrator: CaptureOrchestrator,
    bridge: Option<WorkerBridge>,
}

impl Pipeline {
    pub async fn open(config: &InsightConfig, processing: Processing) -> Result<Self> {
        let pipeline = config.pipeline();

        let embedding = config
            .embedding
            .clone()
            .with_env_overrides()
            .context("Invalid embedding settings")?;
        let embedder = create_embedder(&embedding).context("Failed to create embedder")?;
        log::debug!(
            "Embedding with {} ({} mode, dimension {})",
            embedder.model_id(),
            embedding.mode.as_str(),
            embedder.dimension()
        );

        let index = JsonVectorIndex::open(pipeline.index_path(), embedder.dimension())
            .await
            .with_context(|| format!("Failed to open index {}", pipeline.index_path().display()))?;
        let mut writer = IndexWriter::new(embedder, Arc::new(index), config.writer.clone())?;
        if config.storage.embedding_cache {
            writer = writer.with_cache(EmbeddingCache::new(pipeline.embedding_cache_dir()));
        }

        let mut bridge = None;
        let processor: Arc<dyn ScriptProcessor> = match processing {
            Processing::Worker => {
                let started = WorkerBridge::start(config.worker()?)
                    .await
                    .context("Failed to start worker")?;
                bridge = Some(started.clone());
                Arc::new(started)
            }
            Processing::InProcess => {
                Arc::new(InProcessProcessor::new(FileProcessor::new(config.chunker.clone())?))
            }
        };

        let fetcher: Arc<dyn MapFetcher> = if pipeline.fetch_maps {
            Arc::new(HttpMapFetcher::new(
                Duration::from_secs(pipeline.fetch_timeout_secs),
                pipeline.max_map_bytes,
            )?)
        } else {
            Arc::new(NoMapFetcher)
        };

        let orchestrator = CaptureOrchestrator::open(pipeline, processor, Arc::new(writer), fetcher)
            .await
            .context("Failed to open capture ledger")?;
        Ok(Self {
            orchestrator,
            bridge,
        })
    }

    /// Stop the worker, if one was started
    pub async fn close(self) {
        if let Some(bridge) = self.bridge {
            bridge.shutdown().await;
        }
    }
}

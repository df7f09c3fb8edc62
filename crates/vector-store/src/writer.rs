use crate::embedding_cache::EmbeddingCache;
use crate::embeddings::Embedder;
use crate::error::{EmbedError, VectorStoreError, WriterError};
use crate::store::VectorIndex;
use crate::types::{ChunkRecord, Fingerprint, IndexEntry, SearchFilter, SearchHit};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Chars of content compared when collapsing duplicate search hits
const DEDUP_PREFIX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Texts per embedding request
    pub batch_size: usize,

    /// Retries for transient embedding failures
    pub max_retries: u32,

    /// Embedding requests in flight across all writes
    pub concurrency: usize,

    /// Chunks whose trimmed content is shorter than this are not indexed
    pub min_chunk_chars: usize,

    /// First retry delay; doubles per attempt
    pub retry_base_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_retries: 3,
            concurrency: 5,
            min_chunk_chars: 20,
            retry_base_ms: 1000,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be > 0".to_string());
        }
        Ok(())
    }
}

/// What one `write` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub indexed: usize,
    pub dropped_trivial: usize,
    /// Texts the provider refused even alone; stored with a zero vector
    pub zero_vectors: usize,
    pub cache_hits: usize,
    /// Entries of the previous version that were replaced
    pub replaced: usize,
}

/// The only writer to the vector index
pub struct IndexWriter {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: WriterConfig,
    permits: Arc<Semaphore>,
    cache: Option<EmbeddingCache>,
}

impl IndexWriter {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: WriterConfig,
    ) -> Result<Self, WriterError> {
        config
            .validate()
            .map_err(|e| WriterError::Embed(EmbedError::Config(e)))?;
        if embedder.dimension() != index.dimension() {
            return Err(VectorStoreError::InvalidDimension {
                expected: index.dimension(),
                actual: embedder.dimension(),
            }
            .into());
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.concurrency)),
            embedder,
            index,
            config,
            cache: None,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `records` and make them the entries of `fingerprint`, replacing
    /// whatever the index held for it. On error the index is untouched.
    pub async fn write(
        &self,
        fingerprint: &Fingerprint,
        records: Vec<ChunkRecord>,
    ) -> Result<WriteOutcome, WriterError> {
        let total = records.len();
        let kept: Vec<ChunkRecord> = records
            .into_iter()
            .filter(|record| record.chunk.content.trim().chars().count() >= self.config.min_chunk_chars)
            .collect();
        let mut outcome = WriteOutcome {
            dropped_trivial: total - kept.len(),
            ..WriteOutcome::default()
        };

        let texts: Vec<String> = kept.iter().map(|record| record.chunk.content.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let embedded = self.embed_cached(batch, &mut outcome).await?;
            vectors.extend(embedded);
        }

        let entries: Vec<IndexEntry> = kept
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (record, vector))| IndexEntry {
                id: IndexEntry::entry_id(fingerprint, ordinal),
                fingerprint: fingerprint.clone(),
                record,
                vector,
            })
            .collect();

        outcome.indexed = entries.len();
        outcome.replaced = self.index.replace_fingerprint(fingerprint, entries).await?;
        log::debug!(
            "Indexed {} chunks for {} ({} trivial dropped, {} replaced)",
            outcome.indexed,
            fingerprint.short(),
            outcome.dropped_trivial,
            outcome.replaced
        );
        Ok(outcome)
    }

    /// Drop every entry of `fingerprint`
    pub async fn remove(&self, fingerprint: &Fingerprint) -> Result<usize, WriterError> {
        Ok(self.index.delete_by_fingerprint(fingerprint).await?)
    }

    /// Rank entries against `query`; hits whose content starts the same are
    /// reported once
    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, WriterError> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = self.embed_with_retry(&[query.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| EmbedError::InvalidResponse("no vector for query".to_string()))?;

        let hits = self
            .index
            .query(&vector, filter, limit.saturating_mul(3))
            .await?;
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(limit);
        for hit in hits {
            let key: String = hit.record.chunk.content.chars().take(DEDUP_PREFIX_CHARS).collect();
            if seen.insert(key) {
                unique.push(hit);
                if unique.len() == limit {
                    break;
                }
            }
        }
        Ok(unique)
    }

    async fn embed_cached(
        &self,
        batch: &[String],
        outcome: &mut WriteOutcome,
    ) -> Result<Vec<Vec<f32>>, WriterError> {
        let Some(cache) = &self.cache else {
            return self.embed_degrading(batch, outcome).await;
        };

        let model = self.embedder.model_id();
        let dimension = self.embedder.dimension();
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(batch.len());
        for text in batch {
            vectors.push(cache.get_vector(model, text, dimension).await);
        }

        let missing: Vec<usize> = (0..batch.len()).filter(|&i| vectors[i].is_none()).collect();
        outcome.cache_hits += batch.len() - missing.len();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| batch[i].clone()).collect();
            let zeros_before = outcome.zero_vectors;
            let fresh = self.embed_degrading(&texts, outcome).await?;
            let all_real = outcome.zero_vectors == zeros_before;
            for (i, vector) in missing.into_iter().zip(fresh) {
                if all_real {
                    if let Err(e) = cache.put_vector(model, &batch[i], &vector).await {
                        log::debug!("Embedding cache write failed: {e}");
                    }
                }
                vectors[i] = Some(vector);
            }
        }

        Ok(vectors.into_iter().flatten().collect())
    }

    /// Embed a batch; a batch the provider finds too large is retried one
    /// text at a time, and texts refused even alone get a zero vector
    async fn embed_degrading(
        &self,
        batch: &[String],
        outcome: &mut WriteOutcome,
    ) -> Result<Vec<Vec<f32>>, WriterError> {
        match self.embed_with_retry(batch).await {
            Ok(vectors) => Ok(vectors),
            Err(EmbedError::PayloadTooLarge { .. }) => {
                log::warn!(
                    "Embedding batch of {} too large, sending texts one by one",
                    batch.len()
                );
                let mut vectors = Vec::with_capacity(batch.len());
                for text in batch {
                    match self.embed_with_retry(std::slice::from_ref(text)).await {
                        Ok(mut single) if single.len() == 1 => vectors.extend(single.pop()),
                        Ok(_) | Err(EmbedError::PayloadTooLarge { .. }) => {
                            log::warn!(
                                "Text of {} chars refused by the embedding provider; storing a zero vector",
                                text.chars().count()
                            );
                            outcome.zero_vectors += 1;
                            vectors.push(vec![0.0; self.embedder.dimension()]);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(vectors)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| EmbedError::Config(e.to_string()))?;
                self.embedder.embed_batch(texts).await
            };
            match result {
                Ok(vectors) if vectors.len() == texts.len() => return Ok(vectors),
                Ok(vectors) => {
                    return Err(EmbedError::InvalidResponse(format!(
                        "expected {} vectors, got {}",
                        texts.len(),
                        vectors.len()
                    )))
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(
                        self.config.retry_base_ms << (attempt - 1).min(5),
                    );
                    log::warn!("Embedding attempt {attempt} failed ({e}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

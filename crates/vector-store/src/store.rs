use crate::error::{Result, VectorStoreError};
use crate::flat_index::FlatIndex;
use crate::types::{ChunkRecord, Fingerprint, IndexEntry, SearchFilter, SearchHit};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Storage for embedded chunks. Implementations must tolerate concurrent
/// writes for different fingerprints.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    /// Insert entries, replacing any with the same id
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Remove every entry of `fingerprint`; returns how many went
    async fn delete_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<usize>;

    /// Swap all entries of `fingerprint` for `entries` in one step;
    /// returns how many old entries were removed
    async fn replace_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        entries: Vec<IndexEntry>,
    ) -> Result<usize>;

    async fn query(&self, vector: &[f32], filter: &SearchFilter, limit: usize)
        -> Result<Vec<SearchHit>>;

    /// Entries whose chunk text matches `pattern`, in id order, at most `limit`
    async fn find_text(
        &self,
        pattern: &Regex,
        filter: &SearchFilter,
        limit: usize,
    ) -> Vec<(Fingerprint, ChunkRecord)>;

    async fn len(&self) -> usize;

    async fn count_for(&self, fingerprint: &Fingerprint) -> usize;
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    schema_version: u32,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Default)]
struct IndexState {
    records: BTreeMap<String, (Fingerprint, ChunkRecord)>,
    by_fingerprint: HashMap<Fingerprint, Vec<String>>,
}

/// In-memory brute-force index, optionally persisted as one JSON file that
/// is rewritten atomically after every change
pub struct JsonVectorIndex {
    path: Option<PathBuf>,
    dimension: usize,
    inner: RwLock<(IndexState, FlatIndex)>,
}

impl JsonVectorIndex {
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            path: None,
            dimension,
            inner: RwLock::new((IndexState::default(), FlatIndex::new(dimension))),
        }
    }

    /// Load the index at `path`, or start an empty one there
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = IndexState::default();
        let mut vectors = FlatIndex::new(dimension);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedIndex = serde_json::from_slice(&bytes)?;
                if persisted.schema_version != INDEX_SCHEMA_VERSION {
                    return Err(VectorStoreError::UnsupportedSchema {
                        found: persisted.schema_version,
                        expected: INDEX_SCHEMA_VERSION,
                    });
                }
                if persisted.dimension != dimension {
                    return Err(VectorStoreError::InvalidDimension {
                        expected: dimension,
                        actual: persisted.dimension,
                    });
                }
                for entry in persisted.entries {
                    insert(&mut state, &mut vectors, entry)?;
                }
                log::info!("Loaded {} index entries from {}", vectors.len(), path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No index at {}, starting empty", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path: Some(path),
            dimension,
            inner: RwLock::new((state, vectors)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entries for `fingerprint` in ordinal order, without vectors
    pub async fn records_for(&self, fingerprint: &Fingerprint) -> Vec<ChunkRecord> {
        let guard = self.inner.read().await;
        let (state, _) = &*guard;
        state
            .by_fingerprint
            .get(fingerprint)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.records.get(id).map(|(_, record)| record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn persist(&self, state: &IndexState, vectors: &FlatIndex) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = state
            .records
            .iter()
            .filter_map(|(id, (fingerprint, record))| {
                vectors.get(id).map(|vector| IndexEntry {
                    id: id.clone(),
                    fingerprint: fingerprint.clone(),
                    record: record.clone(),
                    vector: vector.to_vec(),
                })
            })
            .collect();
        let persisted = PersistedIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            dimension: self.dimension,
            entries,
        };
        let bytes = serde_json::to_vec(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn insert(state: &mut IndexState, vectors: &mut FlatIndex, entry: IndexEntry) -> Result<()> {
    vectors.add(&entry.id, &entry.vector)?;
    let ids = state
        .by_fingerprint
        .entry(entry.fingerprint.clone())
        .or_default();
    if !ids.contains(&entry.id) {
        ids.push(entry.id.clone());
    }
    state
        .records
        .insert(entry.id, (entry.fingerprint, entry.record));
    Ok(())
}

fn remove_fingerprint(state: &mut IndexState, vectors: &mut FlatIndex, fingerprint: &Fingerprint) -> usize {
    let ids = state.by_fingerprint.remove(fingerprint).unwrap_or_default();
    for id in &ids {
        state.records.remove(id);
        vectors.remove(id);
    }
    ids.len()
}

#[async_trait]
impl VectorIndex for JsonVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut guard = self.inner.write().await;
        let (state, vectors) = &mut *guard;
        for entry in &entries {
            vectors.check_dimension(&entry.vector)?;
        }
        for entry in entries {
            insert(state, vectors, entry)?;
        }
        self.persist(state, vectors).await
    }

    async fn delete_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<usize> {
        let mut guard = self.inner.write().await;
        let (state, vectors) = &mut *guard;
        let removed = remove_fingerprint(state, vectors, fingerprint);
        if removed > 0 {
            self.persist(state, vectors).await?;
        }
        Ok(removed)
    }

    async fn replace_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        entries: Vec<IndexEntry>,
    ) -> Result<usize> {
        let mut guard = self.inner.write().await;
        let (state, vectors) = &mut *guard;
        for entry in &entries {
            vectors.check_dimension(&entry.vector)?;
            if &entry.fingerprint != fingerprint {
                return Err(VectorStoreError::IndexError(format!(
                    "entry {} does not belong to {fingerprint}",
                    entry.id
                )));
            }
        }
        let removed = remove_fingerprint(state, vectors, fingerprint);
        for entry in entries {
            insert(state, vectors, entry)?;
        }
        self.persist(state, vectors).await?;
        Ok(removed)
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let guard = self.inner.read().await;
        let (state, vectors) = &*guard;
        let ranked = vectors.search(vector, limit, |id| {
            state
                .records
                .get(id)
                .is_some_and(|(_, record)| filter.matches(record))
        })?;

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                state.records.get(&id).map(|(fingerprint, record)| SearchHit {
                    fingerprint: fingerprint.clone(),
                    record: record.clone(),
                    score,
                    id,
                })
            })
            .collect())
    }

    async fn find_text(
        &self,
        pattern: &Regex,
        filter: &SearchFilter,
        limit: usize,
    ) -> Vec<(Fingerprint, ChunkRecord)> {
        let guard = self.inner.read().await;
        guard
            .0
            .records
            .values()
            .filter(|(_, record)| filter.matches(record) && pattern.is_match(&record.chunk.content))
            .take(limit)
            .map(|(fingerprint, record)| (fingerprint.clone(), record.clone()))
            .collect()
    }

    async fn len(&self) -> usize {
        self.inner.read().await.1.len()
    }

    async fn count_for(&self, fingerprint: &Fingerprint) -> usize {
        self.inner
            .read()
            .await
            .0
            .by_fingerprint
            .get(fingerprint)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_code_chunker::{ChunkMetadata, CodeChunk};
    use tempfile::TempDir;

    fn entry(fp: &Fingerprint, ordinal: usize, domain: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: IndexEntry::entry_id(fp, ordinal),
            fingerprint: fp.clone(),
            record: ChunkRecord {
                url: format!("https://{domain}/app.js"),
                domain: domain.to_string(),
                original_file: "app.js".to_string(),
                source_map_restored: ordinal % 2 == 0,
                chunk: CodeChunk::new(
                    "app.js".to_string(),
                    ordinal + 1,
                    ordinal + 1,
                    format!("chunk {ordinal}"),
                    ChunkMetadata::default(),
                ),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn replace_swaps_only_that_fingerprint() {
        let index = JsonVectorIndex::in_memory(2);
        let a = Fingerprint::of(b"a");
        let b = Fingerprint::of(b"b");
        index
            .upsert(vec![
                entry(&a, 0, "x.com", vec![1.0, 0.0]),
                entry(&a, 1, "x.com", vec![0.0, 1.0]),
                entry(&b, 0, "y.com", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(index.len().await, 3);

        let removed = index
            .replace_fingerprint(&a, vec![entry(&a, 0, "x.com", vec![0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.count_for(&a).await, 1);
        assert_eq!(index.count_for(&b).await, 1);

        assert_eq!(index.delete_by_fingerprint(&b).await.unwrap(), 1);
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn replace_with_bad_dimension_changes_nothing() {
        let index = JsonVectorIndex::in_memory(2);
        let a = Fingerprint::of(b"a");
        index.upsert(vec![entry(&a, 0, "x.com", vec![1.0, 0.0])]).await.unwrap();

        let result = index
            .replace_fingerprint(&a, vec![entry(&a, 0, "x.com", vec![1.0, 0.0, 0.0])])
            .await;
        assert!(matches!(result, Err(VectorStoreError::InvalidDimension { .. })));
        assert_eq!(index.count_for(&a).await, 1);
    }

    #[tokio::test]
    async fn query_applies_filter() {
        let index = JsonVectorIndex::in_memory(2);
        let a = Fingerprint::of(b"a");
        let b = Fingerprint::of(b"b");
        index
            .upsert(vec![
                entry(&a, 0, "x.com", vec![1.0, 0.0]),
                entry(&a, 1, "x.com", vec![1.0, 0.1]),
                entry(&b, 0, "y.com", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = SearchFilter {
            domain: Some("x.com".into()),
            restored_only: false,
        };
        let hits = index.query(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.record.domain == "x.com"));

        let filter = SearchFilter {
            domain: None,
            restored_only: true,
        };
        let hits = index.query(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.record.source_map_restored));
    }

    #[tokio::test]
    async fn find_text_matches_chunk_content() {
        let index = JsonVectorIndex::in_memory(2);
        let a = Fingerprint::of(b"a");
        let b = Fingerprint::of(b"b");
        index
            .upsert(vec![
                entry(&a, 0, "x.com", vec![1.0, 0.0]),
                entry(&a, 1, "x.com", vec![0.0, 1.0]),
                entry(&b, 1, "y.com", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let pattern = Regex::new(r"chunk 1\b").unwrap();
        let all = index.find_text(&pattern, &SearchFilter::default(), 20).await;
        assert_eq!(all.len(), 2);

        let filter = SearchFilter {
            domain: Some("y.com".into()),
            restored_only: false,
        };
        let scoped = index.find_text(&pattern, &filter, 20).await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].0, b);

        assert_eq!(index.find_text(&pattern, &SearchFilter::default(), 1).await.len(), 1);
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index").join("vectors.json");
        let a = Fingerprint::of(b"a");
        {
            let index = JsonVectorIndex::open(&path, 2).await.unwrap();
            index.upsert(vec![entry(&a, 0, "x.com", vec![1.0, 0.0])]).await.unwrap();
        }

        let reloaded = JsonVectorIndex::open(&path, 2).await.unwrap();
        assert_eq!(reloaded.len().await, 1);
        let records = reloaded.records_for(&a).await;
        assert_eq!(records[0].chunk.content, "chunk 0");
        assert!(!path.with_extension("json.tmp").exists());

        assert!(matches!(
            JsonVectorIndex::open(&path, 3).await,
            Err(VectorStoreError::InvalidDimension { expected: 3, actual: 2 })
        ));
    }
}

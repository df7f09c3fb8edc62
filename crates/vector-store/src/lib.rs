//! # Insight Vector Store
//!
//! Embedding and similarity search for captured script chunks.
//!
//! ## Architecture
//!
//! ```text
//! ChunkRecord[] (per fingerprint)
//!     │
//!     ├──> IndexWriter
//!     │      ├─> drop trivial chunks
//!     │      ├─> Embedder (HTTP or stub), batched, retried
//!     │      └─> EmbeddingCache (optional)
//!     │
//!     └──> VectorIndex
//!            ├─> replace_fingerprint (atomic per fingerprint)
//!            └─> find_text (regex scans for crypto patterns)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use insight_vector_store::{
//!     IndexWriter, JsonVectorIndex, SearchFilter, StubEmbedder, WriterConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let index = Arc::new(JsonVectorIndex::open("vectors.json", 64).await?);
//!     let writer = IndexWriter::new(Arc::new(StubEmbedder::new(64)), index, WriterConfig::default())?;
//!
//!     for hit in writer.search("login request signing", &SearchFilter::default(), 10).await? {
//!         println!("{} {:.3}", hit.record.original_file, hit.score);
//!     }
//!     Ok(())
//! }
//! ```

mod embedding_cache;
mod embeddings;
mod error;
mod flat_index;
mod pattern_scan;
mod store;
mod types;
mod writer;

pub use embedding_cache::EmbeddingCache;
pub use embeddings::{
    cosine_similarity, create_embedder, Embedder, EmbeddingConfig, EmbeddingMode, HttpEmbedder,
    StubEmbedder, EMBEDDING_API_KEY_ENV, EMBEDDING_MODE_ENV,
};
pub use error::{EmbedError, Result, VectorStoreError, WriterError};
pub use flat_index::FlatIndex;
pub use pattern_scan::{
    crypto_pattern_names, scan_crypto_patterns, PatternMatch, PatternScan,
    MAX_MATCHES_PER_PATTERN,
};
pub use store::{JsonVectorIndex, VectorIndex, INDEX_SCHEMA_VERSION};
pub use types::{ChunkRecord, Fingerprint, IndexEntry, SearchFilter, SearchHit};
pub use writer::{IndexWriter, WriteOutcome, WriterConfig};

//! # Insight Indexer
//!
//! Capture orchestration: captured scripts in, searchable chunks out.
//!
//! ## Pipeline
//!
//! ```text
//! ResourceDescriptor[]
//!     │
//!     ├──> Fingerprint (sha256 of the raw bytes)
//!     │      └─> skip if already indexed
//!     │
//!     ├──> Archive (<storage>/<domain>/<shard>/<fingerprint>/<file>)
//!     │      └─> source map: captured, hinted, annotated or <url>.map
//!     │
//!     ├──> ScriptProcessor (worker process or in-process)
//!     │      └─> restored sources, chunked
//!     │
//!     └──> IndexWriter + CaptureLedger
//!            └─> per-fingerprint replace, old URL versions retired
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use insight_indexer::{
//!     CaptureOptions, CaptureOrchestrator, InProcessProcessor, NoMapFetcher, PipelineConfig,
//!     ResourceDescriptor,
//! };
//! use insight_vector_store::{IndexWriter, JsonVectorIndex, StubEmbedder, WriterConfig};
//! use insight_worker::FileProcessor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::default().with_storage_dir("captures");
//!     let index = Arc::new(JsonVectorIndex::open(config.index_path(), 64).await?);
//!     let writer = Arc::new(IndexWriter::new(Arc::new(StubEmbedder::new(64)), index, WriterConfig::default())?);
//!     let processor = Arc::new(InProcessProcessor::new(FileProcessor::new(Default::default())?));
//!     let orchestrator =
//!         CaptureOrchestrator::open(config, processor, writer, Arc::new(NoMapFetcher)).await?;
//!
//!     let script = ResourceDescriptor::new("https://shop.example/app.js", b"function a(){}".to_vec());
//!     let report = orchestrator.capture(vec![script], CaptureOptions::default()).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

mod archive;
mod capture_lock;
mod config;
mod descriptor;
mod error;
mod ledger;
mod limits;
mod map_fetch;
mod orchestrator;
mod processing;
mod report;

pub use archive::{numbered_lines, ArchiveStore};
pub use capture_lock::{acquire_capture_lock, CaptureLock, CAPTURE_LOCK_FILE};
pub use config::{PipelineConfig, STATE_DIR_NAME};
pub use descriptor::{domain_of, file_name_for, sibling_map_url, ResourceDescriptor};
pub use error::{IndexerError, Result};
pub use ledger::{CaptureLedger, CaptureRecord, DomainSummary, LEDGER_SCHEMA_VERSION};
pub use limits::{ConcurrencySnapshot, FingerprintLocks, MaterializeLimiter};
pub use map_fetch::{join_url, resolve_map, HttpMapFetcher, MapFetcher, NoMapFetcher};
pub use orchestrator::{CaptureOptions, CaptureOrchestrator, PurgeReport, ScriptSelector};
pub use processing::{chunk_from_wire, InProcessProcessor, ScriptProcessor};
pub use report::{
    CaptureFailure, CaptureReport, FailureKind, OutcomeStatus, ResourceOutcome, SkipReason,
};

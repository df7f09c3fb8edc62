use crate::archive::ArchiveStore;
use crate::capture_lock::acquire_capture_lock;
use crate::config::PipelineConfig;
use crate::descriptor::{domain_of, file_name_for, now_ms, ResourceDescriptor};
use crate::error::{IndexerError, Result};
use crate::ledger::{CaptureLedger, CaptureRecord, DomainSummary};
use crate::limits::{ConcurrencySnapshot, FingerprintLocks, MaterializeLimiter};
use crate::map_fetch::{resolve_map, MapFetcher, NoMapFetcher};
use crate::processing::{chunk_from_wire, ScriptProcessor};
use crate::report::{CaptureReport, FailureKind, OutcomeStatus, ResourceOutcome, SkipReason};
use insight_protocol::FileTask;
use insight_vector_store::{
    scan_crypto_patterns, ChunkRecord, Fingerprint, IndexWriter, PatternScan, SearchFilter,
    SearchHit,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Re-index even when the content is already indexed
    pub force_refresh: bool,
    /// Domain to file the batch under instead of each URL's host
    pub domain: Option<String>,
}

/// How `read_script` picks the archived file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSelector {
    Url(String),
    Path(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub records: usize,
    pub index_entries: usize,
    pub archive_removed: bool,
}

/// Fingerprints committed during one `capture` call
#[derive(Default)]
struct CaptureRun {
    committed: Mutex<HashSet<Fingerprint>>,
}

impl CaptureRun {
    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(fingerprint)
    }

    fn mark(&self, fingerprint: &Fingerprint) {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.clone());
    }
}

struct Shared {
    config: PipelineConfig,
    archive: ArchiveStore,
    ledger: AsyncMutex<CaptureLedger>,
    processor: Arc<dyn ScriptProcessor>,
    writer: Arc<IndexWriter>,
    fetcher: Arc<dyn MapFetcher>,
    locks: FingerprintLocks,
    limiter: MaterializeLimiter,
}

/// Deduplicates captured scripts by content and drives new ones through
/// archiving, map resolution, chunking and indexing
#[derive(Clone)]
pub struct CaptureOrchestrator {
    shared: Arc<Shared>,
}

impl CaptureOrchestrator {
    /// Open the ledger under `config.storage_dir`
    pub async fn open(
        config: PipelineConfig,
        processor: Arc<dyn ScriptProcessor>,
        writer: Arc<IndexWriter>,
        fetcher: Arc<dyn MapFetcher>,
    ) -> Result<Self> {
        let ledger = CaptureLedger::open(config.ledger_path()).await?;
        log::debug!(
            "Opened capture ledger at {} ({} records)",
            config.ledger_path().display(),
            ledger.len()
        );
        Self::with_ledger(config, ledger, processor, writer, fetcher)
    }

    pub fn with_ledger(
        config: PipelineConfig,
        ledger: CaptureLedger,
        processor: Arc<dyn ScriptProcessor>,
        writer: Arc<IndexWriter>,
        fetcher: Arc<dyn MapFetcher>,
    ) -> Result<Self> {
        config.validate().map_err(IndexerError::InvalidConfig)?;
        let fetcher: Arc<dyn MapFetcher> = if config.fetch_maps {
            fetcher
        } else {
            Arc::new(NoMapFetcher)
        };
        Ok(Self {
            shared: Arc::new(Shared {
                archive: ArchiveStore::new(config.storage_dir.clone()),
                limiter: MaterializeLimiter::new(config.max_concurrent),
                ledger: AsyncMutex::new(ledger),
                locks: FingerprintLocks::new(),
                config,
                processor,
                writer,
                fetcher,
            }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn writer(&self) -> &Arc<IndexWriter> {
        &self.shared.writer
    }

    pub fn materialize_snapshot(&self) -> ConcurrencySnapshot {
        self.shared.limiter.snapshot()
    }

    /// Capture a batch. Each resource succeeds or fails on its own; the
    /// report lists outcomes in batch order.
    pub async fn capture(
        &self,
        batch: Vec<ResourceDescriptor>,
        options: CaptureOptions,
    ) -> Result<CaptureReport> {
        let started = Instant::now();
        let _lock = acquire_capture_lock(&self.shared.config.state_dir()).await?;
        let run = Arc::new(CaptureRun::default());
        let options = Arc::new(options);
        log::info!("Capturing {} scripts", batch.len());

        // Scripts sharing content run one after another in batch order, so a
        // later copy is only skipped once an earlier one has committed.
        let mut entries = Vec::with_capacity(batch.len());
        let mut groups: Vec<(Fingerprint, Vec<(usize, ResourceDescriptor)>)> = Vec::new();
        let mut group_of: HashMap<Fingerprint, usize> = HashMap::new();
        for (position, descriptor) in batch.into_iter().enumerate() {
            let fingerprint = Fingerprint::of(&descriptor.raw_bytes);
            entries.push((descriptor.url.clone(), fingerprint.clone()));
            match group_of.get(&fingerprint) {
                Some(&group) => {
                    log::debug!(
                        "{}: same content as an earlier script in this batch",
                        descriptor.url
                    );
                    groups[group].1.push((position, descriptor));
                }
                None => {
                    group_of.insert(fingerprint.clone(), groups.len());
                    groups.push((fingerprint, vec![(position, descriptor)]));
                }
            }
        }

        let mut handles = Vec::with_capacity(groups.len());
        for (fingerprint, members) in groups {
            let positions: Vec<usize> = members.iter().map(|(position, _)| *position).collect();
            let shared = self.shared.clone();
            let run = run.clone();
            let options = options.clone();
            let handle = tokio::spawn(async move {
                let mut statuses = Vec::with_capacity(members.len());
                for (position, descriptor) in members {
                    let status = shared
                        .capture_one(&descriptor, &fingerprint, &options, &run)
                        .await;
                    statuses.push((position, status));
                }
                statuses
            });
            handles.push((positions, handle));
        }

        let mut statuses: Vec<Option<OutcomeStatus>> = vec![None; entries.len()];
        for (positions, handle) in handles {
            match handle.await {
                Ok(done) => {
                    for (position, status) in done {
                        statuses[position] = Some(status);
                    }
                }
                Err(e) => {
                    log::error!("capture task failed: {e}");
                    for position in positions {
                        statuses[position] = Some(failed(
                            FailureKind::Resource,
                            format!("capture task failed: {e}"),
                        ));
                    }
                }
            }
        }

        let mut report = CaptureReport::new(self.shared.config.storage_dir.clone());
        for ((url, fingerprint), status) in entries.into_iter().zip(statuses) {
            let status = status.unwrap_or_else(|| {
                failed(FailureKind::Resource, "capture task produced no outcome")
            });
            report.add_outcome(ResourceOutcome {
                url,
                fingerprint,
                status,
            });
        }

        report.time_ms = started.elapsed().as_millis() as u64;
        log::info!("{}", report.summary());
        Ok(report)
    }

    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.shared.writer.search(query, filter, limit).await?)
    }

    /// Indexed chunks that look like hashing, encryption or request signing
    pub async fn scan_patterns(&self, domain: Option<&str>) -> Vec<PatternScan> {
        scan_crypto_patterns(self.shared.writer.index().as_ref(), domain).await
    }

    pub async fn domains(&self) -> Vec<DomainSummary> {
        self.shared.ledger.lock().await.domains()
    }

    pub async fn files(&self, domain: Option<&str>) -> Vec<CaptureRecord> {
        self.shared
            .ledger
            .lock()
            .await
            .files(domain)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn find_by_url(&self, url: &str) -> Option<CaptureRecord> {
        self.shared.ledger.lock().await.live_for_url(url).cloned()
    }

    /// Numbered lines of an archived script. Paths must point into the archive.
    pub async fn read_script(
        &self,
        selector: &ScriptSelector,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<String> {
        let path = match selector {
            ScriptSelector::Url(url) => self
                .find_by_url(url)
                .await
                .map(|record| record.archived_path)
                .ok_or_else(|| IndexerError::Other(format!("{url} has not been captured")))?,
            ScriptSelector::Path(path) => path.clone(),
        };
        self.shared.archive.read_numbered(&path, start, end).await
    }

    /// Forget everything captured for `domain`
    pub async fn purge_domain(&self, domain: &str) -> Result<PurgeReport> {
        let _lock = acquire_capture_lock(&self.shared.config.state_dir()).await?;
        let mut ledger = self.shared.ledger.lock().await;
        let removed = ledger.remove_domain(domain);

        let mut report = PurgeReport {
            records: removed.len(),
            ..PurgeReport::default()
        };
        for record in &removed {
            report.index_entries += self.shared.writer.remove(&record.fingerprint).await?;
        }
        ledger.save().await?;
        report.archive_removed = self.shared.archive.remove_domain(domain).await?;
        log::info!(
            "Purged {domain}: {} records, {} index entries",
            report.records,
            report.index_entries
        );
        Ok(report)
    }
}

impl Shared {
    async fn capture_one(
        &self,
        descriptor: &ResourceDescriptor,
        fingerprint: &Fingerprint,
        options: &CaptureOptions,
        run: &CaptureRun,
    ) -> OutcomeStatus {
        let url = descriptor.url.as_str();
        if !options.force_refresh && self.ledger.lock().await.live(fingerprint).is_some() {
            log::debug!("{url}: unchanged ({})", fingerprint.short());
            return OutcomeStatus::Skipped {
                reason: SkipReason::Unchanged,
            };
        }

        let _guard = self.locks.lock(fingerprint).await;
        {
            let ledger = self.ledger.lock().await;
            let indexed_meanwhile = !options.force_refresh && ledger.live(fingerprint).is_some();
            if run.contains(fingerprint) || indexed_meanwhile {
                log::debug!("{url}: indexed by a concurrent capture");
                return OutcomeStatus::Skipped {
                    reason: SkipReason::ConcurrentDuplicate,
                };
            }
        }

        let domain = options
            .domain
            .clone()
            .unwrap_or_else(|| domain_of(url));
        let (archived_path, map_path) = match self.materialize(descriptor, fingerprint, &domain).await {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("{url}: archiving failed: {e}");
                return failed(FailureKind::Resource, e);
            }
        };

        let task = FileTask {
            path: archived_path.to_string_lossy().into_owned(),
            map_path: map_path
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
            url: url.to_string(),
        };
        let outcome = match self.processor.process(task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("{url}: processing failed: {e}");
                return failed(FailureKind::of_bridge(&e), e);
            }
        };

        let source_map_restored = outcome.results.iter().any(|r| r.source_map_restored);
        let mut records = Vec::with_capacity(outcome.chunk_count());
        for source in outcome.results {
            for wire in source.chunks {
                records.push(ChunkRecord {
                    url: url.to_string(),
                    domain: domain.clone(),
                    original_file: source.original_file.clone(),
                    source_map_restored: source.source_map_restored,
                    chunk: chunk_from_wire(&source.original_file, wire),
                });
            }
        }

        let written = match self.writer.write(fingerprint, records).await {
            Ok(written) => written,
            Err(e) => {
                log::warn!("{url}: indexing failed: {e}");
                return failed(FailureKind::of_writer(&e), e);
            }
        };

        let mut ledger = self.ledger.lock().await;
        let previous = ledger
            .live_for_url(url)
            .filter(|record| &record.fingerprint != fingerprint)
            .map(|record| record.fingerprint.clone());
        let reindexed = ledger.live(fingerprint).is_some();
        let record = CaptureRecord {
            fingerprint: fingerprint.clone(),
            url: url.to_string(),
            domain,
            archived_path,
            has_source_map: map_path.is_some(),
            map_path,
            source_map_restored,
            chunk_count: written.indexed,
            last_indexed_at: now_ms(),
            superseded_by: None,
        };
        let has_source_map = record.has_source_map;
        if let Err(e) = ledger.commit(record, options.force_refresh) {
            return failed(FailureKind::Resource, e);
        }

        if let Some(previous) = &previous {
            match self.writer.remove(previous).await {
                Ok(removed) => log::debug!(
                    "{url}: retired {} ({removed} entries)",
                    previous.short()
                ),
                Err(e) => log::warn!("{url}: could not retire {}: {e}", previous.short()),
            }
            ledger.supersede(previous, fingerprint);
        }
        if let Err(e) = ledger.save().await {
            log::error!("Failed to persist capture ledger: {e}");
            return failed(FailureKind::Transient, e);
        }
        run.mark(fingerprint);

        log::debug!(
            "{url}: indexed {} chunks ({})",
            written.indexed,
            fingerprint.short()
        );
        OutcomeStatus::Indexed {
            chunks: written.indexed,
            has_source_map,
            source_map_restored,
            updated: previous.is_some() || reindexed,
        }
    }

    /// Archive the script and its map, if one can be found
    async fn materialize(
        &self,
        descriptor: &ResourceDescriptor,
        fingerprint: &Fingerprint,
        domain: &str,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let _permit = self.limiter.acquire().await;
        if descriptor.raw_bytes.len() > self.config.large_file_bytes {
            log::warn!(
                "{}: large script ({} bytes) will be split by line windows",
                descriptor.url,
                descriptor.raw_bytes.len()
            );
        }

        let archived = self
            .archive
            .store_script(
                domain,
                fingerprint,
                &file_name_for(&descriptor.url),
                &descriptor.raw_bytes,
            )
            .await?;

        let map = resolve_map(descriptor, self.fetcher.as_ref()).await;
        let map_path = match map {
            Some(bytes) if bytes.len() <= self.config.max_map_bytes => {
                Some(self.archive.store_map(&archived, &bytes).await?)
            }
            Some(bytes) => {
                log::warn!("{}: ignoring {} byte source map", descriptor.url, bytes.len());
                None
            }
            None => None,
        };
        Ok((archived, map_path))
    }
}

fn failed(kind: FailureKind, error: impl std::fmt::Display) -> OutcomeStatus {
    OutcomeStatus::Failed {
        kind,
        message: error.to_string(),
    }
}

use crate::error::{IndexerError, Result};
use insight_vector_store::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

/// What is known about one indexed script version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub fingerprint: Fingerprint,
    pub url: String,
    pub domain: String,
    pub archived_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_path: Option<PathBuf>,
    pub has_source_map: bool,
    pub source_map_restored: bool,
    pub chunk_count: usize,
    /// Unix milliseconds
    pub last_indexed_at: u64,
    /// Set once the same URL was indexed with different content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Fingerprint>,
}

impl CaptureRecord {
    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none()
    }
}

/// Per-domain counts of live records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSummary {
    pub domain: String,
    pub file_count: usize,
    pub chunk_count: usize,
    pub restored_count: usize,
    pub latest_indexed_at: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedLedger {
    schema_version: u32,
    records: BTreeMap<Fingerprint, CaptureRecord>,
}

/// Capture records by fingerprint, persisted as JSON
#[derive(Debug, Default)]
pub struct CaptureLedger {
    path: Option<PathBuf>,
    records: BTreeMap<Fingerprint, CaptureRecord>,
}

impl CaptureLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger at `path`, or start an empty one there
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedLedger = serde_json::from_slice(&bytes)?;
                if persisted.schema_version != LEDGER_SCHEMA_VERSION {
                    return Err(IndexerError::UnsupportedLedger {
                        found: persisted.schema_version,
                        expected: LEDGER_SCHEMA_VERSION,
                    });
                }
                persisted.records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedLedger {
            schema_version: LEDGER_SCHEMA_VERSION,
            records: self.records.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&CaptureRecord> {
        self.records.get(fingerprint)
    }

    /// The record for `fingerprint` if it has not been superseded
    pub fn live(&self, fingerprint: &Fingerprint) -> Option<&CaptureRecord> {
        self.records.get(fingerprint).filter(|record| record.is_live())
    }

    /// The live record most recently indexed for `url`
    pub fn live_for_url(&self, url: &str) -> Option<&CaptureRecord> {
        self.records
            .values()
            .filter(|record| record.is_live() && record.url == url)
            .max_by_key(|record| record.last_indexed_at)
    }

    /// Store `record`. An existing live record for the same fingerprint is
    /// only replaced when `replace` is set.
    pub fn commit(&mut self, record: CaptureRecord, replace: bool) -> Result<()> {
        if !replace && self.live(&record.fingerprint).is_some() {
            return Err(IndexerError::Other(format!(
                "{} is already indexed",
                record.fingerprint
            )));
        }
        self.records.insert(record.fingerprint.clone(), record);
        Ok(())
    }

    /// Mark `old` as replaced by `new`
    pub fn supersede(&mut self, old: &Fingerprint, new: &Fingerprint) -> bool {
        match self.records.get_mut(old) {
            Some(record) if old != new => {
                record.superseded_by = Some(new.clone());
                true
            }
            _ => false,
        }
    }

    /// Live records, optionally for one domain, sorted by domain then URL
    pub fn files(&self, domain: Option<&str>) -> Vec<&CaptureRecord> {
        let mut files: Vec<&CaptureRecord> = self
            .records
            .values()
            .filter(|record| record.is_live())
            .filter(|record| domain.map_or(true, |d| record.domain.eq_ignore_ascii_case(d)))
            .collect();
        files.sort_by(|a, b| a.domain.cmp(&b.domain).then_with(|| a.url.cmp(&b.url)));
        files
    }

    pub fn domains(&self) -> Vec<DomainSummary> {
        let mut by_domain: BTreeMap<&str, DomainSummary> = BTreeMap::new();
        for record in self.records.values().filter(|record| record.is_live()) {
            let summary = by_domain
                .entry(record.domain.as_str())
                .or_insert_with(|| DomainSummary {
                    domain: record.domain.clone(),
                    file_count: 0,
                    chunk_count: 0,
                    restored_count: 0,
                    latest_indexed_at: 0,
                });
            summary.file_count += 1;
            summary.chunk_count += record.chunk_count;
            summary.restored_count += usize::from(record.source_map_restored);
            summary.latest_indexed_at = summary.latest_indexed_at.max(record.last_indexed_at);
        }
        by_domain.into_values().collect()
    }

    /// Drop every record of `domain`, live or not; returns them
    pub fn remove_domain(&mut self, domain: &str) -> Vec<CaptureRecord> {
        let doomed: Vec<Fingerprint> = self
            .records
            .values()
            .filter(|record| record.domain.eq_ignore_ascii_case(domain))
            .map(|record| record.fingerprint.clone())
            .collect();
        doomed
            .iter()
            .filter_map(|fingerprint| self.records.remove(fingerprint))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(content: &[u8], url: &str, domain: &str, at: u64) -> CaptureRecord {
        CaptureRecord {
            fingerprint: Fingerprint::of(content),
            url: url.to_string(),
            domain: domain.to_string(),
            archived_path: PathBuf::from("/tmp/a.js"),
            map_path: None,
            has_source_map: false,
            source_map_restored: false,
            chunk_count: 3,
            last_indexed_at: at,
            superseded_by: None,
        }
    }

    #[test]
    fn commit_refuses_silent_overwrite() {
        let mut ledger = CaptureLedger::in_memory();
        let first = record(b"v1", "https://a.com/app.js", "a.com", 1);
        ledger.commit(first.clone(), false).unwrap();
        assert!(ledger.commit(first.clone(), false).is_err());
        ledger.commit(first, true).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn superseded_records_are_not_live() {
        let mut ledger = CaptureLedger::in_memory();
        let v1 = record(b"v1", "https://a.com/app.js", "a.com", 1);
        let v2 = record(b"v2", "https://a.com/app.js", "a.com", 2);
        ledger.commit(v1.clone(), false).unwrap();
        ledger.commit(v2.clone(), false).unwrap();
        assert!(ledger.supersede(&v1.fingerprint, &v2.fingerprint));

        assert!(ledger.live(&v1.fingerprint).is_none());
        assert!(ledger.get(&v1.fingerprint).is_some());
        assert_eq!(
            ledger.live_for_url("https://a.com/app.js").map(|r| &r.fingerprint),
            Some(&v2.fingerprint)
        );
        assert_eq!(ledger.files(None).len(), 1);
        // Superseded records can be re-captured.
        ledger.commit(v1, false).unwrap();
    }

    #[test]
    fn domain_summaries_and_removal() {
        let mut ledger = CaptureLedger::in_memory();
        ledger.commit(record(b"1", "https://a.com/1.js", "a.com", 5), false).unwrap();
        ledger.commit(record(b"2", "https://a.com/2.js", "a.com", 9), false).unwrap();
        ledger.commit(record(b"3", "https://b.com/3.js", "b.com", 7), false).unwrap();

        let domains = ledger.domains();
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].domain, "a.com");
        assert_eq!(domains[0].file_count, 2);
        assert_eq!(domains[0].chunk_count, 6);
        assert_eq!(domains[0].latest_indexed_at, 9);

        assert_eq!(ledger.files(Some("A.COM")).len(), 2);
        let removed = ledger.remove_domain("a.com");
        assert_eq!(removed.len(), 2);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn persists_atomically() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("ledger.json");
        let mut ledger = CaptureLedger::open(&path).await.unwrap();
        assert!(ledger.is_empty());
        ledger.commit(record(b"1", "https://a.com/1.js", "a.com", 5), false).unwrap();
        ledger.save().await.unwrap();

        let reloaded = CaptureLedger::open(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!path.with_extension("json.tmp").exists());

        tokio::fs::write(&path, br#"{"schema_version":99,"records":{}}"#).await.unwrap();
        assert!(matches!(
            CaptureLedger::open(&path).await,
            Err(IndexerError::UnsupportedLedger { found: 99, .. })
        ));
    }

    #[tokio::test]
    async fn truncated_fingerprint_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.json");
        let mut ledger = CaptureLedger::open(&path).await.unwrap();
        ledger.commit(record(b"1", "https://a.com/1.js", "a.com", 5), false).unwrap();
        ledger.save().await.unwrap();

        let full = Fingerprint::of(b"1").to_string();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        tokio::fs::write(&path, text.replace(&full, &full[..8])).await.unwrap();

        let err = CaptureLedger::open(&path).await.unwrap_err();
        assert!(err.to_string().contains("invalid fingerprint"), "{err}");
    }
}

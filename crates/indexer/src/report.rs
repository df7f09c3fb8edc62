use insight_vector_store::{Fingerprint, WriterError};
use insight_worker::BridgeError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// How a failure should be treated by whoever retries captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, rate limits, network hiccups; a later capture may succeed
    Transient,
    /// Something about this resource; retrying the same bytes will fail again
    Resource,
    /// The worker process died while handling this resource
    Process,
}

impl FailureKind {
    pub fn of_bridge(error: &BridgeError) -> Self {
        match error {
            BridgeError::Resource { .. } | BridgeError::Rejected(_) => Self::Resource,
            BridgeError::ChannelClosed(_) | BridgeError::Protocol(_) => Self::Process,
            e if e.is_transient() => Self::Transient,
            _ => Self::Process,
        }
    }

    pub fn of_writer(error: &WriterError) -> Self {
        if error.is_transient() {
            Self::Transient
        } else {
            Self::Resource
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already indexed with identical content
    Unchanged,
    /// Another capture indexed the same content first
    ConcurrentDuplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Indexed {
        chunks: usize,
        has_source_map: bool,
        source_map_restored: bool,
        /// The URL was indexed before with other content
        updated: bool,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

/// What happened to one resource of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceOutcome {
    pub url: String,
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureFailure {
    pub url: String,
    pub fingerprint: Fingerprint,
    pub kind: FailureKind,
    pub message: String,
}

/// Result of one `capture` call; outcomes are in batch order
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureReport {
    pub new_files: usize,
    pub updated_files: usize,
    pub skipped_unchanged: usize,
    pub skipped_duplicate: usize,
    pub source_maps_found: usize,
    pub restored: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<CaptureFailure>,
    pub outcomes: Vec<ResourceOutcome>,
    pub storage_path: PathBuf,
    pub time_ms: u64,
}

impl CaptureReport {
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Self::default()
        }
    }

    pub fn add_outcome(&mut self, outcome: ResourceOutcome) {
        match &outcome.status {
            OutcomeStatus::Indexed {
                chunks,
                has_source_map,
                source_map_restored,
                updated,
            } => {
                if *updated {
                    self.updated_files += 1;
                } else {
                    self.new_files += 1;
                }
                self.chunks_indexed += chunks;
                self.source_maps_found += usize::from(*has_source_map);
                self.restored += usize::from(*source_map_restored);
            }
            OutcomeStatus::Skipped { reason } => match reason {
                SkipReason::Unchanged => self.skipped_unchanged += 1,
                SkipReason::ConcurrentDuplicate => self.skipped_duplicate += 1,
            },
            OutcomeStatus::Failed { kind, message } => self.failures.push(CaptureFailure {
                url: outcome.url.clone(),
                fingerprint: outcome.fingerprint.clone(),
                kind: *kind,
                message: message.clone(),
            }),
        }
        self.outcomes.push(outcome);
    }

    pub fn skipped(&self) -> usize {
        self.skipped_unchanged + self.skipped_duplicate
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CaptureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("Captured {} new JS files", self.new_files)];
        if self.updated_files > 0 {
            parts.push(format!("updated {}", self.updated_files));
        }
        if self.skipped() > 0 {
            parts.push(format!("skipped {} already indexed", self.skipped()));
        }
        if self.source_maps_found > 0 {
            parts.push(format!(
                "found {} source maps ({} restored)",
                self.source_maps_found, self.restored
            ));
        }
        parts.push(format!("indexed {} chunks", self.chunks_indexed));
        if !self.failures.is_empty() {
            parts.push(format!("{} failed", self.failures.len()));
        }
        parts.push(format!("storage: {}", self.storage_path.display()));
        write!(f, "{}.", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(url: &str, status: OutcomeStatus) -> ResourceOutcome {
        ResourceOutcome {
            url: url.to_string(),
            fingerprint: Fingerprint::of(url.as_bytes()),
            status,
        }
    }

    #[test]
    fn counts_and_summary() {
        let mut report = CaptureReport::new(PathBuf::from("/data/insight"));
        report.add_outcome(outcome(
            "https://a.com/1.js",
            OutcomeStatus::Indexed {
                chunks: 4,
                has_source_map: true,
                source_map_restored: true,
                updated: false,
            },
        ));
        report.add_outcome(outcome(
            "https://a.com/2.js",
            OutcomeStatus::Indexed {
                chunks: 2,
                has_source_map: false,
                source_map_restored: false,
                updated: true,
            },
        ));
        report.add_outcome(outcome(
            "https://a.com/3.js",
            OutcomeStatus::Skipped {
                reason: SkipReason::Unchanged,
            },
        ));
        report.add_outcome(outcome(
            "https://a.com/4.js",
            OutcomeStatus::Failed {
                kind: FailureKind::Transient,
                message: "timeout".to_string(),
            },
        ));

        assert_eq!(report.new_files, 1);
        assert_eq!(report.updated_files, 1);
        assert_eq!(report.chunks_indexed, 6);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(
            report.summary(),
            "Captured 1 new JS files, updated 1, skipped 1 already indexed, \
             found 1 source maps (1 restored), indexed 6 chunks, 1 failed, \
             storage: /data/insight."
        );
    }

    #[test]
    fn failure_kinds() {
        assert_eq!(
            FailureKind::of_bridge(&BridgeError::Resource {
                url: "u".into(),
                message: "m".into()
            }),
            FailureKind::Resource
        );
        assert_eq!(
            FailureKind::of_bridge(&BridgeError::ChannelClosed("eof".into())),
            FailureKind::Process
        );
        assert_eq!(
            FailureKind::of_bridge(&BridgeError::Timeout(std::time::Duration::from_secs(1))),
            FailureKind::Transient
        );
    }

    #[test]
    fn outcome_serializes_flat() {
        let json = serde_json::to_value(outcome(
            "https://a.com/3.js",
            OutcomeStatus::Skipped {
                reason: SkipReason::ConcurrentDuplicate,
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "concurrent_duplicate");
    }
}

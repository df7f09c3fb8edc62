use insight_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a script's raw bytes as 64 lowercase hex chars.
/// Equal fingerprints mean identical content whatever the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(64);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Accept an already rendered fingerprint
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two hex chars, used to shard directories
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Abbreviated form for logs
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("invalid fingerprint {raw:?}"))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub url: String,
    pub domain: String,
    pub original_file: String,
    pub source_map_restored: bool,
    pub chunk: CodeChunk,
}

/// A chunk record with its embedding, as stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub fingerprint: Fingerprint,
    pub record: ChunkRecord,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn entry_id(fingerprint: &Fingerprint, ordinal: usize) -> String {
        format!("{fingerprint}:{ordinal}")
    }
}

/// Restricts which entries a query may return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub domain: Option<String>,
    pub restored_only: bool,
}

impl SearchFilter {
    pub fn matches(&self, record: &ChunkRecord) -> bool {
        if self.restored_only && !record.source_map_restored {
            return false;
        }
        match &self.domain {
            Some(domain) => record.domain.eq_ignore_ascii_case(domain),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub fingerprint: Fingerprint,
    pub record: ChunkRecord,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_code_chunker::ChunkMetadata;

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = Fingerprint::of(b"abc");
        assert_eq!(
            fp.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.shard(), "ba");
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp.clone()));
        assert_eq!(serde_json::to_string(&fp).unwrap(), format!("\"{fp}\""));
    }

    #[test]
    fn malformed_fingerprints_are_rejected_on_load() {
        let fp = Fingerprint::of(b"abc");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fp);

        for raw in ["\"ba78\"", "\"\"", "\"BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD\""] {
            let err = serde_json::from_str::<Fingerprint>(raw).unwrap_err();
            assert!(err.to_string().contains("invalid fingerprint"), "{err}");
        }
    }

    #[test]
    fn fingerprint_parse_rejects_non_hex() {
        assert!(Fingerprint::parse("abc").is_none());
        assert!(Fingerprint::parse(&"G".repeat(64)).is_none());
        assert!(Fingerprint::parse(&"A".repeat(64)).is_none());
    }

    #[test]
    fn filter_by_domain_and_restoration() {
        let record = ChunkRecord {
            url: "https://a.example/app.js".into(),
            domain: "a.example".into(),
            original_file: "app.js".into(),
            source_map_restored: false,
            chunk: CodeChunk::new("app.js".into(), 1, 1, "x".into(), ChunkMetadata::default()),
        };
        assert!(SearchFilter::default().matches(&record));
        assert!(SearchFilter { domain: Some("A.example".into()), restored_only: false }.matches(&record));
        assert!(!SearchFilter { domain: Some("b.example".into()), restored_only: false }.matches(&record));
        assert!(!SearchFilter { domain: None, restored_only: true }.matches(&record));
    }
}

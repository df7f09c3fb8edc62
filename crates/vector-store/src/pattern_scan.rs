//! Regex scans over indexed chunk text, used to locate hashing, cipher and
//! request-signing code without an embedding query.

use crate::store::VectorIndex;
use crate::types::{Fingerprint, SearchFilter};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Matching chunks kept per pattern
pub const MAX_MATCHES_PER_PATTERN: usize = 20;

/// Distinct matched strings reported per chunk
const MAX_SNIPPETS: usize = 5;

/// Longest excerpt of chunk text carried in a match
const EXCERPT_CHARS: usize = 500;

static CRYPTO_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("MD5", r"(?i)\b(md5|hex_md5)\s*\("),
        ("SHA", r"(?i)\b(sha1|sha256|sha512|sha)\s*\("),
        ("AES", r"(?i)\baes\s*\.\s*(encrypt|decrypt)"),
        ("DES/3DES", r"(?i)\b(des|tripledes)\s*\.\s*(encrypt|decrypt)"),
        ("RSA", r"(?i)\brsa\s*\.\s*(encrypt|decrypt|sign|verify)"),
        ("Base64", r"(?i)\b(btoa|atob|base64)\s*\("),
        ("HMAC", r"(?i)\b(hmac|hmacsha\w*|hmacmd5)\s*\("),
        ("CryptoJS", r"CryptoJS\.\w+"),
        ("JSEncrypt", r"JSEncrypt|jsencrypt"),
        ("sign/signature", r"(?i)\b(sign|signature|getsign|makesign|calcsign)\s*\("),
        (
            "token/encrypt",
            r"(?i)\b(encrypt|decrypt|encode|decode|encryptdata|decryptdata)\s*\(",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid crypto pattern")))
    .collect()
});

/// Names of the built-in crypto patterns, in scan order
pub fn crypto_pattern_names() -> Vec<&'static str> {
    CRYPTO_PATTERNS.iter().map(|(name, _)| *name).collect()
}

/// One chunk that matched a pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub fingerprint: Fingerprint,
    pub url: String,
    pub domain: String,
    pub original_file: String,
    pub source_map_restored: bool,
    pub line_start: usize,
    pub line_end: usize,
    /// Distinct matched text, first occurrences first
    pub matched: Vec<String>,
    pub excerpt: String,
}

/// Every chunk a single pattern matched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternScan {
    pub pattern: String,
    pub matches: Vec<PatternMatch>,
}

/// Run the built-in crypto patterns over the index. Patterns with no match
/// are left out.
pub async fn scan_crypto_patterns(
    index: &dyn VectorIndex,
    domain: Option<&str>,
) -> Vec<PatternScan> {
    let filter = SearchFilter {
        domain: domain.map(str::to_string),
        restored_only: false,
    };

    let mut scans = Vec::new();
    for (name, pattern) in CRYPTO_PATTERNS.iter() {
        let found = index
            .find_text(pattern, &filter, MAX_MATCHES_PER_PATTERN)
            .await;
        if found.is_empty() {
            continue;
        }
        log::debug!("Pattern {name}: {} chunks", found.len());

        let matches = found
            .into_iter()
            .map(|(fingerprint, record)| {
                let mut matched: Vec<String> = Vec::new();
                for m in pattern.find_iter(&record.chunk.content) {
                    if matched.len() == MAX_SNIPPETS {
                        break;
                    }
                    if !matched.iter().any(|seen| seen == m.as_str()) {
                        matched.push(m.as_str().to_string());
                    }
                }
                PatternMatch {
                    fingerprint,
                    url: record.url,
                    domain: record.domain,
                    original_file: record.original_file,
                    source_map_restored: record.source_map_restored,
                    line_start: record.chunk.start_line,
                    line_end: record.chunk.end_line,
                    matched,
                    excerpt: excerpt(&record.chunk.content),
                }
            })
            .collect();
        scans.push(PatternScan {
            pattern: (*name).to_string(),
            matches,
        });
    }
    scans
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonVectorIndex;
    use crate::types::{ChunkRecord, IndexEntry};
    use insight_code_chunker::{ChunkMetadata, CodeChunk};
    use pretty_assertions::assert_eq;

    fn entry(content: &[u8], domain: &str, file: &str, code: &str, line: usize) -> IndexEntry {
        let fingerprint = Fingerprint::of(content);
        IndexEntry {
            id: IndexEntry::entry_id(&fingerprint, line),
            fingerprint,
            record: ChunkRecord {
                url: format!("https://{domain}/app.js"),
                domain: domain.to_string(),
                original_file: file.to_string(),
                source_map_restored: file.starts_with("src/"),
                chunk: CodeChunk::new(
                    file.to_string(),
                    line,
                    line + code.lines().count() - 1,
                    code.to_string(),
                    ChunkMetadata::default(),
                ),
            },
            vector: vec![1.0, 0.0],
        }
    }

    async fn fixture() -> JsonVectorIndex {
        let index = JsonVectorIndex::in_memory(2);
        index
            .upsert(vec![
                entry(
                    b"a",
                    "shop.example",
                    "src/crypto.ts",
                    "export function seal(body, key) {\n  return CryptoJS.AES.encrypt(JSON.stringify(body), key).toString();\n}",
                    10,
                ),
                entry(
                    b"b",
                    "shop.example",
                    "src/sign.ts",
                    "function sign(params) {\n  return md5(Object.keys(params).sort().join('&'));\n}",
                    3,
                ),
                entry(
                    b"c",
                    "news.example",
                    "https://news.example/app.js",
                    "function h(s){return md5(s)}",
                    1,
                ),
                entry(
                    b"d",
                    "shop.example",
                    "src/cart.ts",
                    "export function total(items) {\n  return items.reduce((sum, item) => sum + item.price, 0);\n}",
                    1,
                ),
            ])
            .await
            .unwrap();
        index
    }

    fn scan<'a>(scans: &'a [PatternScan], name: &str) -> Option<&'a PatternScan> {
        scans.iter().find(|scan| scan.pattern == name)
    }

    #[tokio::test]
    async fn finds_cipher_and_hash_calls() {
        let index = fixture().await;
        let scans = scan_crypto_patterns(&index, None).await;

        let aes = scan(&scans, "AES").expect("AES hit");
        assert_eq!(aes.matches.len(), 1);
        assert_eq!(aes.matches[0].original_file, "src/crypto.ts");
        assert_eq!(aes.matches[0].matched, vec!["AES.encrypt".to_string()]);
        assert_eq!((aes.matches[0].line_start, aes.matches[0].line_end), (10, 12));

        let crypto_js = scan(&scans, "CryptoJS").expect("CryptoJS hit");
        assert_eq!(crypto_js.matches[0].matched, vec!["CryptoJS.AES".to_string()]);

        let md5 = scan(&scans, "MD5").expect("MD5 hit");
        assert_eq!(md5.matches.len(), 2);

        let sign = scan(&scans, "sign/signature").expect("sign hit");
        assert_eq!(sign.matches[0].original_file, "src/sign.ts");

        assert!(scans
            .iter()
            .all(|scan| scan.matches.iter().all(|m| m.original_file != "src/cart.ts")));
        let order: Vec<&str> = scans.iter().map(|scan| scan.pattern.as_str()).collect();
        let expected: Vec<&str> = crypto_pattern_names()
            .into_iter()
            .filter(|name| order.contains(name))
            .collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn domain_limits_the_scan() {
        let index = fixture().await;
        let scans = scan_crypto_patterns(&index, Some("news.example")).await;

        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].pattern, "MD5");
        assert_eq!(scans[0].matches[0].domain, "news.example");
        assert!(scan_crypto_patterns(&index, Some("nowhere.example")).await.is_empty());
    }

    #[test]
    fn long_chunks_are_cut_on_a_char_boundary() {
        let text = "é".repeat(EXCERPT_CHARS + 10);
        let cut = excerpt(&text);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }
}

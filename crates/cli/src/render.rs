use insight_indexer::{CaptureRecord, DomainSummary};
use insight_vector_store::{PatternScan, SearchHit};
use serde::Serialize;

/// Lines of chunk content shown per search hit
const PREVIEW_LINES: usize = 12;

/// Matches listed per crypto pattern before eliding the rest
const MATCHES_SHOWN: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultView {
    pub rank: usize,
    pub score: f32,
    pub original_file: String,
    pub url: String,
    pub domain: String,
    pub source_map_restored: bool,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub content: String,
}

impl SearchResultView {
    pub fn from_hits(hits: Vec<SearchHit>) -> Vec<Self> {
        hits.into_iter()
            .enumerate()
            .map(|(i, hit)| {
                let chunk = hit.record.chunk;
                Self {
                    rank: i + 1,
                    score: hit.score,
                    original_file: hit.record.original_file,
                    url: hit.record.url,
                    domain: hit.record.domain,
                    source_map_restored: hit.record.source_map_restored,
                    line_start: chunk.start_line,
                    line_end: chunk.end_line,
                    symbol: chunk.metadata.symbol_name,
                    content: chunk.content,
                }
            })
            .collect()
    }
}

fn origin_tag(restored: bool) -> &'static str {
    if restored {
        "restored"
    } else {
        "compiled"
    }
}

pub fn search_results(query: &str, results: &[SearchResultView]) -> String {
    if results.is_empty() {
        return format!("No results for \"{query}\".\n");
    }
    let mut out = format!("Found {} results for \"{query}\":\n\n", results.len());
    for result in results {
        out.push_str(&format!(
            "{}. {} [{}] (score: {:.3})\n",
            result.rank,
            result.original_file,
            origin_tag(result.source_map_restored),
            result.score
        ));
        out.push_str(&format!("   URL: {}\n", result.url));
        out.push_str(&format!("   Lines: {}-{}\n", result.line_start, result.line_end));
        if let Some(symbol) = &result.symbol {
            out.push_str(&format!("   Symbol: {symbol}\n"));
        }
        let total = result.content.lines().count();
        for line in result.content.lines().take(PREVIEW_LINES) {
            out.push_str(&format!("   | {line}\n"));
        }
        if total > PREVIEW_LINES {
            out.push_str(&format!("   | ... ({} more lines)\n", total - PREVIEW_LINES));
        }
        out.push('\n');
    }
    out
}

pub fn pattern_scans(scans: &[PatternScan]) -> String {
    if scans.is_empty() {
        return "No crypto patterns found. The code may use custom obfuscation or WASM.\n"
            .to_string();
    }
    let total: usize = scans.iter().map(|scan| scan.matches.len()).sum();
    let mut out = format!(
        "Found {total} crypto-related chunks across {} patterns:\n\n",
        scans.len()
    );
    for scan in scans {
        out.push_str(&format!("## {} ({})\n", scan.pattern, scan.matches.len()));
        for m in scan.matches.iter().take(MATCHES_SHOWN) {
            out.push_str(&format!(
                "- {} [{}] lines {}-{}: {}\n",
                m.original_file,
                origin_tag(m.source_map_restored),
                m.line_start,
                m.line_end,
                m.matched.join(", ")
            ));
            out.push_str(&format!("   URL: {}\n", m.url));
            for line in m.excerpt.lines().take(PREVIEW_LINES) {
                out.push_str(&format!("   | {line}\n"));
            }
        }
        if scan.matches.len() > MATCHES_SHOWN {
            out.push_str(&format!(
                "   ... {} more\n",
                scan.matches.len() - MATCHES_SHOWN
            ));
        }
        out.push('\n');
    }
    out
}

pub fn domains(summaries: &[DomainSummary]) -> String {
    if summaries.is_empty() {
        return "Nothing captured yet.\n".to_string();
    }
    let width = summaries.iter().map(|s| s.domain.len()).max().unwrap_or(0);
    let mut out = String::new();
    for summary in summaries {
        out.push_str(&format!(
            "{:<width$}  {:>5} files  {:>6} chunks  {:>5} restored\n",
            summary.domain, summary.file_count, summary.chunk_count, summary.restored_count
        ));
    }
    let files: usize = summaries.iter().map(|s| s.file_count).sum();
    let chunks: usize = summaries.iter().map(|s| s.chunk_count).sum();
    out.push_str(&format!(
        "{} domains, {files} files, {chunks} chunks\n",
        summaries.len()
    ));
    out
}

pub fn files(records: &[CaptureRecord]) -> String {
    if records.is_empty() {
        return "No captured files.\n".to_string();
    }
    let mut out = String::new();
    for record in records {
        let map = match (record.has_source_map, record.source_map_restored) {
            (true, true) => "map, restored",
            (true, false) => "map, not restored",
            (false, _) => "no map",
        };
        out.push_str(&format!(
            "{}  {} ({} chunks, {map})\n    {}\n",
            record.fingerprint.short(),
            record.url,
            record.chunk_count,
            record.archived_path.display()
        ));
    }
    out
}

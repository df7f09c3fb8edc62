use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// One captured script, as handed over by the browser side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub url: String,
    pub raw_bytes: Vec<u8>,
    /// Map bytes captured together with the script
    pub map_bytes: Option<Vec<u8>>,
    /// Where the map can be fetched, if the capturer knows
    pub map_url: Option<String>,
    /// Unix milliseconds
    pub captured_at: u64,
}

impl ResourceDescriptor {
    pub fn new(url: impl Into<String>, raw_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            raw_bytes: raw_bytes.into(),
            map_bytes: None,
            map_url: None,
            captured_at: now_ms(),
        }
    }

    #[must_use]
    pub fn with_map(mut self, map_bytes: impl Into<Vec<u8>>) -> Self {
        self.map_bytes = Some(map_bytes.into());
        self
    }

    #[must_use]
    pub fn with_map_url(mut self, map_url: impl Into<String>) -> Self {
        self.map_url = Some(map_url.into());
        self
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Host (and port) of `url`, or `unknown`
pub fn domain_of(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "unknown".to_string();
    };
    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Name to archive the script under: the last path segment of the URL,
/// made safe for the file system
pub fn file_name_for(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let cleaned: String = segment
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "index.js".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

/// Conventional map location next to the script: `<url>.map`, placed before
/// any query or fragment
pub fn sibling_map_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https" | "file") {
        return None;
    }
    let path = format!("{}.map", parsed.path());
    parsed.set_path(&path);
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_keeps_port_and_falls_back() {
        assert_eq!(domain_of("https://www.example.com/a.js"), "www.example.com");
        assert_eq!(domain_of("http://localhost:8080/a.js"), "localhost:8080");
        assert_eq!(domain_of("not a url"), "unknown");
    }

    #[test]
    fn file_names_are_safe() {
        assert_eq!(file_name_for("https://x.com/static/js/main.3f2a.js?v=1"), "main.3f2a.js");
        assert_eq!(file_name_for("https://x.com/"), "index.js");
        assert_eq!(file_name_for("https://x.com/a%20b.js"), "a_20b.js");
        assert_eq!(file_name_for("https://x.com/.."), "index.js");
    }

    #[test]
    fn sibling_map_goes_before_query() {
        assert_eq!(
            sibling_map_url("https://x.com/js/app.js?v=2#top").as_deref(),
            Some("https://x.com/js/app.js.map")
        );
        assert_eq!(sibling_map_url("data:text/javascript,1"), None);
    }
}

use crate::descriptor::{sibling_map_url, ResourceDescriptor};
use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use insight_source_map::{decode_data_url, map_reference, MapReference};
use std::time::Duration;
use url::Url;

/// Fetches a source map by URL. `Ok(None)` means there is none.
#[async_trait]
pub trait MapFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

/// Never finds a map; for offline captures
pub struct NoMapFetcher;

#[async_trait]
impl MapFetcher for NoMapFetcher {
    async fn fetch(&self, _url: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Fetches maps over HTTP(S). Non-success statuses read as "no map".
pub struct HttpMapFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpMapFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Other(format!("build HTTP client: {e}")))?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl MapFetcher for HttpMapFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let parsed = Url::parse(url).map_err(|e| IndexerError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Ok(None);
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| IndexerError::Other(format!("fetch {url}: {e}")))?;
        if !response.status().is_success() {
            log::debug!("No map at {url} ({})", response.status());
            return Ok(None);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| IndexerError::Other(format!("read {url}: {e}")))?;
        if bytes.len() > self.max_bytes {
            log::warn!("Ignoring {} byte map at {url}", bytes.len());
            return Ok(None);
        }
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }
}

/// Find the map for `descriptor`: captured bytes first, then the capturer's
/// hint, then the script's `sourceMappingURL` annotation, then `<url>.map`.
/// Fetch failures are logged and read as "no map".
pub async fn resolve_map(
    descriptor: &ResourceDescriptor,
    fetcher: &dyn MapFetcher,
) -> Option<Vec<u8>> {
    if let Some(bytes) = &descriptor.map_bytes {
        return Some(bytes.clone());
    }

    let mut candidates = Vec::new();
    if let Some(hint) = &descriptor.map_url {
        candidates.push(hint.clone());
    }
    let code = String::from_utf8_lossy(&descriptor.raw_bytes);
    match map_reference(&code) {
        Some(MapReference::Inline(bytes)) => return Some(bytes),
        Some(MapReference::Url(reference)) => {
            if let Some(resolved) = join_url(&descriptor.url, &reference) {
                candidates.push(resolved);
            }
        }
        None => {}
    }
    if let Some(sibling) = sibling_map_url(&descriptor.url) {
        candidates.push(sibling);
    }
    candidates.dedup();

    for candidate in candidates {
        if candidate.starts_with("data:") {
            if let Some(bytes) = decode_data_url(&candidate) {
                return Some(bytes);
            }
            continue;
        }
        match fetcher.fetch(&candidate).await {
            Ok(Some(bytes)) => return Some(bytes),
            Ok(None) => {}
            Err(e) => log::debug!("{}: map fetch failed: {e}", descriptor.url),
        }
    }
    None
}

/// Resolve `reference` against the script URL `base`
pub fn join_url(base: &str, reference: &str) -> Option<String> {
    if reference.starts_with("data:") {
        return Some(reference.to_string());
    }
    match Url::parse(reference) {
        Ok(absolute) => Some(absolute.into()),
        Err(_) => Url::parse(base)
            .ok()?
            .join(reference)
            .ok()
            .map(Into::into),
    }
}

use crate::error::{RestoreError, Result};
use crate::vlq;
use serde::Deserialize;
use std::collections::HashSet;

/// Prefix some servers prepend to defeat cross-site script inclusion
const XSSI_PREFIX: &str = ")]}'";

/// The parts of a revision 3 source map needed for restoration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(default)]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    mappings: String,
    #[serde(default)]
    sections: Option<Vec<Section>>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    map: Option<Box<RawSourceMap>>,
}

/// One original file recovered from a map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredSource {
    /// Identifier of the original file as the map names it
    pub original_file: String,
    pub content: String,
}

/// Result of a successful restoration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restoration {
    sources: Vec<RestoredSource>,
    missing: Vec<String>,
}

impl Restoration {
    /// Restored files in order of first reference
    pub fn sources(&self) -> &[RestoredSource] {
        &self.sources
    }

    /// Referenced files the map had no inline content for
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn into_sources(self) -> Vec<RestoredSource> {
        self.sources
    }

    fn record(&mut self, seen: &mut HashSet<String>, id: String, content: Option<&str>) {
        if !seen.insert(id.clone()) {
            return;
        }
        match content {
            Some(text) if !text.is_empty() => self.sources.push(RestoredSource {
                original_file: id,
                content: text.to_string(),
            }),
            _ => self.missing.push(id),
        }
    }
}

/// Recover original sources from a source map document.
///
/// Fails closed: malformed JSON, an unknown version, undecodable mappings, or
/// mappings that point outside `sources` all return an error rather than a
/// partial result. A map whose referenced sources all lack inline content
/// returns [`RestoreError::NothingRestored`].
pub fn restore(map_bytes: &[u8]) -> Result<Restoration> {
    let text = String::from_utf8_lossy(map_bytes);
    let body = text.trim_start_matches('\u{feff}');
    let body = body.strip_prefix(XSSI_PREFIX).unwrap_or(body);
    let map: RawSourceMap = serde_json::from_str(body)?;

    let mut restoration = Restoration::default();
    let mut seen = HashSet::new();
    walk(&map, &mut restoration, &mut seen)?;

    if restoration.sources.is_empty() {
        return Err(RestoreError::NothingRestored {
            referenced: restoration.missing.len(),
            missing: restoration.missing.len(),
        });
    }

    log::debug!(
        "Restored {} sources ({} without content)",
        restoration.sources.len(),
        restoration.missing.len()
    );
    Ok(restoration)
}

fn walk(map: &RawSourceMap, out: &mut Restoration, seen: &mut HashSet<String>) -> Result<()> {
    if map.version != 3 {
        return Err(RestoreError::UnsupportedVersion(map.version));
    }

    if let Some(sections) = &map.sections {
        for section in sections {
            match (&section.map, &section.url) {
                (Some(inner), _) => walk(inner, out, seen)?,
                (None, Some(url)) => log::debug!("Skipping section with external map {url}"),
                (None, None) => {}
            }
        }
        return Ok(());
    }

    let mut referenced = Vec::new();
    let mut first_seen = HashSet::new();
    vlq::for_each_source(&map.mappings, map.sources.len(), |index| {
        if first_seen.insert(index) {
            referenced.push(index);
        }
    })?;

    for index in referenced {
        let id = source_id(map.source_root.as_deref(), map.sources[index].as_deref(), index);
        let content = map.sources_content.get(index).and_then(Option::as_deref);
        out.record(seen, id, content);
    }
    Ok(())
}

fn source_id(root: Option<&str>, source: Option<&str>, index: usize) -> String {
    let Some(source) = source else {
        return format!("source-{index}");
    };
    match root.filter(|r| !r.is_empty()) {
        Some(root) if !source.starts_with('/') && !source.contains("://") => {
            format!("{}/{}", root.trim_end_matches('/'), source)
        }
        _ => source.to_string(),
    }
}

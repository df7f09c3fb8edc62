use anyhow::{bail, Context, Result};
use insight_indexer::ResourceDescriptor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// One captured script as listed by a capture tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub url: String,
    /// Saved response body; relative to the manifest
    pub path: PathBuf,
    #[serde(default)]
    pub map_path: Option<PathBuf>,
    /// Where the page said the map lives
    #[serde(default)]
    pub map_url: Option<String>,
}

/// Read a JSON manifest (`[{url, path, mapPath?, mapUrl?}]`) and the files it names
pub fn load_manifest(path: &Path) -> Result<Vec<ResourceDescriptor>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_slice(&raw)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    entries
        .into_iter()
        .map(|entry| {
            let script = base.join(&entry.path);
            let bytes = std::fs::read(&script)
                .with_context(|| format!("Failed to read {} ({})", script.display(), entry.url))?;
            let mut descriptor = ResourceDescriptor::new(entry.url, bytes);
            if let Some(map_path) = entry.map_path.filter(|p| !p.as_os_str().is_empty()) {
                let map = base.join(map_path);
                match std::fs::read(&map) {
                    Ok(bytes) => descriptor = descriptor.with_map(bytes),
                    Err(e) => log::warn!("Skipping unreadable map {}: {e}", map.display()),
                }
            }
            if let Some(map_url) = entry.map_url {
                descriptor = descriptor.with_map_url(map_url);
            }
            Ok(descriptor)
        })
        .collect()
}

/// Every script under `dir`, addressed as if served from `base_url`.
/// A sibling `<name>.map` is captured along with its script.
pub fn scan_directory(dir: &Path, base_url: &str) -> Result<Vec<ResourceDescriptor>> {
    let mut base = Url::parse(base_url).with_context(|| format!("Invalid base URL {base_url}"))?;
    if base.cannot_be_a_base() {
        bail!("Base URL {base_url} cannot have paths appended");
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut descriptors = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() || !is_script(entry.path()) {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let relative = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let url = base
            .join(&relative)
            .with_context(|| format!("Cannot address {relative} under {base}"))?;

        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        let mut descriptor = ResourceDescriptor::new(url.as_str(), bytes);
        let map = sibling_map(entry.path());
        if map.is_file() {
            match std::fs::read(&map) {
                Ok(bytes) => descriptor = descriptor.with_map(bytes),
                Err(e) => log::warn!("Skipping unreadable map {}: {e}", map.display()),
            }
        }
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn sibling_map(script: &Path) -> PathBuf {
    let mut name = script.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".map");
    script.with_file_name(name)
}

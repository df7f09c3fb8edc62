use crate::error::{IndexerError, Result};
use insight_vector_store::Fingerprint;
use std::path::{Path, PathBuf};

/// Content-addressed storage for captured scripts and their maps:
/// `<root>/<domain>/<fp[0..2]>/<fp>/<file name>`
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        self.root.join(safe_component(domain))
    }

    pub fn script_path(&self, domain: &str, fingerprint: &Fingerprint, file_name: &str) -> PathBuf {
        self.domain_dir(domain)
            .join(fingerprint.shard())
            .join(fingerprint.as_str())
            .join(file_name)
    }

    /// Write the script once per fingerprint; later captures reuse the file
    pub async fn store_script(
        &self,
        domain: &str,
        fingerprint: &Fingerprint,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.script_path(domain, fingerprint, file_name);
        write_once(&path, bytes).await?;
        Ok(path)
    }

    /// Write the map next to its script as `<file name>.map`
    pub async fn store_map(&self, script_path: &Path, bytes: &[u8]) -> Result<PathBuf> {
        let mut name = script_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".map");
        let path = script_path.with_file_name(name);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    /// Delete everything archived for `domain`; returns whether anything was there
    pub async fn remove_domain(&self, domain: &str) -> Result<bool> {
        let dir = self.domain_dir(domain);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Numbered lines of an archived file; paths outside the root are refused
    pub async fn read_numbered(
        &self,
        path: &Path,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<String> {
        let resolved = tokio::fs::canonicalize(path).await?;
        let root = tokio::fs::canonicalize(&self.root).await?;
        if !resolved.starts_with(&root) {
            return Err(IndexerError::Other(format!(
                "{} is outside the archive",
                path.display()
            )));
        }
        let bytes = tokio::fs::read(&resolved).await?;
        Ok(numbered_lines(&String::from_utf8_lossy(&bytes), start, end))
    }
}

async fn write_once(path: &Path, bytes: &[u8]) -> Result<()> {
    if tokio::fs::metadata(path).await.is_ok() {
        return Ok(());
    }
    write_atomic(path, bytes).await
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn safe_component(raw: &str) -> String {
    let out: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let out = out.trim_start_matches('.');
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out.to_string()
    }
}

/// Lines `start..=end` (1-based, clamped) of `text`, numbered
pub fn numbered_lines(text: &str, start: Option<usize>, end: Option<usize>) -> String {
    let start = start.unwrap_or(1).max(1);
    let end = end.unwrap_or(usize::MAX);
    let mut out = String::new();
    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        if number < start {
            continue;
        }
        if number > end {
            break;
        }
        out.push_str(&format!("{number:>6} | {line}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn layout_is_content_addressed() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = ArchiveStore::new(tmp.path());
        let fp = Fingerprint::of(b"console.log(1)");

        let path = archive
            .store_script("Example.com:8080", &fp, "app.js", b"console.log(1)")
            .await
            .unwrap();
        assert_eq!(
            path,
            tmp.path()
                .join("example.com_8080")
                .join(fp.shard())
                .join(fp.as_str())
                .join("app.js")
        );

        // A second store keeps the first bytes.
        archive
            .store_script("Example.com:8080", &fp, "app.js", b"other")
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"console.log(1)");

        let map = archive.store_map(&path, b"{}").await.unwrap();
        assert!(map.ends_with("app.js.map"));

        assert!(archive.remove_domain("Example.com:8080").await.unwrap());
        assert!(!archive.remove_domain("Example.com:8080").await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reads_stay_inside_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = ArchiveStore::new(tmp.path().join("archive"));
        let fp = Fingerprint::of(b"a();\nb();");
        let path = archive
            .store_script("a.example", &fp, "x.js", b"a();\nb();")
            .await
            .unwrap();

        assert_eq!(
            archive.read_numbered(&path, Some(2), None).await.unwrap(),
            "     2 | b();\n"
        );

        let outside = tmp.path().join("secret.txt");
        std::fs::write(&outside, "nope").unwrap();
        assert!(archive.read_numbered(&outside, None, None).await.is_err());
        let sneaky = tmp.path().join("archive").join("..").join("secret.txt");
        assert!(archive.read_numbered(&sneaky, None, None).await.is_err());
    }

    #[test]
    fn domain_components_cannot_escape() {
        assert_eq!(safe_component("../etc"), "_etc");
        assert_eq!(safe_component(".insight"), "insight");
        assert_eq!(safe_component(""), "unknown");
    }

    #[test]
    fn numbered_line_ranges() {
        let text = "a\nb\nc\nd";
        assert_eq!(numbered_lines(text, Some(2), Some(3)), "     2 | b\n     3 | c\n");
        assert_eq!(numbered_lines(text, None, Some(1)), "     1 | a\n");
        assert_eq!(numbered_lines(text, Some(4), None), "     4 | d\n");
        assert_eq!(numbered_lines(text, Some(9), None), "");
    }
}

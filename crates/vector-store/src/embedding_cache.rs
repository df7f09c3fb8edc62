use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const CACHE_MAGIC: &[u8; 4] = b"EC01";

/// On-disk vectors keyed by model and text hash, so re-indexing unchanged
/// chunks skips the embedding provider
#[derive(Clone, Debug)]
pub struct EmbeddingCache {
    base_dir: PathBuf,
}

impl EmbeddingCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn vector_path(&self, model_id: &str, text: &str) -> PathBuf {
        let key = text_key(text);
        let (shard_a, shard_b) = shard_dirs(&key);
        self.base_dir
            .join(safe_component(model_id))
            .join(shard_a)
            .join(shard_b)
            .join(format!("{key}.bin"))
    }

    pub async fn get_vector(&self, model_id: &str, text: &str, dimension: usize) -> Option<Vec<f32>> {
        let path = self.vector_path(model_id, text);
        let bytes = tokio::fs::read(&path).await.ok()?;
        decode_vector(&bytes, dimension)
    }

    pub async fn put_vector(&self, model_id: &str, text: &str, vector: &[f32]) -> Result<()> {
        let path = self.vector_path(model_id, text);
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = encode_vector(vector);
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if tokio::fs::rename(&tmp, &path).await.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        Ok(())
    }
}

fn text_key(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn safe_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

fn shard_dirs(hex: &str) -> (String, String) {
    let a = hex.get(0..2).unwrap_or("00").to_string();
    let b = hex.get(2..4).unwrap_or("00").to_string();
    (a, b)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + vector.len() * 4);
    out.extend_from_slice(CACHE_MAGIC);
    #[allow(clippy::cast_possible_truncation)]
    let dim = vector.len() as u32;
    out.extend_from_slice(&dim.to_le_bytes());
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_vector(bytes: &[u8], expected_dimension: usize) -> Option<Vec<f32>> {
    if bytes.len() < 8 || &bytes[0..4] != CACHE_MAGIC {
        return None;
    }
    let dim = u32::from_le_bytes(bytes[4..8].try_into().ok()?) as usize;
    if dim != expected_dimension || bytes.len() != 8 + dim * 4 {
        return None;
    }
    bytes[8..]
        .chunks_exact(4)
        .map(|raw| raw.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

use crate::error::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EMBEDDING_MODE_ENV: &str = "INSIGHT_EMBEDDING_MODE";
pub const EMBEDDING_API_KEY_ENV: &str = "INSIGHT_EMBEDDING_API_KEY";

/// Produces embedding vectors for text
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input text, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
    /// Deterministic hash vectors, no network
    Stub,
}

impl EmbeddingMode {
    /// Environment override, if set
    pub fn from_env() -> Result<Option<Self>, EmbedError> {
        let Ok(raw) = env::var(EMBEDDING_MODE_ENV) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "http" => Ok(Some(Self::Http)),
            "stub" => Ok(Some(Self::Stub)),
            other => Err(EmbedError::Config(format!(
                "Unsupported {EMBEDDING_MODE_ENV} '{other}' (expected 'http' or 'stub')"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,

    /// Full URL of the embeddings endpoint
    pub url: String,

    pub model: String,

    /// Vector length the model produces
    pub dimension: usize,

    /// Bearer token; falls back to `INSIGHT_EMBEDDING_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub timeout_secs: u64,

    /// Longer texts are truncated (in chars) before embedding
    pub max_text_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Http,
            url: "https://api.siliconflow.cn/v1/embeddings".to_string(),
            model: "BAAI/bge-m3".to_string(),
            dimension: 1024,
            api_key: None,
            timeout_secs: 60,
            max_text_chars: 4000,
        }
    }
}

impl EmbeddingConfig {
    /// Apply `INSIGHT_EMBEDDING_MODE` and `INSIGHT_EMBEDDING_API_KEY`
    pub fn with_env_overrides(mut self) -> Result<Self, EmbedError> {
        if let Some(mode) = EmbeddingMode::from_env()? {
            self.mode = mode;
        }
        if self.api_key.is_none() {
            self.api_key = env::var(EMBEDDING_API_KEY_ENV)
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.dimension == 0 {
            return Err("embedding.dimension must be > 0".to_string());
        }
        if self.max_text_chars == 0 {
            return Err("embedding.max_text_chars must be > 0".to_string());
        }
        if self.mode == EmbeddingMode::Http && self.url.trim().is_empty() {
            return Err("embedding.url is required in http mode".to_string());
        }
        Ok(())
    }
}

/// Build the embedder `config` asks for
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbedError> {
    config.validate().map_err(EmbedError::Config)?;
    match config.mode {
        EmbeddingMode::Stub => Ok(Arc::new(StubEmbedder::new(config.dimension))),
        EmbeddingMode::Http => Ok(Arc::new(HttpEmbedder::new(config.clone())?)),
    }
}

/// Client for OpenAI-compatible embedding APIs. Makes exactly one request per
/// call; retrying is up to the caller.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EmbedError::Config(format!(
                "no API key: set embedding.api_key or {EMBEDDING_API_KEY_ENV}"
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(e.to_string()))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn prepare(&self, text: &str) -> String {
        let truncated: String = text.chars().take(self.config.max_text_chars).collect();
        if truncated.trim().is_empty() {
            " ".to_string()
        } else {
            truncated
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input: Vec<String> = texts.iter().map(|text| self.prepare(text)).collect();
        let body = serde_json::json!({
            "model": self.config.model,
            "input": input,
            "encoding_format": "float",
        });

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 413 {
            return Err(EmbedError::PayloadTooLarge { texts: texts.len() });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        parsed.data.sort_by_key(|item| item.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed
            .data
            .into_iter()
            .map(|item| {
                if item.embedding.len() == self.config.dimension {
                    Ok(item.embedding)
                } else {
                    Err(EmbedError::InvalidResponse(format!(
                        "expected dimension {}, got {}",
                        self.config.dimension,
                        item.embedding.len()
                    )))
                }
            })
            .collect()
    }
}

/// Deterministic embedder for tests and offline runs: equal texts get equal
/// unit vectors, different texts almost surely do not
pub struct StubEmbedder {
    dimension: usize,
    batch_calls: AtomicUsize,
}

impl StubEmbedder {
    pub const MODEL_ID: &'static str = "stub";

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` calls so far
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_id(&self) -> &str {
        Self::MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        Ok(texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for v in vec {
        *v /= norm;
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_config(server: &MockServer, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            url: format!("{}/v1/embeddings", server.uri()),
            dimension,
            api_key: Some("secret".to_string()),
            max_text_chars: 8,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn stub_is_deterministic_and_normalized() {
        let stub = StubEmbedder::new(16);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = stub.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(stub.batch_calls(), 1);
    }

    #[test]
    fn cosine_edges() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn http_mode_needs_a_key() {
        let config = EmbeddingConfig {
            api_key: None,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(HttpEmbedder::new(config), Err(EmbedError::Config(_))));
    }

    #[tokio::test]
    async fn http_sorts_by_index_and_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(http_config(&server, 2)).unwrap();
        let vectors = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn http_classifies_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;
        let embedder = HttpEmbedder::new(http_config(&server, 2)).unwrap();
        let err = embedder.embed_batch(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::PayloadTooLarge { texts: 1 }));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        let embedder = HttpEmbedder::new(http_config(&server, 2)).unwrap();
        let err = embedder.embed_batch(&["x".to_string()]).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn http_rejects_wrong_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]
            })))
            .mount(&server)
            .await;
        let embedder = HttpEmbedder::new(http_config(&server, 2)).unwrap();
        let err = embedder.embed_batch(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse(_)));
    }

    #[test]
    fn prepare_truncates_and_fills_blanks() {
        let embedder = HttpEmbedder::new(EmbeddingConfig {
            api_key: Some("k".into()),
            max_text_chars: 4,
            ..EmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(embedder.prepare("abcdefgh"), "abcd");
        assert_eq!(embedder.prepare("   "), " ");
        assert_eq!(embedder.prepare("é日本語x"), "é日本語");
    }
}

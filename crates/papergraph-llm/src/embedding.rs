//! Text embedding backends used for similarity search.
//!
//! Backends:
//!   GeminiEmbedder: Gemini batchEmbedContents
//!   OpenAiCompatibleEmbedder: any OpenAI-compatible /v1/embeddings endpoint
//!   HashedEmbedder: offline hashed term-frequency vectors, no network

use std::sync::Arc;

use async_trait::async_trait;
use papergraph_config::{ApiKeys, EmbeddingBackendKind, EmbeddingConfig};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::backend::{check_response_status, LlmError, GEMINI_BASE_URL};

/// Gemini accepts at most 100 requests per batchEmbedContents call.
const GEMINI_BATCH: usize = 100;
const OPENAI_BATCH: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// Vectors from different models are not comparable; stores key on this.
    fn model_id(&self) -> &str;
}

// ── Gemini ────────────────────────────────────────────────────────────────────

pub struct GeminiEmbedder {
    pub model: String,
    pub base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model: String = model.into();
        Self {
            api_key: api_key.into(),
            model: model.trim_start_matches("models/").to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:batchEmbedContents?key={}",
            self.base_url.trim_end_matches('/'), self.model, self.api_key
        );
        let requests: Vec<Value> = texts
            .iter()
            .map(|t| serde_json::json!({
                "model": format!("models/{}", self.model),
                "content": { "parts": [{ "text": t }] },
            }))
            .collect();
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        parse_gemini_embeddings(&json, texts.len())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    #[instrument(skip_all, fields(n = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(GEMINI_BATCH) {
            out.extend(self.embed_chunk(chunk).await?);
        }
        Ok(out)
    }

    fn model_id(&self) -> &str { &self.model }
}

// ── OpenAI-compatible ─────────────────────────────────────────────────────────

pub struct OpenAiCompatibleEmbedder {
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": &self.model, "input": texts });
        let mut req = self.client.post(&url).json(&body);
        if let Some(k) = &self.api_key {
            req = req.bearer_auth(k);
        }
        let json = check_response_status(req.send().await?).await?;
        parse_openai_embeddings(&json, texts.len())
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    #[instrument(skip_all, fields(n = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(OPENAI_BATCH) {
            out.extend(self.embed_chunk(chunk).await?);
        }
        Ok(out)
    }

    fn model_id(&self) -> &str { &self.model }
}

// ── Response parsing ──────────────────────────────────────────────────────────

fn floats(values: &Value) -> Option<Vec<f32>> {
    values
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn check_count(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    if vectors.len() != expected {
        return Err(LlmError::Malformed(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )));
    }
    Ok(vectors)
}

/// `{"embeddings": [{"values": [...]}, ...]}`
fn parse_gemini_embeddings(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    let items = json["embeddings"]
        .as_array()
        .ok_or_else(|| LlmError::Malformed("missing `embeddings` array".to_string()))?;
    let vectors = items
        .iter()
        .map(|e| floats(&e["values"]).ok_or_else(|| LlmError::Malformed("non-numeric embedding".to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    check_count(vectors, expected)
}

/// `{"data": [{"index": 0, "embedding": [...]}, ...]}`, reordered by `index`.
fn parse_openai_embeddings(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    let items = json["data"]
        .as_array()
        .ok_or_else(|| LlmError::Malformed("missing `data` array".to_string()))?;
    let mut indexed = items
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let index = item["index"].as_u64().map_or(pos, |i| i as usize);
            floats(&item["embedding"])
                .map(|v| (index, v))
                .ok_or_else(|| LlmError::Malformed("non-numeric embedding".to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(i, _)| *i);
    check_count(indexed.into_iter().map(|(_, v)| v).collect(), expected)
}

// ── Offline fallback ──────────────────────────────────────────────────────────

pub const HASHED_DIM: usize = 512;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "in", "of", "to", "is", "was",
    "for", "on", "with", "this", "that", "are", "were", "be", "been",
    "by", "from", "we", "our", "their", "which", "also", "it", "as",
];

/// Lowercased alphanumeric tokens hashed with FNV-1a into `HASHED_DIM`
/// buckets and L2-normalised. Only shares vocabulary, not meaning.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedEmbedder;

impl HashedEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0f32; HASHED_DIM];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .map(str::to_lowercase)
            .filter(|t| !STOP_WORDS.contains(&t.as_str()));
        for token in tokens {
            let bucket = (fnv64(token.as_bytes()) % HASHED_DIM as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

fn fnv64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 14695981039346656037;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_id(&self) -> &str { "hashed-tf-512" }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Pick the embedding backend. A configured remote backend whose credentials
/// are missing degrades to hashed vectors with a warning.
pub fn select_embedder(config: &EmbeddingConfig, keys: &ApiKeys) -> Arc<dyn Embedder> {
    let gemini = || {
        keys.google
            .clone()
            .map(|key| Arc::new(GeminiEmbedder::new(key, &config.gemini_model)) as Arc<dyn Embedder>)
    };
    let openai = || {
        config.openai_base_url.as_ref().map(|base| {
            Arc::new(OpenAiCompatibleEmbedder::new(base, &config.openai_model, keys.embedding.clone()))
                as Arc<dyn Embedder>
        })
    };

    let chosen = match config.backend {
        EmbeddingBackendKind::Hashed => None,
        EmbeddingBackendKind::Gemini => {
            let e = gemini();
            if e.is_none() {
                warn!("Gemini embeddings requested but GOOGLE_API_KEY is not set");
            }
            e
        }
        EmbeddingBackendKind::OpenAi => {
            let e = openai();
            if e.is_none() {
                warn!("OpenAI-compatible embeddings requested but embedding.openai_base_url is not set");
            }
            e
        }
        EmbeddingBackendKind::Auto => gemini().or_else(openai),
    };

    let embedder = chosen.unwrap_or_else(|| {
        debug!("No embedding service configured");
        Arc::new(HashedEmbedder)
    });
    info!(model = embedder.model_id(), "Embedding backend selected");
    embedder
}

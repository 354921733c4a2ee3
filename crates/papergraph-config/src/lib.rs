//! Configuration loading for Papergraph.
//! Reads papergraph.toml from the current directory or the path in the
//! PAPERGRAPH_CONFIG env var. Secrets come from the environment only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder value shipped in `.env.example`; treated as an absent key.
const KEY_PLACEHOLDER: &str = "your-key-here";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Never read from or written to the TOML file.
    #[serde(skip)]
    pub keys: ApiKeys,
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// JSON snapshot of the content store; unset keeps it in memory only.
    #[serde(default = "default_store_path")]
    pub store_path: Option<PathBuf>,
    /// Empty list means permissive CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            store_path: default_store_path(),
            cors_origins: default_cors_origins(),
            log_filter: default_log_filter(),
        }
    }
}

fn default_bind()         -> String  { "0.0.0.0:8000".to_string() }
fn default_upload_dir()   -> PathBuf { PathBuf::from("data") }
fn default_store_path()   -> Option<PathBuf> { Some(PathBuf::from("data/papergraph-store.json")) }
fn default_cors_origins() -> Vec<String> { vec!["http://localhost:3000".to_string()] }
fn default_log_filter()   -> String  { "papergraph=debug,info".to_string() }

// ── LLM ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default = "default_groq_base_url")]
    pub groq_base_url: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            groq_model: default_groq_model(),
            groq_base_url: default_groq_base_url(),
            gemini_model: default_gemini_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_groq_model()    -> String { "llama-3.1-8b-instant".to_string() }
fn default_groq_base_url() -> String { "https://api.groq.com/openai".to_string() }
fn default_gemini_model()  -> String { "gemini-2.0-flash-lite".to_string() }
fn default_temperature()   -> f32    { 0.1 }
fn default_max_tokens()    -> u32    { 1024 }

// ── Retry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_extraction_retry")]
    pub extraction: RetrySettings,
    #[serde(default = "default_synthesis_retry")]
    pub synthesis: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            extraction: default_extraction_retry(),
            synthesis: default_synthesis_retry(),
        }
    }
}

/// Backoff parameters for one class of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
}

/// Longest delay accepted from a config file, one day.
const MAX_RETRY_DELAY_SECS: f64 = 86_400.0;

impl RetrySettings {
    /// Delays must be finite, non-negative and at most a day.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("base_delay_secs", self.base_delay_secs), ("max_delay_secs", self.max_delay_secs)] {
            if !value.is_finite() || !(0.0..=MAX_RETRY_DELAY_SECS).contains(&value) {
                return Err(format!("{name} must be within [0, {MAX_RETRY_DELAY_SECS}], got {value}"));
            }
        }
        Ok(())
    }
}

fn default_extraction_retry() -> RetrySettings {
    RetrySettings { max_retries: 3, base_delay_secs: 2.0, max_delay_secs: 60.0 }
}

fn default_synthesis_retry() -> RetrySettings {
    RetrySettings { max_retries: 5, base_delay_secs: 5.0, max_delay_secs: 60.0 }
}

// ── Graph ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_threshold")]
    pub batch_confidence_threshold: f64,
    #[serde(default = "default_threshold")]
    pub regenerate_confidence_threshold: f64,
    #[serde(default)]
    pub use_similarity: bool,
    #[serde(default = "default_similarity_k")]
    pub similarity_k: usize,
    /// 1 means pairs are synthesized one at a time.
    #[serde(default = "default_max_concurrent_pairs")]
    pub max_concurrent_pairs: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            batch_confidence_threshold: default_threshold(),
            regenerate_confidence_threshold: default_threshold(),
            use_similarity: false,
            similarity_k: default_similarity_k(),
            max_concurrent_pairs: default_max_concurrent_pairs(),
        }
    }
}

fn default_threshold()            -> f64   { 0.6 }
fn default_similarity_k()         -> usize { 5 }
fn default_max_concurrent_pairs() -> usize { 1 }

// ── Ingestion ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// LlamaParse when a key is present, otherwise local extraction.
    #[default]
    Auto,
    LlamaParse,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub converter: ConverterKind,
    #[serde(default = "default_llamaparse_base_url")]
    pub llamaparse_base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Characters of prepared paper text sent to the model.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            converter: ConverterKind::default(),
            llamaparse_base_url: default_llamaparse_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

fn default_llamaparse_base_url() -> String { "https://api.cloud.llamaindex.ai".to_string() }
fn default_poll_interval_ms()    -> u64    { 2000 }
fn default_poll_timeout_secs()   -> u64    { 300 }
fn default_max_text_chars()      -> usize  { 4000 }

// ── Embedding ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// Gemini with GOOGLE_API_KEY, else the OpenAI-compatible endpoint when
    /// `openai_base_url` is set, else hashed term vectors.
    #[default]
    Auto,
    Gemini,
    OpenAi,
    /// Offline hashed term-frequency vectors.
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackendKind,
    #[serde(default = "default_gemini_embedding_model")]
    pub gemini_model: String,
    /// Root of an OpenAI-compatible API; `/v1/embeddings` is appended.
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default = "default_openai_embedding_model")]
    pub openai_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::default(),
            gemini_model: default_gemini_embedding_model(),
            openai_base_url: None,
            openai_model: default_openai_embedding_model(),
        }
    }
}

fn default_gemini_embedding_model() -> String { "gemini-embedding-001".to_string() }
fn default_openai_embedding_model() -> String { "text-embedding-3-small".to_string() }

// ── Secrets ───────────────────────────────────────────────────────────────────

/// API keys pulled from the environment after `.env` is loaded.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub groq: Option<String>,
    pub google: Option<String>,
    pub llama_cloud: Option<String>,
    /// Bearer token for the OpenAI-compatible embedding endpoint.
    pub embedding: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("groq", &self.groq.as_ref().map(|_| "***"))
            .field("google", &self.google.as_ref().map(|_| "***"))
            .field("llama_cloud", &self.llama_cloud.as_ref().map(|_| "***"))
            .field("embedding", &self.embedding.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            groq: env_key("GROQ_API_KEY"),
            google: env_key("GOOGLE_API_KEY"),
            llama_cloud: env_key("LLAMA_CLOUD_API_KEY"),
            embedding: env_key("EMBEDDING_API_KEY"),
        }
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(usable_key)
}

fn usable_key(value: String) -> Option<String> {
    let value = value.trim().to_string();
    if value.is_empty() || value.contains(KEY_PLACEHOLDER) {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests;

impl Config {
    /// Load configuration from papergraph.toml.
    /// Checks PAPERGRAPH_CONFIG first, then the current directory. A missing
    /// file is not an error: every field has a default.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var("PAPERGRAPH_CONFIG")
            .unwrap_or_else(|_| "papergraph.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Config::default()
        };
        config.keys = ApiKeys::from_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("graph.batch_confidence_threshold", self.graph.batch_confidence_threshold),
            ("graph.regenerate_confidence_threshold", self.graph.regenerate_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 1], got {value}");
            }
        }
        for (name, retry) in [("retry.extraction", &self.retry.extraction), ("retry.synthesis", &self.retry.synthesis)] {
            retry.validate().map_err(|e| anyhow::anyhow!("{name}: {e}"))?;
        }
        if self.graph.max_concurrent_pairs == 0 {
            anyhow::bail!("graph.max_concurrent_pairs must be at least 1");
        }
        Ok(())
    }
}

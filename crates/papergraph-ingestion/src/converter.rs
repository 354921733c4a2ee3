//! PDF to Markdown conversion.
//!
//! Two converters ship with Papergraph: [`LlamaParseClient`] for the hosted
//! LlamaParse service (layout aware, emits real Markdown headers) and
//! [`LocalPdfConverter`], which pulls raw page text with lopdf and promotes
//! lines that look like canonical section titles to `##` headers.

use async_trait::async_trait;
use papergraph_config::{ApiKeys, ConverterKind, IngestionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("parser API error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("parse job {job_id} ended with status {status}")]
    JobFailed { job_id: String, status: String },

    #[error("parse job {job_id} did not finish within {secs}s")]
    Timeout { job_id: String, secs: u64 },

    #[error("no text could be extracted from {}", .0.display())]
    EmptyDocument(PathBuf),
}

/// Turns a PDF on disk into Markdown text.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<String, IngestionError>;

    fn name(&self) -> &str;
}

/// Pick a converter from configuration. `auto` prefers LlamaParse when a
/// usable key is present.
pub fn build_converter(cfg: &IngestionConfig, keys: &ApiKeys) -> Arc<dyn DocumentConverter> {
    let llama_key = keys.llama_cloud.clone();
    match (cfg.converter, llama_key) {
        (ConverterKind::Local, _) => Arc::new(LocalPdfConverter),
        (ConverterKind::Auto | ConverterKind::LlamaParse, Some(key)) => Arc::new(
            LlamaParseClient::new(key, &cfg.llamaparse_base_url).with_polling(
                Duration::from_millis(cfg.poll_interval_ms),
                Duration::from_secs(cfg.poll_timeout_secs),
            ),
        ),
        (ConverterKind::LlamaParse, None) => {
            warn!("LlamaParse requested but LLAMA_CLOUD_API_KEY is not set, using local PDF text extraction");
            Arc::new(LocalPdfConverter)
        }
        (ConverterKind::Auto, None) => {
            info!("No LlamaParse key, using local PDF text extraction");
            Arc::new(LocalPdfConverter)
        }
    }
}

// ── LlamaParse ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MarkdownResponse {
    markdown: String,
}

/// Client for the LlamaParse upload/poll/result API.
pub struct LlamaParseClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl LlamaParseClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.timeout = timeout;
        self
    }

    async fn upload(&self, path: &Path) -> Result<String, IngestionError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let upload: UploadResponse = json_or_remote_error(resp).await?;
        Ok(upload.id)
    }

    async fn wait_for(&self, job_id: &str) -> Result<(), IngestionError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let resp = self
                .client
                .get(format!("{}/api/parsing/job/{job_id}", self.base_url))
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            let status: JobStatusResponse = json_or_remote_error(resp).await?;
            match status.status.as_str() {
                "SUCCESS" => return Ok(()),
                "ERROR" | "CANCELED" => {
                    return Err(IngestionError::JobFailed {
                        job_id: job_id.to_string(),
                        status: status.status,
                    })
                }
                other => debug!(job_id, status = other, "Parse job still running"),
            }
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(IngestionError::Timeout {
                    job_id: job_id.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn markdown(&self, job_id: &str) -> Result<String, IngestionError> {
        let resp = self
            .client
            .get(format!("{}/api/parsing/job/{job_id}/result/markdown", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let result: MarkdownResponse = json_or_remote_error(resp).await?;
        Ok(result.markdown)
    }
}

async fn json_or_remote_error<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, IngestionError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(IngestionError::Remote { status: status.as_u16(), message });
    }
    Ok(resp.json().await?)
}

#[async_trait]
impl DocumentConverter for LlamaParseClient {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn convert(&self, path: &Path) -> Result<String, IngestionError> {
        let job_id = self.upload(path).await?;
        debug!(%job_id, "Uploaded to LlamaParse");
        self.wait_for(&job_id).await?;
        let markdown = self.markdown(&job_id).await?;
        if markdown.trim().is_empty() {
            return Err(IngestionError::EmptyDocument(path.to_path_buf()));
        }
        info!(%job_id, chars = markdown.len(), "LlamaParse conversion complete");
        Ok(markdown)
    }

    fn name(&self) -> &str { "llamaparse" }
}

// ── Local lopdf extraction ────────────────────────────────────────────────────

/// Offline converter built on lopdf's text extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPdfConverter;

#[async_trait]
impl DocumentConverter for LocalPdfConverter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn convert(&self, path: &Path) -> Result<String, IngestionError> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&owned))
            .await
            .map_err(|e| IngestionError::Pdf(format!("extraction task failed: {e}")))??;
        if text.trim().is_empty() {
            return Err(IngestionError::EmptyDocument(path.to_path_buf()));
        }
        Ok(promote_headings(&text))
    }

    fn name(&self) -> &str { "local" }
}

fn extract_pdf_text(path: &Path) -> Result<String, IngestionError> {
    let doc = lopdf::Document::load(path).map_err(|e| IngestionError::Pdf(e.to_string()))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(pages = pages.len(), "Extracting PDF text");
    doc.extract_text(&pages).map_err(|e| IngestionError::Pdf(e.to_string()))
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:(?:\d+(?:\.\d+)*|[ivx]+)\.?\s+)?(abstract|introduction|background|related work|methods?|methodology|materials and methods|approach|experiments?|experimental results|results|evaluation|discussion|conclusions?|limitations|future work|references|bibliography|acknowledge?ments)\s*:?$",
        )
        .expect("heading pattern is valid")
    })
}

/// Turn plain-text section titles ("3. Results", "REFERENCES") into `##`
/// Markdown headers so the classifier can see them.
pub fn promote_headings(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.len() <= 60 && heading_re().is_match(trimmed) {
            out.push_str("## ");
            out.push_str(trimmed);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_promote_headings() {
        let text = "A Study of Signals\n1. Introduction\nWe study lights.\nII. Methods\nThe results were good.\nREFERENCES\n[1] X";
        assert_eq!(
            promote_headings(text),
            "A Study of Signals\n## 1. Introduction\nWe study lights.\n## II. Methods\nThe results were good.\n## REFERENCES\n[1] X\n"
        );
    }

    #[test]
    fn test_long_lines_are_not_promoted() {
        let line = "Results ".repeat(10);
        assert_eq!(promote_headings(&line), format!("{line}\n"));
    }

    #[test]
    fn test_build_converter_respects_kind_and_key() {
        let mut cfg = IngestionConfig::default();
        let no_key = ApiKeys::default();
        let with_key = ApiKeys { llama_cloud: Some("llx-123".into()), ..ApiKeys::default() };

        assert_eq!(build_converter(&cfg, &no_key).name(), "local");
        assert_eq!(build_converter(&cfg, &with_key).name(), "llamaparse");

        cfg.converter = ConverterKind::Local;
        assert_eq!(build_converter(&cfg, &with_key).name(), "local");

        cfg.converter = ConverterKind::LlamaParse;
        assert_eq!(build_converter(&cfg, &no_key).name(), "local");
    }

    #[tokio::test]
    async fn test_local_converter_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = LocalPdfConverter.convert(&path).await.unwrap_err();
        assert!(matches!(err, IngestionError::Pdf(_)));
    }
}

//! Structured metadata extraction from paper text.

use std::sync::Arc;

use papergraph_common::{Mode, PaperMetadata, Section, SectionMap};
use papergraph_llm::{LlmBackend, LlmError, LlmRequest, RateLimitSignal, RetryObserver, RetryPolicy};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::json::{kind, parse_object, ObjectError};
use crate::prompts::PromptBundle;

/// Appended after the cut when paper text exceeds the character budget.
pub const TRUNCATION_MARKER: &str = "\n\n[Text truncated for processing...]";

/// Sections fed to extraction, in order.
const PRIORITY_SECTIONS: [Section; 4] = [
    Section::Abstract,
    Section::Methodology,
    Section::Results,
    Section::Introduction,
];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("completion failed: {0}")]
    Llm(#[from] LlmError),

    #[error("model returned invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        raw: String,
    },

    #[error("model output does not match the metadata schema: {0}")]
    Schema(String),

    #[error("no usable text to extract from")]
    EmptyText,
}

impl RateLimitSignal for ExtractionError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, ExtractionError::Llm(e) if e.is_rate_limited())
    }
}

/// Truncate to at most `max_chars` characters on a char boundary, marking
/// the cut. Applying it twice gives the same string.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Stitch the most informative sections into one extraction input.
///
/// Uses abstract, methodology, results and introduction as `## Title` blocks;
/// when none of them has text, every non-empty section is used instead.
pub fn prepare_paper_text(sections: &SectionMap) -> String {
    let block = |s: Section| format!("## {}\n{}", s.title(), sections.get(s));

    let mut parts: Vec<String> = PRIORITY_SECTIONS
        .iter()
        .filter(|s| !sections.get(**s).trim().is_empty())
        .map(|s| block(*s))
        .collect();

    if parts.is_empty() {
        debug!("No priority sections found, using all available sections");
        parts = sections.non_empty().map(|(s, _)| block(s)).collect();
    }
    parts.join("\n\n")
}

pub struct MetadataExtractor {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
    max_chars: usize,
    max_tokens: u32,
    temperature: f32,
}

impl MetadataExtractor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::extraction(),
            max_chars: 4000,
            max_tokens: 1024,
            temperature: 0.1,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    #[instrument(skip_all, fields(chars = paper_text.len(), mode = %mode))]
    pub async fn extract(
        &self,
        paper_text: &str,
        mode: Mode,
        observer: &dyn RetryObserver,
    ) -> Result<PaperMetadata, ExtractionError> {
        if paper_text.trim().is_empty() {
            return Err(ExtractionError::EmptyText);
        }
        let text = truncate_text(paper_text, self.max_chars);
        let prompt = PromptBundle::for_mode(mode).render_extraction(&text);

        let response = self
            .policy
            .execute(observer, || {
                let req = LlmRequest::prompt(prompt.clone())
                    .with_limits(self.max_tokens, self.temperature);
                async move { self.backend.complete(req).await.map_err(ExtractionError::from) }
            })
            .await?;

        parse_metadata(&response.content)
    }
}

/// Parse a reply into metadata. Missing, null or blank fields become the
/// sentinel; scalars are stringified and string arrays joined.
pub fn parse_metadata(raw: &str) -> Result<PaperMetadata, ExtractionError> {
    let map = parse_object(raw).map_err(|e| match e {
        ObjectError::Syntax(source) => ExtractionError::InvalidJson { source, raw: raw.to_string() },
        ObjectError::NotAnObject(k) => ExtractionError::Schema(format!("expected an object, got {k}")),
    })?;

    Ok(PaperMetadata::new(
        field(&map, "methodology")?,
        field(&map, "key_result")?,
        field(&map, "core_theory")?,
    ))
}

fn field(map: &Map<String, Value>, name: &str) -> Result<Option<String>, ExtractionError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(ExtractionError::Schema(format!(
                    "{name} contains a {} element", kind(other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| Some(parts.join("; "))),
        Some(Value::Object(_)) => Err(ExtractionError::Schema(format!("{name} is an object"))),
    }
}

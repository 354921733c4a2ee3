//! Pairwise relationship synthesis between two extracted papers.

use std::sync::Arc;

use papergraph_common::{Mode, PaperMetadata, RelationType, RelationshipResult};
use papergraph_llm::{LlmBackend, LlmError, LlmRequest, RateLimitSignal, RetryObserver, RetryPolicy};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::json::{kind, parse_object, ObjectError};
use crate::prompts::{MetadataFields, PromptBundle};

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_EXPLANATION: &str = "No explanation provided";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("completion failed: {0}")]
    Llm(#[from] LlmError),

    #[error("model returned invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("relation_type {0:?} is not one of Contradicts, Supports, Extends")]
    UnknownRelation(String),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("model output does not match the relationship schema: {0}")]
    Schema(String),
}

impl RateLimitSignal for SynthesisError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, SynthesisError::Llm(e) if e.is_rate_limited())
    }
}

pub struct RelationshipSynthesizer {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
    max_tokens: u32,
    temperature: f32,
}

impl RelationshipSynthesizer {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::synthesis(),
            max_tokens: 1024,
            temperature: 0.1,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// How paper B relates to paper A.
    #[instrument(skip_all, fields(mode = %mode))]
    pub async fn synthesize(
        &self,
        a: &PaperMetadata,
        b: &PaperMetadata,
        mode: Mode,
        observer: &dyn RetryObserver,
    ) -> Result<RelationshipResult, SynthesisError> {
        let prompt = PromptBundle::for_mode(mode)
            .render_synthesis(&MetadataFields::from(a), &MetadataFields::from(b));

        let response = self
            .policy
            .execute(observer, || {
                let req = LlmRequest::prompt(prompt.clone())
                    .with_limits(self.max_tokens, self.temperature);
                async move { self.backend.complete(req).await.map_err(SynthesisError::from) }
            })
            .await?;

        parse_relationship(&response.content)
    }
}

pub fn parse_relationship(raw: &str) -> Result<RelationshipResult, SynthesisError> {
    let map = parse_object(raw).map_err(|e| match e {
        ObjectError::Syntax(err) => SynthesisError::InvalidJson(err),
        ObjectError::NotAnObject(k) => SynthesisError::Schema(format!("expected an object, got {k}")),
    })?;

    let relation_type = match map.get("relation_type") {
        Some(Value::String(tag)) => tag
            .parse::<RelationType>()
            .map_err(|_| SynthesisError::UnknownRelation(tag.clone()))?,
        Some(other) => {
            return Err(SynthesisError::Schema(format!("relation_type is a {}", kind(other))))
        }
        None => return Err(SynthesisError::Schema("relation_type is missing".to_string())),
    };

    let confidence = match map.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| SynthesisError::Schema(format!("confidence {n} is not a float")))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| SynthesisError::Schema(format!("confidence {s:?} is not a number")))?,
        Some(other) => {
            return Err(SynthesisError::Schema(format!("confidence is a {}", kind(other))))
        }
    };
    if !(0.0..=1.0).contains(&confidence) {
        return Err(SynthesisError::ConfidenceOutOfRange(confidence));
    }

    let explanation = match map.get("explanation") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        None | Some(Value::Null) | Some(Value::String(_)) => DEFAULT_EXPLANATION.to_string(),
        Some(other) => {
            return Err(SynthesisError::Schema(format!("explanation is a {}", kind(other))))
        }
    };

    Ok(RelationshipResult { relation_type, confidence, explanation })
}

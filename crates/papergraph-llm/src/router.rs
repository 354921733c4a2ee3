//! Backend selection: Groq when its key is present, otherwise Gemini.

use std::sync::Arc;

use papergraph_config::{ApiKeys, LlmConfig};

use crate::backend::{GeminiBackend, LlmBackend, LlmError, OpenAiCompatibleBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Groq,
    Gemini,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Groq   => "groq",
            BackendKind::Gemini => "gemini",
        }
    }

    /// First backend whose key is configured, in preference order.
    pub fn preferred(keys: &ApiKeys) -> Option<Self> {
        if keys.groq.is_some() {
            Some(BackendKind::Groq)
        } else if keys.google.is_some() {
            Some(BackendKind::Gemini)
        } else {
            None
        }
    }
}

pub fn select_backend(
    config: &LlmConfig,
    keys: &ApiKeys,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let kind = BackendKind::preferred(keys).ok_or_else(|| {
        LlmError::Unavailable(
            "neither GROQ_API_KEY nor GOOGLE_API_KEY is set".to_string()
        )
    })?;

    let backend: Arc<dyn LlmBackend> = match kind {
        BackendKind::Groq => Arc::new(OpenAiCompatibleBackend::new(
            &config.groq_base_url,
            &config.groq_model,
            keys.groq.clone(),
        )),
        BackendKind::Gemini => {
            tracing::warn!("GROQ_API_KEY is missing, using Gemini for LLM tasks");
            let key = keys.google.clone().unwrap_or_default();
            Arc::new(GeminiBackend::new(key, &config.gemini_model))
        }
    };

    tracing::info!(backend = kind.as_str(), model = backend.model_id(), "LLM backend selected");
    Ok(backend)
}

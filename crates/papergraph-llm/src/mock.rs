//! Scripted backend for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

type Responder = Box<dyn Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync>;

/// Replays queued replies, then falls back to a responder function.
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()), responder: None, prompts: Mutex::new(Vec::new()) }
    }

    /// Every call is answered by `f`, which sees the request.
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self { responder: Some(Box::new(f)), ..Self::new() }
    }

    pub fn push_reply(self, content: impl Into<String>) -> Self {
        self.lock_queue().push_back(Ok(content.into()));
        self
    }

    pub fn push_error(self, err: LlmError) -> Self {
        self.lock_queue().push_back(Err(err));
        self
    }

    /// Prompts received so far, last user message of each request.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let prompt = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt);
        }
        let next = self.lock_queue().pop_front();
        let content = match (next, &self.responder) {
            (Some(reply), _) => reply?,
            (None, Some(f)) => f(&req)?,
            (None, None) => return Err(LlmError::Unavailable("script exhausted".to_string())),
        };
        Ok(LlmResponse { content, model: "scripted".to_string(), prompt_tokens: 0, completion_tokens: 0 })
    }

    fn model_id(&self) -> &str { "scripted" }
}

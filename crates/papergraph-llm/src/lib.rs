//! papergraph-llm: completion and embedding backends, rate-limit aware retries.

pub mod backend;
pub mod embedding;
pub mod retry;
pub mod router;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::{GeminiBackend, LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiCompatibleBackend};
pub use embedding::{select_embedder, Embedder, GeminiEmbedder, HashedEmbedder, OpenAiCompatibleEmbedder};
pub use retry::{is_rate_limit_message, NoopObserver, RateLimitSignal, RetryObserver, RetryPolicy};
pub use router::{select_backend, BackendKind};

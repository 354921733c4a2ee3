//! papergraph-kg: metadata extraction, relationship synthesis and graph
//! assembly over extracted papers.

pub mod extraction;
pub mod graph;
pub mod json;
pub mod prompts;
pub mod synthesis;

pub use extraction::{prepare_paper_text, truncate_text, ExtractionError, MetadataExtractor, TRUNCATION_MARKER};
pub use graph::{GraphBuilder, GraphOptions};
pub use prompts::PromptBundle;
pub use synthesis::{RelationshipSynthesizer, SynthesisError};

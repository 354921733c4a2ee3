//! papergraph-ingestion: PDF intake, section classification and the job
//! workflows that turn uploads into a relationship graph.
//!
//! Flow for one batch:
//!   1. Uploads are content-hashed and written once to the upload directory
//!   2. A [`DocumentConverter`] turns each PDF into Markdown
//!   3. [`classify`] partitions the Markdown into semantic sections
//!   4. Metadata is extracted and persisted to the content store
//!   5. The relationship graph is built and stored on the job

pub mod chunker;
pub mod converter;
pub mod dedup;
pub mod jobs;
pub mod pipeline;

pub use chunker::{classify, section_summary};
pub use converter::{
    build_converter, DocumentConverter, IngestionError, LlamaParseClient, LocalPdfConverter,
};
pub use dedup::{content_hash, is_pdf_filename, stored_filename};
pub use jobs::{Job, JobEvent, JobHandle, JobKind, JobStatus, JobStore};
pub use pipeline::{BatchFile, BatchRequest, Orchestrator, RegenerateRequest};

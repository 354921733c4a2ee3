//! Papergraph content store.
//!
//! Papers are stored with their prepared text and extracted metadata, one
//! namespace per audience mode. Similarity search runs over vectors from an
//! [`Embedder`](papergraph_llm::Embedder); the default is the offline hashed
//! embedder so no embedding service is needed.
//!
//! # Example
//!
//! ```rust,no_run
//! use papergraph_common::Mode;
//! use papergraph_db::{ContentStore, MemoryStore, Namespace, RecordMetadata};
//!
//! # async fn run() -> papergraph_db::Result<()> {
//! let store = MemoryStore::new();
//! let ns = Namespace::from(Mode::Student);
//! store.store("abc", "text", RecordMetadata::default(), &ns).await?;
//! let _hits = store.query_similar("text", 5, &ns).await?;
//! # Ok(()) }
//! ```

pub mod error;
pub mod memory;
pub mod schema;
pub mod store;
pub mod vector;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use schema::{Namespace, PaperRecord, RecordMetadata, SimilarPaper};
pub use store::ContentStore;

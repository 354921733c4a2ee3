//! papergraph-common: Shared types and errors used across all Papergraph crates.

pub mod error;
pub mod mode;
pub mod models;

// Re-export commonly used types
pub use error::PapergraphError;
pub use mode::Mode;
pub use models::{
    Graph, GraphEdge, GraphNode, Paper, PaperMetadata, RelationType, RelationshipResult,
    Section, SectionMap, NOT_SPECIFIED,
};

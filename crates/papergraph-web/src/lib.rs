//! papergraph-web: HTTP API for Papergraph.
//! Provides:
//!   - PDF batch upload and background processing
//!   - Job status polling and a live SSE job feed
//!   - Graph regeneration from stored papers
//!   - Similarity search and paper deletion
//!   - Graph building for the offline batch binary

pub mod error;
pub mod handlers;
pub mod offline;
pub mod router;
pub mod sse;
pub mod state;

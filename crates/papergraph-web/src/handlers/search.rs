//! Similarity search over stored papers.

use axum::extract::{Query, State};
use axum::Json;
use papergraph_common::Mode;
use papergraph_db::Namespace;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub mode: Mode,
}

fn default_limit() -> usize { 5 }

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub paper_id: String,
    pub excerpt: String,
    /// Distance, lower is closer.
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// GET /search?query=..&limit=5&mode=student
pub async fn search_papers(
    State(state): State<SharedState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let hits = state
        .store()
        .query_similar(&q.query, q.limit, &Namespace::from(q.mode))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Search failed");
            ApiError::Internal("Search engine error".to_string())
        })?;

    let results = hits
        .into_iter()
        .map(|hit| SearchHit {
            excerpt: format!("{}...", hit.document.chars().take(EXCERPT_CHARS).collect::<String>()),
            paper_id: hit.id,
            score: hit.distance,
        })
        .collect();
    Ok(Json(SearchResponse { results }))
}

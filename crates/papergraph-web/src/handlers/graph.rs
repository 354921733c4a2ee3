//! Graph regeneration from stored papers.

use axum::extract::State;
use axum::Json;
use papergraph_ingestion::RegenerateRequest;
use tracing::info;

use crate::error::ApiResult;
use crate::handlers::{check_threshold, JobAccepted};
use crate::state::SharedState;

/// POST /graph
pub async fn make_graph(
    State(state): State<SharedState>,
    Json(req): Json<RegenerateRequest>,
) -> ApiResult<Json<JobAccepted>> {
    check_threshold(req.confidence_threshold)?;
    info!(
        mode = %req.mode,
        papers = req.paper_ids.as_ref().map_or(0, Vec::len),
        "Graph regeneration requested"
    );
    let job_id = state.orchestrator.submit_regenerate(req).await;
    Ok(Json(JobAccepted::queued(job_id, "Graph regeneration started.")))
}

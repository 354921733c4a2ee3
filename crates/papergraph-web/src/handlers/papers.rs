//! Stored paper management.

use axum::extract::{Path, Query, State};
use axum::Json;
use papergraph_common::Mode;
use papergraph_db::Namespace;
use papergraph_ingestion::dedup::normalize_id;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ModeQuery {
    #[serde(default)]
    pub mode: Mode,
}

/// DELETE /papers/{id}?mode=student
pub async fn delete_paper(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(q): Query<ModeQuery>,
) -> ApiResult<Json<Value>> {
    let id = normalize_id(&id);
    let removed = state
        .store()
        .delete(id, &Namespace::from(q.mode))
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to delete paper: {e}")))?;
    if !removed {
        return Err(ApiError::NotFound("Paper not found".to_string()));
    }
    Ok(Json(json!({ "deleted": id, "mode": q.mode })))
}

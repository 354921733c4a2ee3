//! Batch upload and job status.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use papergraph_common::Mode;
use papergraph_ingestion::dedup::{is_pdf_filename, save_upload, stored_path};
use papergraph_ingestion::{BatchFile, BatchRequest, Job};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{check_threshold, JobAccepted};
use crate::state::SharedState;

/// POST /process-batch: multipart `files` plus `user_type` and an optional
/// `confidence_threshold`.
///
/// Non-PDF parts are skipped. Each PDF is saved under its content hash
/// before the job starts.
pub async fn process_batch(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<JobAccepted>> {
    let upload_dir = state.orchestrator.upload_dir().to_path_buf();
    let mut files = Vec::new();
    let mut mode = Mode::default();
    let mut threshold = None;

    while let Some(field) = multipart.next_field().await? {
        let part = field.name().map(str::to_string);
        match part.as_deref() {
            Some("user_type") => mode = Mode::from_form_value(&field.text().await?),
            Some("files" | "files[]") => {
                let Some(name) = field.file_name().map(str::to_string) else { continue };
                if !is_pdf_filename(&name) {
                    debug!(file = %name, "Skipping non-PDF upload");
                    continue;
                }
                let bytes = field.bytes().await?;
                let (id, _) = save_upload(&upload_dir, &bytes)
                    .await
                    .map_err(|e| ApiError::Internal(format!("Failed to save upload: {e}")))?;
                let path = stored_path(&upload_dir, &id);
                files.push(BatchFile { id, original_name: name, path });
            }
            Some("confidence_threshold") => {
                let raw = field.text().await?;
                let value = raw.trim().parse::<f64>().map_err(|_| {
                    ApiError::BadRequest(format!("confidence_threshold {raw:?} is not a number"))
                })?;
                threshold = check_threshold(Some(value))?;
            }
            Some(other) => debug!(field = %other, "Ignoring unknown form field"),
            None => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No valid PDF files uploaded.".to_string()));
    }

    info!(files = files.len(), %mode, ?threshold, "Batch accepted");
    let job_id = state
        .orchestrator
        .submit_batch(BatchRequest { files, mode, confidence_threshold: threshold })
        .await;
    Ok(Json(JobAccepted::queued(job_id, "Batch processing started.")))
}

/// GET /batch-status/{job_id}
pub async fn batch_status(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let not_found = || ApiError::NotFound("Job not found".to_string());
    let id = Uuid::parse_str(&job_id).map_err(|_| not_found())?;
    state.jobs().get(&id).await.map(Json).ok_or_else(not_found)
}

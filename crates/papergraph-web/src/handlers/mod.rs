//! HTTP handlers for all API routes.

pub mod batch;
pub mod graph;
pub mod papers;
pub mod search;
pub mod system;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Reply for endpoints that start a background job.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: &'static str,
    pub message: &'static str,
}

impl JobAccepted {
    pub fn queued(job_id: Uuid, message: &'static str) -> Self {
        Self { job_id, status: "queued", message }
    }
}

/// Reject a per-request confidence threshold outside `[0, 1]`.
pub fn check_threshold(threshold: Option<f64>) -> Result<Option<f64>, ApiError> {
    match threshold {
        Some(t) if !(0.0..=1.0).contains(&t) => {
            Err(ApiError::BadRequest(format!("confidence_threshold {t} is outside [0, 1]")))
        }
        other => Ok(other),
    }
}

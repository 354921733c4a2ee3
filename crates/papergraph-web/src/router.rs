//! Axum router: maps all URL paths to handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    batch::{batch_status, process_batch},
    graph::make_graph,
    papers::delete_paper,
    search::search_papers,
    system::{health, root},
};
use crate::sse::sse_handler;
use crate::state::{AppState, SharedState};

/// Uploads are whole PDFs; allow well past axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/",                      get(root))
        .route("/health",                get(health))
        .route("/process-batch",         post(process_batch))
        .route("/batch-status/{job_id}", get(batch_status))
        .route("/graph",                 post(make_graph))
        .route("/search",                get(search_papers))
        .route("/papers/{id}",           delete(delete_paper))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // Middleware
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(shared)
}

/// Configured origins, or permissive when none are listed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use papergraph_common::{Mode, PaperMetadata};
use papergraph_config::Config;
use papergraph_db::{ContentStore, MemoryStore, Namespace, RecordMetadata};
use papergraph_ingestion::{DocumentConverter, IngestionError, JobStore, Orchestrator};
use papergraph_llm::mock::ScriptedBackend;
use papergraph_web::router::build_router;
use papergraph_web::state::AppState;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "papergraph-test-boundary";

struct TextConverter;

#[async_trait]
impl DocumentConverter for TextConverter {
    async fn convert(&self, path: &Path) -> Result<String, IngestionError> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
    fn name(&self) -> &str { "text" }
}

struct TestApp {
    _dir: tempfile::TempDir,
    router: Router,
    store: Arc<MemoryStore>,
}

fn app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.upload_dir = dir.path().to_path_buf();
    config.server.store_path = None;

    let backend = Arc::new(ScriptedBackend::with_responder(|req| {
        let prompt = req.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(if prompt.contains("Knowledge Tree") {
            r#"{"relation_type": "Supports", "confidence": 0.9, "explanation": "B defines a concept used in A"}"#
        } else {
            r#"{"methodology": "Survey", "key_result": "Signals", "core_theory": "Queues"}"#
        }
        .to_string())
    }));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(&config, JobStore::new(), backend, store.clone(), Arc::new(TextConverter));
    let router = build_router(AppState::new(config, orchestrator));
    TestApp { _dir: dir, router, store }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match filename {
            Some(f) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )),
            None => body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Request::builder()
        .method("POST")
        .uri("/process-batch")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn wait_for_job(router: &Router, job_id: &str) -> Value {
    for _ in 0..500 {
        let (_, job) = send(router, get(&format!("/batch-status/{job_id}"))).await;
        if job["status"] == "completed" || job["status"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn test_root_and_health() {
    let t = app();
    let (status, body) = send(&t.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Research Paper Navigator API");

    let (_, body) = send(&t.router, get("/health")).await;
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let t = app();
    for uri in ["/batch-status/not-a-uuid", "/batch-status/6f1c1f6e-8a53-4b55-9d0e-3f2b6c2f2a10"] {
        let (status, body) = send(&t.router, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Job not found");
    }
}

#[tokio::test]
async fn test_upload_without_pdfs_is_rejected() {
    let t = app();
    let req = multipart(&[("user_type", None, "student"), ("files", Some("notes.txt"), "hello")]);
    let (status, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No valid PDF files uploaded.");
}

#[tokio::test]
async fn test_batch_upload_runs_to_completion() {
    let t = app();
    let req = multipart(&[
        ("user_type", None, "researcher"),
        ("files", Some("A.pdf"), "Paper A\n## Abstract\nOptimization theory.\n"),
        ("files", Some("B.pdf"), "Paper B\n## Abstract\nTraffic control.\n"),
        ("files", Some("skip.txt"), "ignored"),
    ]);
    let (status, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["message"], "Batch processing started.");

    let job = wait_for_job(&t.router, body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["total_files"], 2);
    assert_eq!(job["result"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(job["result"]["edges"][0]["data"]["relation_type"], "Supports");
    assert_eq!(job["result"]["nodes"][0]["data"]["label"], "A.pdf");

    assert_eq!(t.store.len(&Namespace::from(Mode::Researcher)).await, 2);
}

#[tokio::test]
async fn test_batch_threshold_from_form_filters_edges() {
    let t = app();
    let req = multipart(&[
        ("user_type", None, "student"),
        ("confidence_threshold", None, "0.95"),
        ("files", Some("A.pdf"), "Paper A\n## Abstract\nOptimization theory.\n"),
        ("files", Some("B.pdf"), "Paper B\n## Abstract\nTraffic control.\n"),
    ]);
    let (status, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let job = wait_for_job(&t.router, body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result"]["nodes"].as_array().unwrap().len(), 2);
    assert!(job["result"]["edges"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_threshold_out_of_range_is_rejected() {
    let t = app();
    for value in ["1.5", "high"] {
        let req = multipart(&[
            ("confidence_threshold", None, value),
            ("files", Some("A.pdf"), "Paper A"),
        ]);
        let (status, body) = send(&t.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("confidence_threshold"));
    }
}

#[tokio::test]
async fn test_graph_regeneration_is_queued() {
    let t = app();
    let req = Request::builder()
        .method("POST")
        .uri("/graph")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"mode": "student", "paper_ids": []}"#))
        .unwrap();
    let (status, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Graph regeneration started.");

    let job = wait_for_job(&t.router, body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result"]["nodes"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_search_returns_excerpts() {
    let t = app();
    let ns = Namespace::from(Mode::Student);
    let long = format!("traffic signal control {}", "x".repeat(300));
    t.store.store("p1", &long, RecordMetadata::new(PaperMetadata::default(), None), &ns).await.unwrap();

    let (status, body) = send(&t.router, get("/search?query=traffic%20signal&limit=3")).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["paper_id"], "p1");
    let excerpt = results[0]["excerpt"].as_str().unwrap();
    assert_eq!(excerpt.chars().count(), 203);
    assert!(excerpt.ends_with("..."));
}

#[tokio::test]
async fn test_delete_paper() {
    let t = app();
    let ns = Namespace::from(Mode::Student);
    t.store.store("p1", "text", RecordMetadata::default(), &ns).await.unwrap();

    let delete = |uri: &str| Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap();
    let (status, _) = send(&t.router, delete("/papers/p1.pdf?mode=student")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&t.router, delete("/papers/p1?mode=student")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Paper not found");
}

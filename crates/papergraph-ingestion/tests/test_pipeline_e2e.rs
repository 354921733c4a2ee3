//! End-to-end batch pipeline against a scripted model and an in-memory store.
//!
//! Uploads are Markdown fixtures; the fixture converter reads them back as
//! text so the classifier, extractor, store and graph builder all run for real.

use async_trait::async_trait;
use papergraph_common::{Mode, RelationType};
use papergraph_config::Config;
use papergraph_db::{ContentStore, MemoryStore, Namespace};
use papergraph_ingestion::dedup::save_upload;
use papergraph_ingestion::{
    BatchFile, BatchRequest, DocumentConverter, IngestionError, JobEvent, JobStatus, JobStore,
    Orchestrator,
};
use papergraph_llm::mock::ScriptedBackend;
use papergraph_llm::LlmError;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const PAPER_A: &str = "Paper A\n## Abstract\nThis paper introduces optimization theory for scheduling.\n## Methods\nConvex analysis.\n";
const PAPER_B: &str = "Paper B\n## Abstract\nThis paper applies it to traffic control at intersections.\n## Evaluation\nDelay drops.\n";

struct FixtureConverter;

#[async_trait]
impl DocumentConverter for FixtureConverter {
    async fn convert(&self, path: &Path) -> Result<String, IngestionError> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
    fn name(&self) -> &str { "fixture" }
}

fn scripted_model() -> ScriptedBackend {
    ScriptedBackend::with_responder(|req| {
        let prompt = req.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let reply = if prompt.contains("Knowledge Tree") {
            r#"{"relation_type": "Extends", "confidence": 0.8, "explanation": "B applies the theory of A"}"#
        } else if prompt.contains("introduces optimization theory") {
            r#"{"methodology": "Convex analysis", "key_result": "introduces optimization theory", "core_theory": "Optimization"}"#
        } else {
            r#"{"methodology": "Field study", "key_result": "applies it to traffic control", "core_theory": "Optimization"}"#
        };
        Ok::<_, LlmError>(reply.to_string())
    })
}

fn extraction_calls(backend: &ScriptedBackend) -> usize {
    backend
        .prompts()
        .iter()
        .filter(|p| p.contains("Extract the educational value"))
        .count()
}

struct Harness {
    _dir: tempfile::TempDir,
    orch: Orchestrator,
    backend: Arc<ScriptedBackend>,
    store: Arc<MemoryStore>,
    events: broadcast::Receiver<JobEvent>,
}

fn harness(backend: ScriptedBackend) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.upload_dir = dir.path().to_path_buf();

    let backend = Arc::new(backend);
    let store = Arc::new(MemoryStore::new());
    let jobs = JobStore::new();
    let events = jobs.subscribe();
    let orch = Orchestrator::new(&config, jobs, backend.clone(), store.clone(), Arc::new(FixtureConverter));
    Harness { _dir: dir, orch, backend, store, events }
}

impl Harness {
    async fn upload(&self, name: &str, body: &str) -> BatchFile {
        let (id, _) = save_upload(self.orch.upload_dir(), body.as_bytes()).await.unwrap();
        let path = papergraph_ingestion::dedup::stored_path(self.orch.upload_dir(), &id);
        BatchFile { id, original_name: name.to_string(), path }
    }

    /// Collect events for `id` until it completes or fails.
    async fn drain(&mut self, id: Uuid) -> Vec<JobEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.events.recv().await.unwrap();
            let done = matches!(
                &event,
                JobEvent::Completed { job_id, .. } | JobEvent::Failed { job_id, .. } if *job_id == id
            );
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

#[tokio::test]
async fn test_two_papers_make_one_extends_edge() {
    let mut h = harness(scripted_model());
    let a = h.upload("A.pdf", PAPER_A).await;
    let b = h.upload("B.pdf", PAPER_B).await;
    let (a_id, b_id) = (a.id.clone(), b.id.clone());

    let job_id = h
        .orch
        .submit_batch(BatchRequest { files: vec![a, b], mode: Mode::Student, confidence_threshold: Some(0.5) })
        .await;
    h.drain(job_id).await;

    let job = h.orch.jobs().get(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    let graph = job.result.unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.nodes[0].data.label, "A.pdf");
    assert_eq!(graph.edges.len(), 1);

    let edge = &graph.edges[0];
    assert_eq!(edge.source, a_id);
    assert_eq!(edge.target, b_id);
    assert_eq!(edge.id, format!("{a_id}->{b_id}"));
    assert_eq!(edge.data.relation_type, RelationType::Extends);
    assert_eq!(edge.data.confidence, 0.8);

    let stored = h.store.get_all(&Namespace::from(Mode::Student)).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].metadata.original_filename.as_deref(), Some("A.pdf"));
    assert!(h.store.get_all(&Namespace::from(Mode::Researcher)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_content_is_extracted_once() {
    let mut h = harness(scripted_model());
    let first = h.upload("A.pdf", PAPER_A).await;
    let again = h.upload("A (copy).pdf", PAPER_A).await;
    assert_eq!(first.id, again.id);

    let job_id = h
        .orch
        .submit_batch(BatchRequest { files: vec![first.clone(), again], mode: Mode::Student, confidence_threshold: None })
        .await;
    h.drain(job_id).await;
    assert_eq!(extraction_calls(&h.backend), 1);

    let job_id = h
        .orch
        .submit_batch(BatchRequest { files: vec![first], mode: Mode::Student, confidence_threshold: None })
        .await;
    h.drain(job_id).await;
    assert_eq!(extraction_calls(&h.backend), 1);

    let job = h.orch.jobs().get(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.unwrap().nodes.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_surfaces_on_job() {
    let backend = scripted_model().push_error(LlmError::RateLimitExceeded("429 Too Many Requests".into()));
    let mut h = harness(backend);
    let a = h.upload("A.pdf", PAPER_A).await;

    let job_id = h
        .orch
        .submit_batch(BatchRequest { files: vec![a], mode: Mode::Student, confidence_threshold: None })
        .await;
    let statuses: Vec<JobStatus> = h
        .drain(job_id)
        .await
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::Progress { status, .. } => Some(status),
            _ => None,
        })
        .collect();

    let limited = statuses.iter().position(|s| *s == JobStatus::Ratelimit).unwrap();
    assert_eq!(statuses[limited + 1], JobStatus::Processing);
    assert_eq!(extraction_calls(&h.backend), 2);
    assert_eq!(h.orch.jobs().get(&job_id).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_unreadable_uploads_fail_the_job() {
    let mut h = harness(scripted_model());
    let ghost = BatchFile {
        id: "missing".into(),
        original_name: "ghost.pdf".into(),
        path: h.orch.upload_dir().join("missing.pdf"),
    };

    let job_id = h
        .orch
        .submit_batch(BatchRequest { files: vec![ghost], mode: Mode::Researcher, confidence_threshold: None })
        .await;
    h.drain(job_id).await;

    let job = h.orch.jobs().get(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("No valid PDF files could be processed."));
    assert_eq!(h.backend.calls(), 0);
}

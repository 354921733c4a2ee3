//! Batch ingestion and graph regeneration workflows.
//!
//! Both workflows run on a spawned task that owns the job's [`JobHandle`]:
//!   1. Resolve papers (reuse stored metadata, or convert → classify → extract)
//!   2. Persist newly extracted papers to the content store
//!   3. Build the relationship graph and attach it to the job
//!
//! Per-paper failures are logged and the paper is left out. Anything that
//! escapes a workflow, a panic included, marks the job `failed`.

use anyhow::{anyhow, Context};
use futures::FutureExt;
use papergraph_common::{Graph, Mode, Paper};
use papergraph_config::{Config, GraphConfig};
use papergraph_db::{ContentStore, Namespace, PaperRecord, RecordMetadata};
use papergraph_kg::{
    prepare_paper_text, truncate_text, GraphBuilder, GraphOptions, MetadataExtractor,
    RelationshipSynthesizer,
};
use papergraph_llm::{LlmBackend, RetryObserver, RetryPolicy};
use serde::Deserialize;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::chunker::classify;
use crate::converter::DocumentConverter;
use crate::dedup::{normalize_id, stored_path};
use crate::jobs::{JobHandle, JobKind, JobStore};

pub const NO_VALID_PDFS: &str = "No valid PDF files could be processed.";
const STEP_FETCHING: &str = "Fetching papers...";
const STEP_BUILDING: &str = "Building Graph...";

/// An upload already saved under its content hash.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub id: String,
    pub original_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub files: Vec<BatchFile>,
    pub mode: Mode,
    pub confidence_threshold: Option<f64>,
}

/// Rebuild a graph from stored papers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub mode: Mode,
    /// Papers to include; all papers in the mode's namespace when absent.
    #[serde(default)]
    pub paper_ids: Option<Vec<String>>,
    /// Display names keyed by paper id.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub use_similarity: Option<bool>,
}

/// Owns the collaborators a job needs and spawns one task per job.
#[derive(Clone)]
pub struct Orchestrator {
    jobs: JobStore,
    store: Arc<dyn ContentStore>,
    converter: Arc<dyn DocumentConverter>,
    extractor: Arc<MetadataExtractor>,
    graph: Arc<GraphBuilder>,
    graph_cfg: GraphConfig,
    upload_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        jobs: JobStore,
        backend: Arc<dyn LlmBackend>,
        store: Arc<dyn ContentStore>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        let extractor = MetadataExtractor::new(backend.clone())
            .with_policy(RetryPolicy::from(&config.retry.extraction))
            .with_max_chars(config.ingestion.max_text_chars)
            .with_generation(config.llm.max_tokens, config.llm.temperature);
        let synthesizer = RelationshipSynthesizer::new(backend)
            .with_policy(RetryPolicy::from(&config.retry.synthesis))
            .with_generation(config.llm.max_tokens, config.llm.temperature);
        let graph = GraphBuilder::new(Arc::new(synthesizer), store.clone());

        Self {
            jobs,
            store,
            converter,
            extractor: Arc::new(extractor),
            graph: Arc::new(graph),
            graph_cfg: config.graph.clone(),
            upload_dir: config.server.upload_dir.clone(),
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Queue a batch job and start it in the background.
    pub async fn submit_batch(&self, req: BatchRequest) -> Uuid {
        let handle = self.jobs.create(JobKind::Batch, Some(req.files.len())).await;
        let id = handle.id();
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = supervised(this.run_batch(&handle, req)).await;
            finish(&handle, outcome).await;
        });
        id
    }

    /// Queue a graph regeneration job and start it in the background.
    pub async fn submit_regenerate(&self, req: RegenerateRequest) -> Uuid {
        let handle = self.jobs.create(JobKind::Graph, None).await;
        let id = handle.id();
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = supervised(this.run_regenerate(&handle, req)).await;
            finish(&handle, outcome).await;
        });
        id
    }

    #[instrument(skip_all, fields(job_id = %handle.id(), files = req.files.len(), mode = %req.mode))]
    pub async fn run_batch(&self, handle: &JobHandle, req: BatchRequest) -> anyhow::Result<Graph> {
        let namespace = Namespace::from(req.mode);
        let total = req.files.len().max(1);
        let mut papers = Vec::with_capacity(req.files.len());
        info!("Batch started");

        for (i, file) in req.files.iter().enumerate() {
            handle.advance((i * 80 / total) as u8, &file.original_name).await;

            if let Some(record) = self.lookup(&file.id, &namespace).await {
                info!(paper_id = %file.id, name = %file.original_name, "Paper already stored, skipping extraction");
                papers.push(
                    Paper::new(&file.id)
                        .with_display_name(&file.original_name)
                        .with_file_path(&file.path)
                        .with_metadata(record.metadata.paper),
                );
                continue;
            }

            match self
                .ingest_file(&file.id, &file.path, Some(&file.original_name), req.mode, handle)
                .await
            {
                Ok(paper) => papers.push(paper),
                Err(e) => warn!(paper_id = %file.id, name = %file.original_name, error = %format!("{e:#}"), "Failed to process paper"),
            }
        }

        if papers.is_empty() {
            return Err(anyhow!(NO_VALID_PDFS));
        }

        handle.advance(90, STEP_BUILDING).await;
        let threshold = req
            .confidence_threshold
            .unwrap_or(self.graph_cfg.batch_confidence_threshold);
        let opts = GraphOptions::from_config(&self.graph_cfg, threshold);
        Ok(self.graph.build(&papers, req.mode, &opts, handle).await)
    }

    #[instrument(skip_all, fields(job_id = %handle.id(), mode = %req.mode))]
    pub async fn run_regenerate(
        &self,
        handle: &JobHandle,
        req: RegenerateRequest,
    ) -> anyhow::Result<Graph> {
        handle.advance(10, STEP_FETCHING).await;
        let namespace = Namespace::from(req.mode);

        let requested: Option<Vec<String>> = req
            .paper_ids
            .as_ref()
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().map(|id| normalize_id(id).to_string()).collect());

        let records = match &requested {
            Some(ids) => self.store.get_by_ids(ids, &namespace).await,
            None => self.store.get_all(&namespace).await,
        }
        .context("failed to fetch stored papers")?;
        debug!(found = records.len(), "Fetched stored papers");

        let labels: HashMap<String, String> = req
            .labels
            .iter()
            .map(|(id, name)| (normalize_id(id).to_string(), name.clone()))
            .collect();
        let found: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut papers: Vec<Paper> = records
            .into_iter()
            .map(|r| {
                let label = labels.get(&r.id).cloned().or(r.metadata.original_filename);
                let paper = Paper::new(r.id).with_metadata(r.metadata.paper);
                match label {
                    Some(name) => paper.with_display_name(name),
                    None => paper,
                }
            })
            .collect();

        for id in requested.iter().flatten().filter(|id| !found.contains(*id)) {
            let path = stored_path(&self.upload_dir, id);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                warn!(paper_id = %id, "Requested paper is neither stored nor on disk");
                continue;
            }
            info!(paper_id = %id, "Paper not stored, reprocessing from disk");
            let label = labels.get(id).map(String::as_str);
            match self.ingest_file(id, &path, label, req.mode, handle).await {
                Ok(paper) => papers.push(paper),
                Err(e) => warn!(paper_id = %id, error = %format!("{e:#}"), "Failed to reprocess paper"),
            }
        }

        handle.advance(50, STEP_BUILDING).await;
        let threshold = req
            .confidence_threshold
            .unwrap_or(self.graph_cfg.regenerate_confidence_threshold);
        let mut opts = GraphOptions::from_config(&self.graph_cfg, threshold);
        if let Some(use_similarity) = req.use_similarity {
            opts.use_similarity = use_similarity;
        }
        Ok(self.graph.build(&papers, req.mode, &opts, handle).await)
    }

    /// Stored record for `id`, if any. A failing lookup counts as absent.
    async fn lookup(&self, id: &str, namespace: &Namespace) -> Option<PaperRecord> {
        match self.store.get_by_ids(&[id.to_string()], namespace).await {
            Ok(mut records) => records.pop(),
            Err(e) => {
                warn!(paper_id = %id, error = %e, "Store lookup failed, processing paper");
                None
            }
        }
    }

    /// Convert, classify, extract and persist one PDF.
    pub async fn ingest_file(
        &self,
        id: &str,
        path: &Path,
        display_name: Option<&str>,
        mode: Mode,
        observer: &dyn RetryObserver,
    ) -> anyhow::Result<Paper> {
        let markdown = self
            .converter
            .convert(path)
            .await
            .with_context(|| format!("{} conversion failed", self.converter.name()))?;
        let sections = classify(&markdown);
        let text = truncate_text(&prepare_paper_text(&sections), self.extractor.max_chars());
        let metadata = self
            .extractor
            .extract(&text, mode, observer)
            .await
            .context("metadata extraction failed")?;

        let record = RecordMetadata::new(metadata.clone(), display_name.map(str::to_string));
        if let Err(e) = self.store.store(id, &text, record, &Namespace::from(mode)).await {
            warn!(paper_id = %id, error = %e, "Failed to persist paper, continuing");
        }

        let mut paper = Paper::new(id).with_file_path(path).with_metadata(metadata);
        paper.sections = sections;
        if let Some(name) = display_name {
            paper = paper.with_display_name(name);
        }
        Ok(paper)
    }
}

/// Run a workflow, turning a panic into an ordinary job error.
async fn supervised<F>(work: F) -> anyhow::Result<Graph>
where
    F: Future<Output = anyhow::Result<Graph>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(anyhow!("job panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn finish(handle: &JobHandle, outcome: anyhow::Result<Graph>) {
    match outcome {
        Ok(graph) => handle.complete(graph).await,
        Err(e) => handle.fail(format!("{e:#}")).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::IngestionError;
    use crate::jobs::JobStatus;
    use async_trait::async_trait;
    use papergraph_db::{MemoryStore, SimilarPaper, StoreError};
    use papergraph_llm::mock::ScriptedBackend;
    use pretty_assertions::assert_eq;

    /// Every read fails, as if the store's backing file went away.
    struct BrokenStore;

    #[async_trait]
    impl ContentStore for BrokenStore {
        async fn store(&self, _: &str, _: &str, _: RecordMetadata, _: &Namespace) -> papergraph_db::Result<()> {
            Ok(())
        }
        async fn get_by_ids(&self, _: &[String], _: &Namespace) -> papergraph_db::Result<Vec<PaperRecord>> {
            Err(StoreError::Io(std::io::Error::other("snapshot unreadable")))
        }
        async fn get_all(&self, _: &Namespace) -> papergraph_db::Result<Vec<PaperRecord>> {
            Err(StoreError::Io(std::io::Error::other("snapshot unreadable")))
        }
        async fn query_similar(&self, _: &str, _: usize, _: &Namespace) -> papergraph_db::Result<Vec<SimilarPaper>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _: &str, _: &Namespace) -> papergraph_db::Result<bool> {
            Ok(false)
        }
    }

    async fn wait_terminal(orch: &Orchestrator, id: Uuid) -> crate::jobs::Job {
        loop {
            let job = orch.jobs().get(&id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::task::yield_now().await;
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl DocumentConverter for FailingConverter {
        async fn convert(&self, path: &Path) -> Result<String, IngestionError> {
            Err(IngestionError::EmptyDocument(path.to_path_buf()))
        }
        fn name(&self) -> &str { "failing" }
    }

    fn orchestrator(store: Arc<dyn ContentStore>) -> Orchestrator {
        Orchestrator::new(
            &Config::default(),
            JobStore::new(),
            Arc::new(ScriptedBackend::new()),
            store,
            Arc::new(FailingConverter),
        )
    }

    fn file(id: &str) -> BatchFile {
        BatchFile { id: id.into(), original_name: format!("{id}.pdf"), path: PathBuf::from(format!("/nowhere/{id}.pdf")) }
    }

    #[tokio::test]
    async fn test_batch_with_no_usable_papers_fails() {
        let orch = orchestrator(Arc::new(MemoryStore::new()));
        let handle = orch.jobs().create(JobKind::Batch, Some(2)).await;
        let req = BatchRequest { files: vec![file("a"), file("b")], mode: Mode::Student, confidence_threshold: None };

        let err = orch.run_batch(&handle, req).await.unwrap_err();
        assert_eq!(err.to_string(), NO_VALID_PDFS);
    }

    #[tokio::test]
    async fn test_stored_papers_skip_conversion() {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::from(Mode::Student);
        for id in ["a", "b"] {
            store.store(id, "text", RecordMetadata::default(), &ns).await.unwrap();
        }
        let orch = orchestrator(store);
        let handle = orch.jobs().create(JobKind::Batch, Some(2)).await;
        let req = BatchRequest { files: vec![file("a"), file("b")], mode: Mode::Student, confidence_threshold: None };

        let graph = orch.run_batch(&handle, req).await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].data.label, "a.pdf");
        let job = handle.snapshot().await.unwrap();
        assert_eq!(job.progress, 90);
        assert_eq!(job.current_step, STEP_BUILDING);
    }

    #[tokio::test]
    async fn test_regenerate_empty_namespace_completes_with_empty_graph() {
        let orch = orchestrator(Arc::new(MemoryStore::new()));
        let id = orch.submit_regenerate(RegenerateRequest::default()).await;

        let job = wait_terminal(&orch, id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(Graph::empty()));
    }

    #[tokio::test]
    async fn test_regenerate_labels_and_missing_ids() {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::from(Mode::Researcher);
        store
            .store("a", "text", RecordMetadata::new(Default::default(), Some("Alpha.pdf".into())), &ns)
            .await
            .unwrap();
        store.store("b", "text", RecordMetadata::default(), &ns).await.unwrap();
        let orch = orchestrator(store);
        let handle = orch.jobs().create(JobKind::Graph, None).await;
        let req = RegenerateRequest {
            mode: Mode::Researcher,
            paper_ids: Some(vec!["a.pdf".into(), "b".into(), "ghost".into()]),
            ..Default::default()
        };

        let graph = orch.run_regenerate(&handle, req).await.unwrap();
        let labels: Vec<_> = graph.nodes.iter().map(|n| n.data.label.as_str()).collect();
        assert_eq!(labels, vec!["Alpha.pdf", "b"]);
    }

    #[tokio::test]
    async fn test_label_keys_accept_pdf_suffix() {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::from(Mode::Student);
        store.store("a", "text", RecordMetadata::default(), &ns).await.unwrap();
        let orch = orchestrator(store);
        let handle = orch.jobs().create(JobKind::Graph, None).await;
        let req = RegenerateRequest {
            paper_ids: Some(vec!["a".into()]),
            labels: HashMap::from([("a.pdf".to_string(), "Alpha Paper".to_string())]),
            ..Default::default()
        };

        let graph = orch.run_regenerate(&handle, req).await.unwrap();
        assert_eq!(graph.nodes[0].data.label, "Alpha Paper");
    }

    #[tokio::test]
    async fn test_failed_job_keeps_error_chain() {
        let orch = orchestrator(Arc::new(BrokenStore));
        let id = orch.submit_regenerate(RegenerateRequest::default()).await;

        let job = wait_terminal(&orch, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        let error = job.error.unwrap();
        assert!(error.starts_with("failed to fetch stored papers"), "{error}");
        assert!(error.contains("snapshot unreadable"), "{error}");
    }

    #[tokio::test]
    async fn test_panicking_backend_fails_the_job() {
        let store = Arc::new(MemoryStore::new());
        let ns = Namespace::from(Mode::Student);
        for id in ["a", "b"] {
            store.store(id, "text", RecordMetadata::default(), &ns).await.unwrap();
        }
        let backend = ScriptedBackend::with_responder(|_| panic!("backend exploded"));
        let orch = Orchestrator::new(
            &Config::default(),
            JobStore::new(),
            Arc::new(backend),
            store,
            Arc::new(FailingConverter),
        );
        let req = BatchRequest { files: vec![file("a"), file("b")], mode: Mode::Student, confidence_threshold: None };
        let id = orch.submit_batch(req).await;

        let job = wait_terminal(&orch, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("job panicked: backend exploded"));
    }
}

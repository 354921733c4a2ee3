//! Background job registry.
//!
//! Jobs are created when a request is accepted and then advanced by the one
//! task that owns their [`JobHandle`]. Every transition is mirrored onto a
//! broadcast channel for live progress streams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use papergraph_common::Graph;
use papergraph_llm::RetryObserver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

pub const INITIAL_STEP: &str = "Initializing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Batch,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    /// Waiting out a rate-limit backoff; returns to `Processing`.
    Ratelimit,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued     => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Ratelimit  => "ratelimit",
            JobStatus::Completed  => "completed",
            JobStatus::Failed     => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    /// File being processed or the stage label.
    #[serde(rename = "current_file")]
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Graph>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    fn new(kind: JobKind, total_files: Option<usize>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            progress: 0,
            current_step: INITIAL_STEP.to_string(),
            total_files,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }
}

/// Pushed to live subscribers on every job transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Created { job_id: Uuid, kind: JobKind },
    Progress { job_id: Uuid, status: JobStatus, progress: u8, current_step: String },
    Completed { job_id: Uuid, nodes: usize, edges: usize },
    Failed { job_id: Uuid, error: String },
}

/// Shared, cloneable registry of every job started in this process.
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    events: broadcast::Sender<JobEvent>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { jobs: Arc::new(RwLock::new(HashMap::new())), events }
    }

    /// Register a queued job and hand back the handle its task will own.
    pub async fn create(&self, kind: JobKind, total_files: Option<usize>) -> JobHandle {
        let job = Job::new(kind, total_files);
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        let _ = self.events.send(JobEvent::Created { job_id: id, kind });
        tracing::debug!(job_id = %id, ?kind, "Job queued");
        JobHandle { id, store: self.clone() }
    }

    pub async fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    async fn update<F>(&self, id: Uuid, f: F) -> Option<JobEvent>
    where
        F: FnOnce(&mut Job) -> JobEvent,
    {
        let mut guard = self.jobs.write().await;
        let job = guard.get_mut(&id)?;
        let event = f(job);
        job.updated_at = Utc::now();
        drop(guard);
        let _ = self.events.send(event.clone());
        Some(event)
    }
}

/// Write access to one job. Only the task running the job holds one.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    store: JobStore,
}

fn progress_event(job: &Job) -> JobEvent {
    JobEvent::Progress {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        current_step: job.current_step.clone(),
    }
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn snapshot(&self) -> Option<Job> {
        self.store.get(&self.id).await
    }

    pub async fn set_status(&self, status: JobStatus) {
        self.store
            .update(self.id, |job| {
                job.status = status;
                progress_event(job)
            })
            .await;
    }

    /// Move to `processing` and report progress at a labelled step.
    pub async fn advance(&self, progress: u8, step: impl Into<String>) {
        let step = step.into();
        tracing::debug!(job_id = %self.id, progress, step = %step, "Job progress");
        self.store
            .update(self.id, |job| {
                job.status = JobStatus::Processing;
                job.progress = progress.min(100);
                job.current_step = step;
                progress_event(job)
            })
            .await;
    }

    pub async fn complete(&self, graph: Graph) {
        tracing::info!(job_id = %self.id, nodes = graph.nodes.len(), edges = graph.edges.len(), "Job completed");
        self.store
            .update(self.id, |job| {
                let event = JobEvent::Completed {
                    job_id: job.id,
                    nodes: graph.nodes.len(),
                    edges: graph.edges.len(),
                };
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.result = Some(graph);
                event
            })
            .await;
    }

    pub async fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        tracing::error!(job_id = %self.id, error = %error, "Job failed");
        self.store
            .update(self.id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some(error.clone());
                JobEvent::Failed { job_id: job.id, error }
            })
            .await;
    }
}

#[async_trait]
impl RetryObserver for JobHandle {
    async fn on_backoff(&self, attempt: u32, delay: Duration) {
        tracing::info!(job_id = %self.id, attempt, delay_ms = delay.as_millis() as u64, "Job waiting on rate limit");
        self.set_status(JobStatus::Ratelimit).await;
    }

    async fn on_resume(&self) {
        self.set_status(JobStatus::Processing).await;
    }
}

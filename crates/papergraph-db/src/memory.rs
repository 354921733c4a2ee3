//! In-process content store with optional JSON snapshot persistence.

use async_trait::async_trait;
use papergraph_llm::{Embedder, HashedEmbedder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::schema::{Namespace, PaperRecord, RecordMetadata, SimilarPaper};
use crate::store::ContentStore;
use crate::vector::{distance, normalize};

#[derive(Clone)]
struct Entry {
    record: PaperRecord,
    /// Empty when the record could not be embedded; skipped by search.
    vector: Vec<f32>,
}

/// Snapshot row. Vectors are kept so a reload does not re-embed.
#[derive(Serialize)]
struct SavedRef<'a> {
    #[serde(flatten)]
    record: &'a PaperRecord,
    embedding: &'a [f32],
    embedding_model: &'a str,
}

#[derive(Deserialize)]
struct Saved {
    #[serde(flatten)]
    record: PaperRecord,
    #[serde(default)]
    embedding: Vec<f32>,
    #[serde(default)]
    embedding_model: String,
}

/// Records per namespace, kept in first-insertion order.
#[derive(Clone)]
pub struct MemoryStore {
    namespaces: Arc<RwLock<HashMap<Namespace, Vec<Entry>>>>,
    snapshot: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            namespaces: Arc::default(),
            snapshot: None,
            embedder: Arc::new(HashedEmbedder),
        }
    }
}

impl MemoryStore {
    /// In-memory store using offline hashed vectors.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Open a store backed by a JSON snapshot file, loading it if present.
    ///
    /// Rows saved under a different embedding model are re-embedded; if that
    /// fails they load without a vector and are left out of similarity search.
    pub async fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut namespaces = HashMap::new();
        if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read(&path).await?;
            let saved: HashMap<Namespace, Vec<Saved>> = serde_json::from_slice(&raw)?;
            for (ns, rows) in saved {
                let entries = load_entries(rows, embedder.as_ref(), &ns).await;
                namespaces.insert(ns, entries);
            }
            tracing::info!(path = %path.display(), namespaces = namespaces.len(), "Content store loaded");
        }
        Ok(Self {
            namespaces: Arc::new(RwLock::new(namespaces)),
            snapshot: Some(path),
            embedder,
        })
    }

    pub async fn len(&self, namespace: &Namespace) -> usize {
        self.namespaces.read().await.get(namespace).map_or(0, Vec::len)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embedder.embed(&[text.to_string()]).await?;
        let mut v = vectors.pop().unwrap_or_default();
        normalize(&mut v);
        Ok(v)
    }

    /// Write the snapshot as it would look with `namespace` replaced by
    /// `entries`. Callers commit to memory only after this succeeds.
    async fn persist(
        &self,
        namespaces: &HashMap<Namespace, Vec<Entry>>,
        namespace: &Namespace,
        entries: &[Entry],
    ) -> Result<()> {
        let Some(path) = &self.snapshot else { return Ok(()) };
        let model = self.embedder.model_id();
        let mut saved: HashMap<&Namespace, Vec<SavedRef<'_>>> = namespaces
            .iter()
            .filter(|(ns, _)| *ns != namespace)
            .map(|(ns, entries)| (ns, saved_rows(entries, model)))
            .collect();
        saved.insert(namespace, saved_rows(entries, model));

        let json = serde_json::to_vec_pretty(&saved)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn saved_rows<'a>(entries: &'a [Entry], model: &'a str) -> Vec<SavedRef<'a>> {
    entries
        .iter()
        .map(|e| SavedRef { record: &e.record, embedding: &e.vector, embedding_model: model })
        .collect()
}

async fn load_entries(rows: Vec<Saved>, embedder: &dyn Embedder, ns: &Namespace) -> Vec<Entry> {
    let stale: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.embedding.is_empty() || r.embedding_model != embedder.model_id())
        .map(|(i, _)| i)
        .collect();
    let mut entries: Vec<Entry> = rows
        .into_iter()
        .map(|r| Entry { record: r.record, vector: r.embedding })
        .collect();
    if stale.is_empty() {
        return entries;
    }

    let texts: Vec<String> = stale.iter().map(|&i| entries[i].record.document.clone()).collect();
    match embedder.embed(&texts).await {
        Ok(vectors) => {
            for (&i, mut v) in stale.iter().zip(vectors) {
                normalize(&mut v);
                entries[i].vector = v;
            }
            tracing::info!(namespace = %ns, count = stale.len(), model = embedder.model_id(), "Re-embedded stored papers");
        }
        Err(e) => {
            tracing::warn!(namespace = %ns, count = stale.len(), error = %e, "Could not re-embed stored papers");
            for &i in &stale {
                entries[i].vector.clear();
            }
        }
    }
    entries
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn store(
        &self,
        id: &str,
        text: &str,
        metadata: RecordMetadata,
        namespace: &Namespace,
    ) -> Result<()> {
        let vector = self.embed_one(text).await?;
        let entry = Entry {
            record: PaperRecord { id: id.to_string(), document: text.to_string(), metadata },
            vector,
        };

        let mut guard = self.namespaces.write().await;
        let mut entries = guard.get(namespace).cloned().unwrap_or_default();
        match entries.iter_mut().find(|e| e.record.id == id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.persist(&guard, namespace, &entries).await?;
        guard.insert(namespace.clone(), entries);
        tracing::debug!(paper_id = %id, namespace = %namespace, "Stored paper");
        Ok(())
    }

    async fn get_by_ids(&self, ids: &[String], namespace: &Namespace) -> Result<Vec<PaperRecord>> {
        let guard = self.namespaces.read().await;
        let Some(entries) = guard.get(namespace) else { return Ok(Vec::new()) };
        Ok(ids
            .iter()
            .filter_map(|id| entries.iter().find(|e| &e.record.id == id))
            .map(|e| e.record.clone())
            .collect())
    }

    async fn get_all(&self, namespace: &Namespace) -> Result<Vec<PaperRecord>> {
        let guard = self.namespaces.read().await;
        Ok(guard
            .get(namespace)
            .map(|entries| entries.iter().map(|e| e.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn query_similar(
        &self,
        query: &str,
        k: usize,
        namespace: &Namespace,
    ) -> Result<Vec<SimilarPaper>> {
        if k == 0 || self.len(namespace).await == 0 {
            return Ok(Vec::new());
        }
        let q = self.embed_one(query).await?;
        let guard = self.namespaces.read().await;
        let Some(entries) = guard.get(namespace) else { return Ok(Vec::new()) };

        let mut hits: Vec<SimilarPaper> = entries
            .iter()
            .filter_map(|e| {
                Some(SimilarPaper {
                    id: e.record.id.clone(),
                    document: e.record.document.clone(),
                    metadata: e.record.metadata.clone(),
                    distance: distance(&q, &e.vector)?,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, id: &str, namespace: &Namespace) -> Result<bool> {
        let mut guard = self.namespaces.write().await;
        let Some(current) = guard.get(namespace) else { return Ok(false) };
        if !current.iter().any(|e| e.record.id == id) {
            return Ok(false);
        }
        let remaining: Vec<Entry> = current.iter().filter(|e| e.record.id != id).cloned().collect();
        self.persist(&guard, namespace, &remaining).await?;
        guard.insert(namespace.clone(), remaining);
        tracing::info!(paper_id = %id, namespace = %namespace, "Deleted paper");
        Ok(true)
    }
}

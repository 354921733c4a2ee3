//! The storage seam the pipeline and web layer depend on.

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{Namespace, PaperRecord, RecordMetadata, SimilarPaper};

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or replace the record for `id`.
    async fn store(
        &self,
        id: &str,
        text: &str,
        metadata: RecordMetadata,
        namespace: &Namespace,
    ) -> Result<()>;

    /// Records for the ids that exist, in request order. Unknown ids are skipped.
    async fn get_by_ids(&self, ids: &[String], namespace: &Namespace) -> Result<Vec<PaperRecord>>;

    async fn get_all(&self, namespace: &Namespace) -> Result<Vec<PaperRecord>>;

    /// Up to `k` records closest to `query`, nearest first.
    async fn query_similar(
        &self,
        query: &str,
        k: usize,
        namespace: &Namespace,
    ) -> Result<Vec<SimilarPaper>>;

    /// Returns `false` when the id was not stored.
    async fn delete(&self, id: &str, namespace: &Namespace) -> Result<bool>;
}

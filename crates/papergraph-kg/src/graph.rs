//! Relationship graph assembly over extracted papers.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use papergraph_common::{Graph, GraphEdge, GraphNode, Mode, Paper, PaperMetadata};
use papergraph_config::GraphConfig;
use papergraph_db::{ContentStore, Namespace};
use papergraph_llm::RetryObserver;
use tracing::{debug, info, instrument, warn};

use crate::synthesis::RelationshipSynthesizer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    /// Edges below this confidence are dropped.
    pub confidence_threshold: f64,
    /// Compare each paper only with its nearest stored neighbours.
    pub use_similarity: bool,
    pub similarity_k: usize,
    pub max_concurrent_pairs: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            use_similarity: false,
            similarity_k: 5,
            max_concurrent_pairs: 1,
        }
    }
}

impl GraphOptions {
    pub fn from_config(cfg: &GraphConfig, confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            use_similarity: cfg.use_similarity,
            similarity_k: cfg.similarity_k,
            max_concurrent_pairs: cfg.max_concurrent_pairs.max(1),
        }
    }
}

pub struct GraphBuilder {
    synthesizer: Arc<RelationshipSynthesizer>,
    store: Arc<dyn ContentStore>,
}

impl GraphBuilder {
    pub fn new(synthesizer: Arc<RelationshipSynthesizer>, store: Arc<dyn ContentStore>) -> Self {
        Self { synthesizer, store }
    }

    /// Build the graph for `papers`. Papers without metadata are ignored and
    /// fewer than two extracted papers give an empty graph. A failed pair or
    /// similarity query only drops that pair or that paper's candidates.
    #[instrument(skip_all, fields(papers = papers.len(), mode = %mode, similarity = opts.use_similarity))]
    pub async fn build(
        &self,
        papers: &[Paper],
        mode: Mode,
        opts: &GraphOptions,
        observer: &dyn RetryObserver,
    ) -> Graph {
        let mut seen_ids = HashSet::new();
        let extracted: Vec<(&Paper, &PaperMetadata)> = papers
            .iter()
            .filter_map(|p| p.metadata.as_ref().map(|m| (p, m)))
            .filter(|&(p, _)| seen_ids.insert(p.id.as_str()))
            .collect();

        if extracted.len() < 2 {
            warn!(extracted = extracted.len(), "Need at least 2 papers with metadata to build graph");
            return Graph::empty();
        }

        let nodes: Vec<GraphNode> = extracted
            .iter()
            .map(|(p, m)| GraphNode::from_paper(p, (*m).clone()))
            .collect();

        let pairs = if opts.use_similarity {
            self.similar_pairs(&extracted, mode, opts.similarity_k).await
        } else {
            all_pairs(extracted.len())
        };
        debug!(pairs = pairs.len(), "Synthesizing relationships");

        let synthesizer = &self.synthesizer;
        let extracted = &extracted;
        let results: Vec<_> = stream::iter(pairs)
            .map(|(i, j)| async move {
                let (_, meta_a) = extracted[i];
                let (_, meta_b) = extracted[j];
                (i, j, synthesizer.synthesize(meta_a, meta_b, mode, observer).await)
            })
            .buffered(opts.max_concurrent_pairs.max(1))
            .collect()
            .await;

        let mut edges = Vec::new();
        for (i, j, outcome) in results {
            let (source, target) = (&extracted[i].0.id, &extracted[j].0.id);
            match outcome {
                Ok(rel) if rel.confidence >= opts.confidence_threshold => {
                    edges.push(GraphEdge::new(source, target, rel));
                }
                Ok(rel) => {
                    debug!(%source, %target, confidence = rel.confidence, "Edge below threshold");
                }
                Err(e) => {
                    warn!(%source, %target, error = %e, "Synthesis failed, pair excluded");
                }
            }
        }

        info!(nodes = nodes.len(), edges = edges.len(), "Built graph");
        Graph { nodes, edges }
    }

    /// Ordered pairs `(paper, neighbour)` from similarity search, deduplicated
    /// and never self-referential.
    async fn similar_pairs(
        &self,
        extracted: &[(&Paper, &PaperMetadata)],
        mode: Mode,
        k: usize,
    ) -> Vec<(usize, usize)> {
        let namespace = Namespace::from(mode);
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();

        for (i, (paper, meta)) in extracted.iter().enumerate() {
            let query = if meta.key_result.trim().is_empty() {
                paper.id.as_str()
            } else {
                meta.key_result.as_str()
            };
            let hits = match self.store.query_similar(query, k, &namespace).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(paper_id = %paper.id, error = %e, "Similar paper search failed");
                    continue;
                }
            };
            for hit in hits {
                let Some(j) = extracted.iter().position(|(p, _)| p.id == hit.id) else { continue };
                if j != i && seen.insert((i, j)) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

fn all_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect()
}

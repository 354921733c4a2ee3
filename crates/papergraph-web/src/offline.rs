//! Graph building for the offline batch binary.

use std::sync::Arc;

use papergraph_common::{Graph, Mode, Paper};
use papergraph_db::{ContentStore, Namespace, RecordMetadata};
use papergraph_kg::{GraphBuilder, GraphOptions, RelationshipSynthesizer};
use papergraph_llm::NoopObserver;
use tracing::{debug, warn};

/// A paper with metadata plus the prepared text it was extracted from.
#[derive(Debug, Clone)]
pub struct ExtractedPaper {
    pub paper: Paper,
    pub text: String,
}

/// Index every extracted paper into `store`, then build the graph.
///
/// Similarity pruning searches `store`, so indexing has to come first or
/// no neighbours are found. A paper that fails to index stays in the graph.
pub async fn index_and_build(
    synthesizer: Arc<RelationshipSynthesizer>,
    store: Arc<dyn ContentStore>,
    extracted: &[ExtractedPaper],
    mode: Mode,
    opts: &GraphOptions,
) -> Graph {
    let namespace = Namespace::from(mode);
    for ExtractedPaper { paper, text } in extracted {
        let Some(metadata) = &paper.metadata else { continue };
        let record = RecordMetadata::new(metadata.clone(), paper.display_name.clone());
        match store.store(&paper.id, text, record, &namespace).await {
            Ok(()) => debug!(paper_id = %paper.id, "Indexed paper"),
            Err(e) => warn!(paper_id = %paper.id, error = %e, "Failed to index paper"),
        }
    }

    let papers: Vec<Paper> = extracted.iter().map(|e| e.paper.clone()).collect();
    GraphBuilder::new(synthesizer, store)
        .build(&papers, mode, opts, &NoopObserver)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use papergraph_common::{PaperMetadata, RelationType};
    use papergraph_db::MemoryStore;
    use papergraph_llm::mock::ScriptedBackend;
    use pretty_assertions::assert_eq;

    fn extracted(id: &str, key_result: &str) -> ExtractedPaper {
        let metadata = PaperMetadata::new(None, Some(key_result.to_string()), None);
        ExtractedPaper {
            paper: Paper::new(id).with_display_name(format!("{id}.pdf")).with_metadata(metadata),
            text: format!("{id} text about {key_result}"),
        }
    }

    #[tokio::test]
    async fn test_similarity_mode_finds_pairs_in_fresh_store() {
        let backend = ScriptedBackend::with_responder(|_| {
            Ok(r#"{"relation_type": "Extends", "confidence": 0.8, "explanation": "builds on it"}"#.to_string())
        });
        let synthesizer = Arc::new(RelationshipSynthesizer::new(Arc::new(backend)));
        let store = Arc::new(MemoryStore::new());
        let opts = GraphOptions { confidence_threshold: 0.5, use_similarity: true, ..GraphOptions::default() };
        let papers = [extracted("a", "traffic signal control"), extracted("b", "traffic signal timing")];

        let graph = index_and_build(synthesizer, store.clone(), &papers, Mode::Student, &opts).await;

        assert_eq!(graph.nodes.len(), 2);
        assert!(!graph.edges.is_empty());
        assert_eq!(graph.edges[0].data.relation_type, RelationType::Extends);
        assert_eq!(store.len(&Namespace::from(Mode::Student)).await, 2);
    }
}

//! Search service - the retrieval operations offered to an API layer
//!
//! Wires the model, lifecycle manager, query engine and lexical matcher
//! together. Every call is safe to make concurrently for any mix of owners.

use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::core::document::{DocumentId, DocumentStore, LexicalMatcher, OwnerId};
use crate::core::paths::IndexPaths;
use crate::error::Result;
use crate::search::engine::{SearchResult, SemanticQueryEngine};
use crate::search::hybrid::{self, HybridScore, HybridWeights};
use crate::search::lifecycle::{IndexLifecycleManager, IndexStatus};
use crate::search::{IndexStore, ModelHandle};

pub struct SearchService {
    indices: Arc<IndexLifecycleManager>,
    engine: SemanticQueryEngine,
    lexical: Arc<dyn LexicalMatcher>,
}

impl SearchService {
    pub fn new(
        model: Arc<ModelHandle>,
        indices: Arc<IndexLifecycleManager>,
        lexical: Arc<dyn LexicalMatcher>,
    ) -> Self {
        Self {
            engine: SemanticQueryEngine::new(model, Arc::clone(&indices)),
            indices,
            lexical,
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        documents: Arc<dyn DocumentStore>,
        lexical: Arc<dyn LexicalMatcher>,
    ) -> Self {
        let model = Arc::new(config.model_handle());
        let store = IndexStore::new(IndexPaths::from_root(config.data_dir.clone()));
        let indices = Arc::new(IndexLifecycleManager::new(
            store,
            documents,
            Arc::clone(&model),
            config.lifecycle_options(),
        ));
        Self::new(model, indices, lexical)
    }

    pub fn indices(&self) -> &Arc<IndexLifecycleManager> {
        &self.indices
    }

    /// Documents of `owner` semantically closest to `query`, best first,
    /// with every score at or above `threshold`. Builds the owner's index
    /// first if it is not available.
    pub fn semantic_search(
        &self,
        owner: OwnerId,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        // Search the snapshot ensure_resident handed back. A second cache
        // lookup through `SemanticQueryEngine::query` could find the owner
        // already evicted by another owner's load.
        let index = self.indices.ensure_resident(owner)?;
        let mut results = self.engine.query_index(&index, query, k)?;
        results.retain(|r| r.score >= threshold);
        Ok(results)
    }

    /// Rebuild `owner`'s index from scratch, returning how many documents it holds
    pub fn rebuild_index(&self, owner: OwnerId) -> Result<usize> {
        let index = self.indices.rebuild(owner)?;
        info!(owner, documents = index.len(), "index rebuild requested");
        Ok(index.len())
    }

    /// Semantic and lexical retrieval merged into one ranking of at most
    /// `limit` documents. A source with zero weight is not queried at all.
    pub fn hybrid_search(
        &self,
        owner: OwnerId,
        query: &str,
        weights: HybridWeights,
        limit: usize,
    ) -> Result<Vec<HybridScore>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = limit.saturating_mul(2);

        let semantic = if weights.uses_semantic() {
            let index = self.indices.ensure_resident(owner)?;
            self.engine.query_index(&index, query, candidates)?
        } else {
            Vec::new()
        };

        let lexical = if weights.uses_keyword() {
            self.lexical.matching_ids(owner, query, candidates)?
        } else {
            Vec::new()
        };

        Ok(hybrid::merge(&semantic, &lexical, weights, limit))
    }

    /// Other documents of `owner` closest to `document`
    pub fn similar_documents(
        &self,
        owner: OwnerId,
        document: DocumentId,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = self.indices.ensure_resident(owner)?;
        Ok(self.engine.similar_in(&index, document, k))
    }

    /// Tell the engine `owner`'s documents changed
    pub fn note_document_change(&self, owner: OwnerId) {
        self.indices.note_document_change(owner);
    }

    pub fn status(&self, owner: OwnerId) -> IndexStatus {
        self.indices.status(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{Document, MemoryDocumentStore};
    use crate::core::sqlite::SqliteDocumentStore;
    use crate::error::IndexError;
    use crate::search::embedding::EmbeddingModel;
    use crate::search::lifecycle::LifecycleOptions;
    use crate::search::testing::{concept_model, manager_at, manager_with, ConceptModel, CONCEPT_MODEL_NAME};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn documents() -> Arc<MemoryDocumentStore> {
        Arc::new(MemoryDocumentStore::with_documents(vec![
            Document::new(1, 1, "Cats", "Cats are great pets"),
            Document::new(2, 1, "Dogs", "Dogs are loyal companions"),
            Document::new(3, 1, "Markets", "Stock market trends in 2024"),
            Document::new(10, 2, "Budget", "Monthly budget and finance planning"),
            Document::new(11, 2, "Investing", "Investment and stock market basics"),
            Document::new(12, 2, "Taxes", "Finance paperwork for the year"),
        ]))
    }

    fn service_over(docs: Arc<MemoryDocumentStore>) -> (tempfile::TempDir, SearchService) {
        let model = concept_model();
        let (dir, manager) = manager_with(Arc::clone(&model), Arc::clone(&docs));
        (dir, SearchService::new(model, manager, docs))
    }

    fn ids(results: &[SearchResult]) -> Vec<DocumentId> {
        results.iter().map(|r| r.document_id).collect()
    }

    #[test]
    fn test_end_to_end_ranking_survives_rebuild() -> Result<()> {
        let (_dir, service) = service_over(documents());

        let before = service.semantic_search(1, "feline pet", 3, -1.0)?;
        assert_eq!(before[0].document_id, 1);
        assert_eq!(ids(&before), vec![1, 2, 3]);

        assert_eq!(service.rebuild_index(1)?, 3);
        let after = service.semantic_search(1, "feline pet", 3, -1.0)?;
        assert_eq!(after, before);
        Ok(())
    }

    #[test]
    fn test_threshold_filters_scores() -> Result<()> {
        let (_dir, service) = service_over(documents());
        for threshold in [-1.0, 0.0, 0.1, 0.5, 0.95] {
            let results = service.semantic_search(1, "feline pet", 10, threshold)?;
            assert!(results.iter().all(|r| r.score >= threshold));
        }
        assert_eq!(ids(&service.semantic_search(1, "feline pet", 10, 0.5)?), vec![1]);
        Ok(())
    }

    #[test]
    fn test_reload_gives_same_results() -> Result<()> {
        let docs = documents();
        let (dir, service) = service_over(Arc::clone(&docs));
        let before = service.semantic_search(1, "loyal dog", 3, -1.0)?;

        let model = concept_model();
        let manager = manager_at(
            dir.path(),
            Arc::clone(&model),
            Arc::clone(&docs),
            LifecycleOptions::default(),
        );
        let reopened = SearchService::new(model, manager, docs);
        assert_eq!(reopened.semantic_search(1, "loyal dog", 3, -1.0)?, before);
        Ok(())
    }

    #[test]
    fn test_hybrid_combines_sources() -> Result<()> {
        let (_dir, service) = service_over(documents());

        let ranked = service.hybrid_search(1, "market", HybridWeights::new(0.7, 0.3), 10)?;
        assert_eq!(ranked[0].document_id, 3);
        // 0.7 * 1.0 from the semantic leg plus 0.3 for the substring hit
        assert!((ranked[0].score - 1.0).abs() < 1e-5);
        assert!(ranked.iter().all(|r| [1, 2, 3].contains(&r.document_id)));
        Ok(())
    }

    #[test]
    fn test_hybrid_limit() -> Result<()> {
        let (_dir, service) = service_over(documents());
        for limit in 0..5 {
            let ranked = service.hybrid_search(1, "are", HybridWeights::default(), limit)?;
            assert!(ranked.len() <= limit);
        }
        Ok(())
    }

    struct CountingModel {
        calls: AtomicUsize,
    }

    impl EmbeddingModel for CountingModel {
        fn name(&self) -> &str {
            CONCEPT_MODEL_NAME
        }

        fn dimension(&self) -> usize {
            ConceptModel.dimension()
        }

        fn encode(&self, texts: &[&str]) -> Result<Vec<crate::search::EmbeddingVector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ConceptModel.encode(texts)
        }
    }

    #[test]
    fn test_zero_semantic_weight_skips_embedding() -> Result<()> {
        let counting = Arc::new(CountingModel {
            calls: AtomicUsize::new(0),
        });
        let model = Arc::new(ModelHandle::from_model(Arc::clone(&counting) as Arc<dyn EmbeddingModel>));
        let docs = documents();
        let (_dir, manager) = manager_with(Arc::clone(&model), Arc::clone(&docs));
        let service = SearchService::new(model, Arc::clone(&manager), docs);

        let ranked = service.hybrid_search(1, "cats", HybridWeights::new(0.0, 1.0), 10)?;
        assert_eq!(ranked.iter().map(|r| r.document_id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
        assert!(manager.resident(1).is_none());
        Ok(())
    }

    #[test]
    fn test_hybrid_with_sqlite_lexical_matcher() -> Result<()> {
        let sqlite = Arc::new(SqliteDocumentStore::open_in_memory()?);
        let cats = sqlite.insert(1, "Cats", Some("Cats are great pets"))?;
        let dogs = sqlite.insert(1, "Dogs", Some("Dogs are loyal companions"))?;
        sqlite.insert(2, "Cats", Some("Another owner's cats"))?;

        let model = concept_model();
        let (_dir, manager) = manager_with(Arc::clone(&model), Arc::clone(&sqlite));
        let service = SearchService::new(model, manager, sqlite);

        let ranked = service.hybrid_search(1, "loyal", HybridWeights::default(), 5)?;
        assert_eq!(ranked[0].document_id, dogs);
        assert!(ranked.iter().all(|r| r.document_id == cats || r.document_id == dogs));
        Ok(())
    }

    #[test]
    fn test_similar_documents() -> Result<()> {
        let (_dir, service) = service_over(documents());
        let similar = service.similar_documents(2, 11, 2)?;
        assert_eq!(similar.len(), 2);
        assert!(similar.iter().all(|r| r.document_id != 11));
        assert!(service.similar_documents(2, 1, 2)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_document_change_is_picked_up() -> Result<()> {
        let docs = documents();
        let (_dir, service) = service_over(Arc::clone(&docs));
        assert_eq!(ids(&service.semantic_search(1, "kitten", 5, 0.5)?), vec![1]);

        docs.upsert(Document::new(4, 1, "Kitten", "A kitten is a young cat"));
        service.note_document_change(1);
        assert_eq!(ids(&service.semantic_search(1, "kitten", 5, 0.5)?), vec![4, 1]);
        assert_eq!(service.status(1).index_generation, Some(1));
        Ok(())
    }

    #[test]
    fn test_model_failure_is_reported_distinctly() {
        let docs = documents();
        let model = Arc::new(ModelHandle::new(
            "missing",
            Box::new(|| Err(IndexError::ModelUnavailable("no weights".to_string()))),
        ));
        let (_dir, manager) = manager_with(Arc::clone(&model), Arc::clone(&docs));
        let service = SearchService::new(model, manager, docs);

        let err = service.semantic_search(1, "cats", 5, 0.0).unwrap_err();
        assert!(err.is_service_unavailable());

        // Lexical-only retrieval does not need the model.
        let ranked = service
            .hybrid_search(1, "cats", HybridWeights::new(0.0, 0.3), 5)
            .unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_owner_isolation_under_concurrent_rebuilds() {
        let (_dir, service) = service_over(documents());
        let service = Arc::new(service);
        let owner_docs = |owner: OwnerId| -> Vec<DocumentId> {
            if owner == 1 {
                vec![1, 2, 3]
            } else {
                vec![10, 11, 12]
            }
        };

        thread::scope(|s| {
            for worker in 0..8 {
                let service = Arc::clone(&service);
                s.spawn(move || {
                    let owner: OwnerId = if worker % 2 == 0 { 1 } else { 2 };
                    let query = if owner == 1 { "cats" } else { "finance" };
                    for round in 0..25 {
                        if round % 5 == worker % 5 {
                            service.rebuild_index(owner).unwrap();
                        }
                        let results = service.semantic_search(owner, query, 10, -1.0).unwrap();
                        assert!(!results.is_empty());
                        assert!(results.iter().all(|r| owner_docs(owner).contains(&r.document_id)));

                        let hybrid = service
                            .hybrid_search(owner, query, HybridWeights::default(), 10)
                            .unwrap();
                        assert!(hybrid.iter().all(|r| owner_docs(owner).contains(&r.document_id)));
                    }
                });
            }
        });
    }

    #[test]
    fn test_repeated_queries_are_identical() -> Result<()> {
        let (_dir, service) = service_over(documents());
        let first = service.hybrid_search(2, "stock", HybridWeights::default(), 10)?;
        for _ in 0..5 {
            assert_eq!(service.hybrid_search(2, "stock", HybridWeights::default(), 10)?, first);
        }
        Ok(())
    }
}

//! Semantic query engine - embeds a query and searches an owner's resident index
//!
//! The engine never loads or rebuilds indices; that is the lifecycle
//! manager's job. An owner with nothing resident gets no results.

use std::sync::Arc;
use tracing::debug;

use super::embedding::ModelHandle;
use super::lifecycle::IndexLifecycleManager;
use super::user_index::UserIndex;
use crate::core::document::{DocumentId, OwnerId};
use crate::error::Result;

/// A document and its similarity to the query, in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub document_id: DocumentId,
    pub score: f32,
}

pub struct SemanticQueryEngine {
    model: Arc<ModelHandle>,
    indices: Arc<IndexLifecycleManager>,
}

impl SemanticQueryEngine {
    pub fn new(model: Arc<ModelHandle>, indices: Arc<IndexLifecycleManager>) -> Self {
        Self { model, indices }
    }

    /// Top-`k` documents of `owner` most similar to `text`
    pub fn query(&self, owner: OwnerId, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        match self.indices.resident(owner) {
            Some(index) => self.query_index(&index, text, k),
            None => Ok(Vec::new()),
        }
    }

    /// Same as [`query`](Self::query) against an index the caller already holds
    pub fn query_index(&self, index: &UserIndex, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.model.encode_one(text)?;
        let results = index.search(query.as_slice(), k);
        debug!(owner = index.owner_id(), k, hits = results.len(), "semantic query");
        Ok(results)
    }

    /// Documents closest to an already indexed document, excluding itself
    pub fn similar_in(&self, index: &UserIndex, document: DocumentId, k: usize) -> Vec<SearchResult> {
        let Some(vector) = index.vector_of(document) else {
            return Vec::new();
        };

        index
            .search(vector, k.saturating_add(1))
            .into_iter()
            .filter(|r| r.document_id != document)
            .take(k)
            .collect()
    }
}

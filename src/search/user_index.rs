//! Per-owner index aggregate
//!
//! A `UserIndex` pairs a [`VectorIndex`] with the document ids stored at each
//! position. It is built whole and never patched: a rebuild produces a new
//! aggregate that replaces the old one.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::embedding::EmbeddingVector;
use super::engine::SearchResult;
use super::vector_index::VectorIndex;
use crate::core::document::{DocumentId, OwnerId};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct UserIndex {
    owner_id: OwnerId,
    document_ids: Vec<DocumentId>,
    vectors: VectorIndex,
    model_name: String,
    created_at: DateTime<Utc>,
    generation: u64,
}

impl UserIndex {
    /// Build from `(document_id, vector)` pairs in order. A repeated
    /// document id keeps its first vector.
    pub fn build(
        owner_id: OwnerId,
        model_name: &str,
        dimension: usize,
        generation: u64,
        entries: impl IntoIterator<Item = (DocumentId, EmbeddingVector)>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut document_ids = Vec::new();
        let mut rows = Vec::new();

        for (id, vector) in entries {
            if seen.insert(id) {
                document_ids.push(id);
                rows.push(vector.into_values());
            }
        }

        Ok(Self {
            owner_id,
            document_ids,
            vectors: VectorIndex::build(dimension, rows)?,
            model_name: model_name.to_string(),
            created_at: Utc::now(),
            generation,
        })
    }

    /// Reassemble a persisted index. Callers check alignment first.
    pub(crate) fn from_parts(
        owner_id: OwnerId,
        document_ids: Vec<DocumentId>,
        vectors: VectorIndex,
        model_name: String,
        created_at: DateTime<Utc>,
        generation: u64,
    ) -> Self {
        debug_assert_eq!(document_ids.len(), vectors.len());
        Self {
            owner_id,
            document_ids,
            vectors,
            model_name,
            created_at,
            generation,
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn document_ids(&self) -> &[DocumentId] {
        &self.document_ids
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.document_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.document_ids.contains(&id)
    }

    /// Stored vector of a document, if it is indexed
    pub fn vector_of(&self, id: DocumentId) -> Option<&[f32]> {
        let position = self.document_ids.iter().position(|d| *d == id)?;
        self.vectors.vector(position)
    }

    /// Top-`k` documents for a query vector
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        self.vectors
            .search(query, k)
            .into_iter()
            .filter_map(|(position, score)| {
                self.document_ids.get(position).map(|&document_id| SearchResult {
                    document_id,
                    score,
                })
            })
            .collect()
    }
}

//! Hybrid ranking - folds lexical hits into semantic scores
//!
//! combined = semantic_score * semantic_weight + (lexical hit ? keyword_weight : 0)
//!
//! Ties keep the order in which documents were first seen, semantic results
//! before lexical hits, so a fixed input always ranks the same way.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::engine::SearchResult;
use crate::core::document::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HybridScore {
    pub document_id: DocumentId,
    pub score: f32,
}

/// Relative weight of each retrieval source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub semantic: f32,
    pub keyword: f32,
}

impl HybridWeights {
    pub fn new(semantic: f32, keyword: f32) -> Self {
        Self { semantic, keyword }
    }

    /// A zero weight switches the source off entirely
    pub fn uses_semantic(&self) -> bool {
        self.semantic != 0.0
    }

    pub fn uses_keyword(&self) -> bool {
        self.keyword != 0.0
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::new(0.7, 0.3)
    }
}

/// Running score per document, remembering first-seen order
#[derive(Debug, Default)]
struct ScoreTable {
    slots: HashMap<DocumentId, usize>,
    entries: Vec<HybridScore>,
}

impl ScoreTable {
    fn add(&mut self, document_id: DocumentId, amount: f32) {
        let entries = &mut self.entries;
        let slot = *self.slots.entry(document_id).or_insert_with(|| {
            entries.push(HybridScore {
                document_id,
                score: 0.0,
            });
            entries.len() - 1
        });
        self.entries[slot].score += amount;
    }

    fn into_ranked(mut self, limit: usize) -> Vec<HybridScore> {
        // Stable sort: equal scores stay in first-seen order.
        self.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.entries.truncate(limit);
        self.entries
    }
}

/// Merge semantic results and lexical hits into one ranking of at most `limit`
pub fn merge(
    semantic: &[SearchResult],
    lexical: &[DocumentId],
    weights: HybridWeights,
    limit: usize,
) -> Vec<HybridScore> {
    let mut table = ScoreTable::default();

    if weights.uses_semantic() {
        for result in semantic {
            table.add(result.document_id, result.score * weights.semantic);
        }
    }
    if weights.uses_keyword() {
        // A document either matched the keyword or not; repeats count once.
        let mut matched = HashSet::with_capacity(lexical.len());
        for &id in lexical {
            if matched.insert(id) {
                table.add(id, weights.keyword);
            }
        }
    }

    table.into_ranked(limit)
}

//! Test doubles: a concept-table embedding model and manager fixtures

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use super::embedding::{tokenize, EmbeddingModel, EmbeddingVector, ModelHandle};
use super::lifecycle::{IndexLifecycleManager, LifecycleOptions};
use super::store::IndexStore;
use crate::core::document::{Document, DocumentId, DocumentStore, OwnerId};
use crate::core::paths::IndexPaths;
use crate::error::{IndexError, Result};

pub const CONCEPT_MODEL_NAME: &str = "concept-5";

/// Each known word votes for one axis; unknown words are ignored.
const CONCEPTS: &[&[&str]] = &[
    &["cat", "cats", "feline", "kitten", "kittens"],
    &["pet", "pets", "companion", "companions"],
    &["dog", "dogs", "canine", "loyal", "puppy"],
    &["stock", "stocks", "market", "markets", "trends", "finance", "budget", "investment"],
    &["car", "cars", "engine", "road"],
];

/// Deterministic stand-in for a real sentence model
pub struct ConceptModel;

impl EmbeddingModel for ConceptModel {
    fn name(&self) -> &str {
        CONCEPT_MODEL_NAME
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut values = vec![0.0f32; CONCEPTS.len()];
                for token in tokenize(text) {
                    if let Some(axis) = CONCEPTS.iter().position(|c| c.contains(&token.as_str())) {
                        values[axis] += 1.0;
                    }
                }
                EmbeddingVector::normalized(values, CONCEPT_MODEL_NAME)
            })
            .collect())
    }
}

pub fn concept_model() -> Arc<ModelHandle> {
    Arc::new(ModelHandle::from_model(Arc::new(ConceptModel)))
}

/// Document store whose reads always fail
pub struct FailingStore;

impl DocumentStore for FailingStore {
    fn indexable_documents(&self, _owner: OwnerId) -> Result<Vec<Document>> {
        Err(IndexError::DocumentStore("connection refused".to_string()))
    }

    fn document(&self, _owner: OwnerId, _id: DocumentId) -> Result<Option<Document>> {
        Err(IndexError::DocumentStore("connection refused".to_string()))
    }
}

pub fn manager_at(
    root: &Path,
    model: Arc<ModelHandle>,
    documents: Arc<impl DocumentStore + 'static>,
    options: LifecycleOptions,
) -> Arc<IndexLifecycleManager> {
    let store = IndexStore::new(IndexPaths::from_root(root.to_path_buf()));
    Arc::new(IndexLifecycleManager::new(store, documents, model, options))
}

pub fn manager_with_options(
    model: Arc<ModelHandle>,
    documents: Arc<impl DocumentStore + 'static>,
    options: LifecycleOptions,
) -> (TempDir, Arc<IndexLifecycleManager>) {
    let dir = TempDir::new().expect("temp dir");
    let manager = manager_at(dir.path(), model, documents, options);
    (dir, manager)
}

pub fn manager_with(
    model: Arc<ModelHandle>,
    documents: Arc<impl DocumentStore + 'static>,
) -> (TempDir, Arc<IndexLifecycleManager>) {
    manager_with_options(model, documents, LifecycleOptions::default())
}

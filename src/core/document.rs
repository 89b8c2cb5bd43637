//! Document model and the collaborator contracts the index consumes

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;

pub type OwnerId = i64;
pub type DocumentId = i64;

/// A stored document as seen by the indexing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    pub title: String,
    pub content: Option<String>,
}

impl Document {
    pub fn new(id: DocumentId, owner_id: OwnerId, title: &str, content: &str) -> Self {
        Self {
            id,
            owner_id,
            title: title.to_string(),
            content: Some(content.to_string()),
        }
    }

    /// Text fed to the embedding model: title and content joined,
    /// or the title alone when there is no content.
    pub fn index_text(&self) -> String {
        match self.content.as_deref() {
            Some(content) if !content.trim().is_empty() => format!("{}. {}", self.title, content),
            _ => self.title.clone(),
        }
    }

    /// Only documents with stored content take part in the semantic index.
    pub fn has_content(&self) -> bool {
        self.content.as_deref().map(|c| !c.is_empty()).unwrap_or(false)
    }

    fn matches_substring(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self
                .content
                .as_deref()
                .map(|c| c.to_lowercase().contains(needle_lower))
                .unwrap_or(false)
    }
}

/// Source of document text for index rebuilds.
pub trait DocumentStore: Send + Sync {
    /// All documents of `owner` with non-empty content, ordered by id.
    fn indexable_documents(&self, owner: OwnerId) -> Result<Vec<Document>>;

    /// A single document, scoped to its owner.
    fn document(&self, owner: OwnerId, id: DocumentId) -> Result<Option<Document>>;
}

/// Black-box lexical search: which of the owner's documents contain `query`.
pub trait LexicalMatcher: Send + Sync {
    fn matching_ids(&self, owner: OwnerId, query: &str, limit: usize) -> Result<Vec<DocumentId>>;
}

/// In-process document store, used by tests and embedders of the library
/// that keep documents elsewhere.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<DocumentId, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        for doc in docs {
            store.upsert(doc);
        }
        store
    }

    pub fn upsert(&self, doc: Document) {
        self.docs.write().insert(doc.id, doc);
    }

    pub fn remove(&self, id: DocumentId) -> Option<Document> {
        self.docs.write().remove(&id)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn indexable_documents(&self, owner: OwnerId) -> Result<Vec<Document>> {
        Ok(self
            .docs
            .read()
            .values()
            .filter(|d| d.owner_id == owner && d.has_content())
            .cloned()
            .collect())
    }

    fn document(&self, owner: OwnerId, id: DocumentId) -> Result<Option<Document>> {
        Ok(self
            .docs
            .read()
            .get(&id)
            .filter(|d| d.owner_id == owner)
            .cloned())
    }
}

impl LexicalMatcher for MemoryDocumentStore {
    fn matching_ids(&self, owner: OwnerId, query: &str, limit: usize) -> Result<Vec<DocumentId>> {
        let needle = query.to_lowercase();
        Ok(self
            .docs
            .read()
            .values()
            .filter(|d| d.owner_id == owner && d.matches_substring(&needle))
            .map(|d| d.id)
            .take(limit)
            .collect())
    }
}

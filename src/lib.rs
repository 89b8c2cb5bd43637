//! docvault-index library
//!
//! Per-owner semantic indexing and hybrid retrieval for a document vault.
//!
//! # Modules
//!
//! - `core`: documents, collaborator contracts, on-disk layout
//! - `search`: embedding, vector index, persistence, lifecycle, ranking
//! - `service`: the retrieval operations an API layer calls
//! - `config`: YAML + environment configuration

pub mod config;
pub mod core;
pub mod error;
pub mod search;
pub mod service;

// Re-exports for convenience
pub use config::EngineConfig;
pub use crate::core::document::{
    Document, DocumentId, DocumentStore, LexicalMatcher, MemoryDocumentStore, OwnerId,
};
pub use crate::core::sqlite::SqliteDocumentStore;
pub use error::{IndexError, Result};
pub use search::{HybridScore, HybridWeights, SearchResult};
pub use service::SearchService;

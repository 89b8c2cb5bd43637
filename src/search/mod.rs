//! Per-owner semantic indexing and hybrid retrieval
//!
//! - `embedding`: model contract, lazy model handle, bundled HTP model
//! - `vector_index`: exact inner-product search
//! - `user_index`: one owner's ids + vectors
//! - `store`: persistence under `indices/user_<owner>/`
//! - `lifecycle`: per-owner cache, load-or-rebuild
//! - `engine`: query embedding + search
//! - `hybrid`: semantic + lexical merge

pub mod embedding;
pub mod engine;
pub mod hybrid;
pub mod lifecycle;
pub mod store;
pub mod user_index;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod testing;

pub use embedding::{EmbeddingModel, EmbeddingVector, HarmonicEmbedder, ModelHandle};
pub use engine::{SearchResult, SemanticQueryEngine};
pub use hybrid::{HybridScore, HybridWeights};
pub use lifecycle::{IndexLifecycleManager, IndexPhase, IndexStatus, LifecycleOptions, StalenessPolicy};
pub use store::{IndexStore, LoadOutcome};
pub use user_index::UserIndex;
pub use vector_index::VectorIndex;

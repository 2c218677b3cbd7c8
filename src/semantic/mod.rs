//! Word-similarity exploration.
//!
//! # Architecture
//!
//! - `embeddings`: embedding provider trait and the fastembed implementation
//! - `cache`: session-wide memo of text -> vector
//! - `resolver`: batched, cache-backed resolution of word lists
//! - `compute`: cosine similarity engine with accelerated and sequential paths
//! - `categories`: semantic category table and vocabulary
//! - `ranking`: category/length adjusted ranking with threshold relaxation
//! - `expression`: `word + word - word` parsing and vector arithmetic
//! - `graph`: two-level neighbor graph
//! - `service`: query orchestration and generation tracking

mod cache;
mod categories;
pub mod compute;
pub mod embeddings;
mod expression;
mod graph;
mod ranking;
mod resolver;
mod service;

pub use cache::Embedding;
pub use categories::{Category, CategoryError, CategoryModel, CategoryStats};
pub use compute::{ComputeError, SimilarityEngine};
pub use embeddings::EmbeddingModel;
pub use graph::Level;
pub use ranking::Cutoff;
pub use service::{Exploration, Explorer, ExplorerError, ExplorerStatus};

#[cfg(test)]
pub use {
    compute::WorkGroupBackend,
    embeddings::{EmbeddingError, EmbeddingProvider},
    graph::{GraphBuilder, NeighborGraph},
    ranking::{Candidate, Ranker},
    resolver::{BatchResolver, ResolveError},
    service::QueryKind,
};

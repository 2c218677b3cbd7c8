//! Query orchestration.
//!
//! `Explorer` owns the session-wide pieces (resolver with its cache, compute
//! engine, ranker) and runs a query end to end:
//!
//! 1. take a generation token
//! 2. resolve the query vector and the candidate vectors
//! 3. score, rank (with threshold relaxation) and optionally build the graph
//! 4. settle: results whose token has been superseded are marked stale and
//!    never become the session's latest result

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::config::{Config, GraphConfig, RankingConfig};

use super::cache::normalize_key;
use super::categories::CategoryModel;
use super::compute::{ComputeError, EngineStatus, SimilarityEngine};
use super::embeddings::EmbeddingProvider;
use super::expression::{Expression, ExpressionError};
use super::graph::{GraphBuilder, NeighborGraph};
use super::ranking::{Candidate, Ranker};
use super::resolver::{BatchResolver, ResolveError};

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("malformed expression: {0}")]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl ExplorerError {
    /// True when the caller sent something unusable.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Self::EmptyQuery | Self::Expression(_))
    }

    /// True when the embedding provider failed.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Resolve(ResolveError::Provider { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Search,
    Compute,
}

/// Result of one query.
#[derive(Debug, Clone, Serialize)]
pub struct Exploration {
    pub generation: u64,
    pub kind: QueryKind,
    pub query: String,
    pub results: Vec<Candidate>,
    /// The primary threshold matched nothing and the fallback was used
    pub relaxed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<NeighborGraph>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplorerStatus {
    pub compute: EngineStatus,
    pub model: String,
    pub cached_words: usize,
    pub generation: u64,
    pub vocabulary: usize,
}

pub struct Explorer {
    resolver: BatchResolver,
    engine: SimilarityEngine,
    ranker: Ranker,
    ranking: RankingConfig,
    graph: GraphConfig,
    batch_size: usize,
    generation: AtomicU64,
    latest: RwLock<Option<Arc<Exploration>>>,
}

impl Explorer {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        engine: SimilarityEngine,
        categories: Arc<CategoryModel>,
        config: &Config,
    ) -> Self {
        Self {
            resolver: BatchResolver::new(provider),
            engine,
            ranker: Ranker::new(categories),
            ranking: config.ranking.clone(),
            graph: config.graph.clone(),
            batch_size: config.resolver.batch_size,
            generation: AtomicU64::new(0),
            latest: RwLock::new(None),
        }
    }

    pub fn categories(&self) -> &CategoryModel {
        self.ranker.categories()
    }

    /// Take the next generation token.
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Words most similar to `word`.
    pub async fn search(&self, word: &str, with_graph: bool) -> Result<Exploration, ExplorerError> {
        let generation = self.begin();
        let exploration = self.run_search(generation, word, with_graph).await?;
        Ok(self.settle(exploration))
    }

    /// Words most similar to the combined vector of `expression`.
    pub async fn compute(
        &self,
        expression: &str,
        with_graph: bool,
    ) -> Result<Exploration, ExplorerError> {
        let generation = self.begin();
        let exploration = self
            .run_compute(generation, expression, with_graph)
            .await?;
        Ok(self.settle(exploration))
    }

    pub(crate) async fn run_search(
        &self,
        generation: u64,
        word: &str,
        with_graph: bool,
    ) -> Result<Exploration, ExplorerError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(ExplorerError::EmptyQuery);
        }
        let input_words = vec![normalize_key(word)];

        let query = self.resolver.resolve(word).await?;
        let (results, relaxed) = self.rank_vocabulary(&query, word, &input_words).await?;

        let graph = if with_graph {
            Some(self.build_graph(word, &results, &input_words).await)
        } else {
            None
        };

        Ok(Exploration {
            generation,
            kind: QueryKind::Search,
            query: word.to_string(),
            results,
            relaxed,
            graph,
            stale: false,
        })
    }

    pub(crate) async fn run_compute(
        &self,
        generation: u64,
        expression: &str,
        with_graph: bool,
    ) -> Result<Exploration, ExplorerError> {
        let parsed = Expression::parse(expression)?;
        let input_words = parsed.words();

        let term_vectors = self
            .resolver
            .resolve_many(&input_words, self.batch_size)
            .await?;
        let query = parsed.combine(&term_vectors);

        let base_word = &input_words[0];
        let (results, relaxed) = self
            .rank_vocabulary(&query, base_word, &input_words)
            .await?;

        let central = expression.trim();
        let graph = if with_graph {
            Some(self.build_graph(central, &results, &input_words).await)
        } else {
            None
        };

        Ok(Exploration {
            generation,
            kind: QueryKind::Compute,
            query: central.to_string(),
            results,
            relaxed,
            graph,
            stale: false,
        })
    }

    /// Score the vocabulary (minus the input words) against `query`.
    async fn rank_vocabulary(
        &self,
        query: &[f32],
        base_word: &str,
        input_words: &[String],
    ) -> Result<(Vec<Candidate>, bool), ExplorerError> {
        let words: Vec<&str> = self
            .categories()
            .vocabulary()
            .iter()
            .filter(|w| !input_words.contains(*w))
            .map(String::as_str)
            .collect();

        let vectors = self.resolver.resolve_many(&words, self.batch_size).await?;
        let raw = self.engine.cosine_similarities(query, &vectors).await?;

        let ranked = self.ranker.rank_with_fallback(
            base_word,
            &words,
            &raw,
            self.ranking.primary(),
            self.ranking.fallback(),
        );
        Ok((ranked.candidates, ranked.relaxed))
    }

    async fn build_graph(
        &self,
        central: &str,
        results: &[Candidate],
        input_words: &[String],
    ) -> NeighborGraph {
        GraphBuilder::new(&self.resolver, &self.engine, &self.ranker, &self.graph)
            .build(central, results, input_words)
            .await
    }

    /// Mark `exploration` stale if a later query has started, otherwise
    /// record it as the latest result.
    pub(crate) fn settle(&self, mut exploration: Exploration) -> Exploration {
        let current = self.current_generation();
        if exploration.generation < current {
            log::debug!(
                "discarding stale result for '{}' (generation {} < {current})",
                exploration.query,
                exploration.generation
            );
            exploration.stale = true;
            return exploration;
        }

        let mut latest = self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let newer_recorded = latest
            .as_ref()
            .is_some_and(|l| l.generation > exploration.generation);
        if newer_recorded {
            exploration.stale = true;
        } else {
            *latest = Some(Arc::new(exploration.clone()));
        }
        exploration
    }

    /// Most recent non-stale result.
    pub fn latest(&self) -> Option<Arc<Exploration>> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn status(&self) -> ExplorerStatus {
        ExplorerStatus {
            compute: self.engine.status(),
            model: self.resolver.provider_name().to_string(),
            cached_words: self.resolver.cached(),
            generation: self.current_generation(),
            vocabulary: self.categories().vocabulary().len(),
        }
    }
}

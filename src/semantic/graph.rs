//! Two-level neighbor graph around a query.
//!
//! The central node is the query itself. Ranked candidates become the first
//! level; the first few of those are expanded once more against the
//! vocabulary to produce the second level. Expansion failures are contained
//! per parent: the parent simply contributes no children.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::GraphConfig;

use super::compute::SimilarityEngine;
use super::ranking::{Candidate, Cutoff, Ranker};
use super::resolver::BatchResolver;

pub const CENTRAL_CATEGORY: &str = "central";
const CENTRAL_COLOR: &str = "#6366f1";
const CENTRAL_SIZE: f64 = 28.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Central,
    First,
    Second,
}

impl Level {
    /// Visual size hint for a node at this level.
    pub fn size(self, similarity: f64) -> f64 {
        match self {
            Level::Central => CENTRAL_SIZE,
            Level::First => 14.0 + similarity * 10.0,
            Level::Second => 8.0 + similarity * 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub similarity: f64,
    pub category: String,
    pub level: Level,
    pub size: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub strength: f64,
    pub level: Level,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NeighborGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl NeighborGraph {
    pub fn nodes_at(&self, level: Level) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(move |n| n.level == level)
    }

    fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }
}

pub struct GraphBuilder<'a> {
    resolver: &'a BatchResolver,
    engine: &'a SimilarityEngine,
    ranker: &'a Ranker,
    config: &'a GraphConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        resolver: &'a BatchResolver,
        engine: &'a SimilarityEngine,
        ranker: &'a Ranker,
        config: &'a GraphConfig,
    ) -> Self {
        Self {
            resolver,
            engine,
            ranker,
            config,
        }
    }

    /// Build the graph for `central_id` from its ranked results.
    ///
    /// `input_words` are the lower-cased query words; they never show up as
    /// second-level nodes.
    pub async fn build(
        &self,
        central_id: &str,
        ranked: &[Candidate],
        input_words: &[String],
    ) -> NeighborGraph {
        let mut graph = NeighborGraph::default();

        graph.nodes.push(GraphNode {
            id: central_id.to_string(),
            similarity: 1.0,
            category: CENTRAL_CATEGORY.to_string(),
            level: Level::Central,
            size: Level::Central.size(1.0),
            color: CENTRAL_COLOR.to_string(),
            parent: None,
        });

        let first_level: Vec<&Candidate> = ranked
            .iter()
            .filter(|c| c.word != central_id)
            .take(self.config.first_level_size)
            .collect();

        for candidate in &first_level {
            graph.nodes.push(self.node(candidate, Level::First, None));
            graph.edges.push(GraphEdge {
                source: central_id.to_string(),
                target: candidate.word.clone(),
                strength: candidate.adjusted_similarity,
                level: Level::First,
            });
        }

        let mut excluded: HashSet<String> = input_words.iter().cloned().collect();
        excluded.extend(first_level.iter().map(|c| c.word.to_lowercase()));

        for parent in first_level.iter().take(self.config.expanded_parents) {
            let children = match self.expand(&parent.word, &excluded).await {
                Ok(children) => children,
                Err(err) => {
                    log::warn!("skipping second level for '{}': {err}", parent.word);
                    continue;
                }
            };

            for child in children {
                if graph.contains(&child.word) {
                    continue;
                }
                graph.edges.push(GraphEdge {
                    source: parent.word.clone(),
                    target: child.word.clone(),
                    strength: child.adjusted_similarity * self.config.second_level_strength_factor,
                    level: Level::Second,
                });
                graph
                    .nodes
                    .push(self.node(&child, Level::Second, Some(parent.word.clone())));
            }
        }

        graph
    }

    /// Rank the vocabulary against one first-level word.
    async fn expand(
        &self,
        parent: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Candidate>, ExpansionError> {
        let parent_key = parent.to_lowercase();
        let query = self.resolver.resolve(parent).await?;

        let words: Vec<&str> = self
            .ranker
            .categories()
            .vocabulary()
            .iter()
            .filter(|w| **w != parent_key && !excluded.contains(*w))
            .take(self.config.second_level_max_candidates)
            .map(String::as_str)
            .collect();

        let vectors = self
            .resolver
            .resolve_many(&words, self.config.second_level_batch_size)
            .await?;
        let raw = self.engine.cosine_similarities(&query, &vectors).await?;

        let cutoff = Cutoff::new(
            self.config.second_level_threshold,
            self.config.second_level_top_k,
        );
        Ok(self.ranker.rank(parent, &words, &raw, cutoff))
    }

    fn node(&self, candidate: &Candidate, level: Level, parent: Option<String>) -> GraphNode {
        GraphNode {
            id: candidate.word.clone(),
            similarity: candidate.adjusted_similarity,
            category: candidate.category.clone(),
            level,
            size: level.size(candidate.adjusted_similarity),
            color: self
                .ranker
                .categories()
                .color_of(&candidate.category)
                .to_string(),
            parent,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ExpansionError {
    #[error(transparent)]
    Resolve(#[from] super::resolver::ResolveError),

    #[error(transparent)]
    Compute(#[from] super::compute::ComputeError),
}

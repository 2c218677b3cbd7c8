use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{Config, GraphConfig};
use crate::semantic::{
    BatchResolver, Candidate, CategoryModel, Explorer, GraphBuilder, Level, NeighborGraph,
    Ranker, SimilarityEngine,
};
use crate::tests::stubs::{CountingProvider, OneHotProvider};

/// rainha and príncipe are first level for rei; princesa hangs off rainha,
/// imperador off príncipe and coroa is close to both.
fn court() -> OneHotProvider {
    OneHotProvider::new()
        .with("rei", &[(0, 1.0)])
        .with("rainha", &[(0, 0.6), (1, 0.8)])
        .with("príncipe", &[(0, 0.6), (2, 0.8)])
        .with("princesa", &[(0, 0.1), (1, 0.9), (4, 0.424)])
        .with("imperador", &[(0, 0.1), (2, 0.9), (5, 0.424)])
        .with("coroa", &[(0, 0.05), (1, 0.7), (2, 0.7), (3, 0.132)])
}

fn explorer(provider: OneHotProvider) -> Explorer {
    Explorer::new(
        Arc::new(provider),
        SimilarityEngine::sequential(),
        Arc::new(CategoryModel::builtin()),
        &Config::default(),
    )
}

fn ids(graph: &NeighborGraph, level: Level) -> Vec<&str> {
    graph.nodes_at(level).map(|n| n.id.as_str()).collect()
}

fn assert_well_formed(graph: &NeighborGraph) {
    let central: Vec<_> = graph.nodes_at(Level::Central).collect();
    assert_eq!(central.len(), 1);
    let central_id = &central[0].id;

    let first: HashSet<&str> = graph.nodes_at(Level::First).map(|n| n.id.as_str()).collect();
    assert!(first.len() <= 8);
    for id in &first {
        let incoming: Vec<_> = graph.edges.iter().filter(|e| e.target == *id).collect();
        assert_eq!(incoming.len(), 1, "first node {id}");
        assert_eq!(&incoming[0].source, central_id);
        assert_eq!(incoming[0].level, Level::First);
    }

    for node in graph.nodes_at(Level::Second) {
        let incoming: Vec<_> = graph.edges.iter().filter(|e| e.target == node.id).collect();
        assert_eq!(incoming.len(), 1, "second node {}", node.id);
        assert_eq!(incoming[0].level, Level::Second);
        assert!(first.contains(incoming[0].source.as_str()));
        assert_eq!(node.parent.as_deref(), Some(incoming[0].source.as_str()));
    }

    let unique: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(unique.len(), graph.nodes.len(), "node ids are unique");
}

#[tokio::test]
async fn test_two_level_graph() {
    let explorer = explorer(court());
    let result = explorer.search("rei", true).await.unwrap();
    let graph = result.graph.expect("graph requested");

    assert_well_formed(&graph);
    assert_eq!(ids(&graph, Level::Central), vec!["rei"]);
    assert_eq!(ids(&graph, Level::First), vec!["rainha", "príncipe"]);
    // parent order, then rank order; coroa is claimed by rainha first
    assert_eq!(
        ids(&graph, Level::Second),
        vec!["princesa", "coroa", "imperador"]
    );

    let coroa = graph.nodes.iter().find(|n| n.id == "coroa").unwrap();
    assert_eq!(coroa.parent.as_deref(), Some("rainha"));
    assert_eq!(coroa.category, "realeza");

    let edge = graph.edges.iter().find(|e| e.target == "coroa").unwrap();
    assert!((edge.strength - coroa.similarity * 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_node_sizes_and_colors() {
    let explorer = explorer(court());
    let graph = explorer.search("rei", true).await.unwrap().graph.unwrap();

    let central = &graph.nodes[0];
    assert_eq!(central.level, Level::Central);
    assert_eq!(central.size, 28.0);
    assert_eq!(central.similarity, 1.0);
    assert_eq!(central.category, "central");

    for node in graph.nodes_at(Level::First) {
        assert!((node.size - (14.0 + node.similarity * 10.0)).abs() < 1e-9);
        assert_eq!(node.color, "#f59e0b");
    }
    for node in graph.nodes_at(Level::Second) {
        assert!((node.size - (8.0 + node.similarity * 5.0)).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_first_level_edges_carry_adjusted_similarity() {
    let explorer = explorer(court());
    let result = explorer.search("rei", true).await.unwrap();
    let graph = result.graph.unwrap();

    for candidate in result.results.iter().take(8) {
        let edge = graph
            .edges
            .iter()
            .find(|e| e.target == candidate.word)
            .unwrap();
        assert_eq!(edge.strength, candidate.adjusted_similarity);
    }
}

#[tokio::test]
async fn test_no_graph_unless_requested() {
    let explorer = explorer(court());
    let result = explorer.search("rei", false).await.unwrap();
    assert!(result.graph.is_none());
}

#[tokio::test]
async fn test_compute_graph_centers_on_expression() {
    let provider = court()
        .with("homem", &[(6, 1.0)])
        .with("mulher", &[(7, 1.0)]);
    let explorer = explorer(provider);

    let result = explorer.compute("rei + mulher - homem", true).await.unwrap();
    let graph = result.graph.unwrap();

    assert_well_formed(&graph);
    assert_eq!(ids(&graph, Level::Central), vec!["rei + mulher - homem"]);
    for node in &graph.nodes {
        assert!(node.id != "rei" && node.id != "mulher" && node.id != "homem");
    }
}

fn candidate(word: &str, adjusted: f64) -> Candidate {
    Candidate {
        word: word.to_string(),
        adjusted_similarity: adjusted,
        raw_similarity: adjusted,
        category: "general".to_string(),
    }
}

#[tokio::test]
async fn test_failed_parent_contributes_nothing() {
    let resolver = BatchResolver::new(Arc::new(court().failing("quebrado")));
    let engine = SimilarityEngine::sequential();
    let ranker = Ranker::new(Arc::new(CategoryModel::builtin()));
    let config = GraphConfig::default();

    let ranked = vec![candidate("quebrado", 0.9), candidate("rainha", 0.8)];
    let graph = GraphBuilder::new(&resolver, &engine, &ranker, &config)
        .build("rei", &ranked, &["rei".to_string()])
        .await;

    assert_well_formed(&graph);
    assert_eq!(ids(&graph, Level::First), vec!["quebrado", "rainha"]);
    let second = ids(&graph, Level::Second);
    assert!(second.contains(&"princesa"));
    assert!(graph
        .nodes_at(Level::Second)
        .all(|n| n.parent.as_deref() == Some("rainha")));
}

#[tokio::test]
async fn test_graph_limits_follow_config() {
    let resolver = BatchResolver::new(Arc::new(court()));
    let engine = SimilarityEngine::sequential();
    let ranker = Ranker::new(Arc::new(CategoryModel::builtin()));
    let config = GraphConfig {
        first_level_size: 1,
        expanded_parents: 1,
        second_level_top_k: 1,
        ..GraphConfig::default()
    };

    let ranked = vec![candidate("rainha", 0.9), candidate("príncipe", 0.8)];
    let graph = GraphBuilder::new(&resolver, &engine, &ranker, &config)
        .build("rei", &ranked, &["rei".to_string()])
        .await;

    assert_eq!(ids(&graph, Level::First), vec!["rainha"]);
    assert_eq!(ids(&graph, Level::Second), vec!["princesa"]);
}

#[tokio::test]
async fn test_second_level_candidate_cap_and_batching() {
    let categories = Arc::new(CategoryModel::builtin());
    // plenty of words left once rei and rainha are excluded
    assert!(categories.vocabulary().len() > 62);

    let provider = Arc::new(CountingProvider::new(32));
    let resolver = BatchResolver::new(provider.clone());
    let engine = SimilarityEngine::sequential();
    let ranker = Ranker::new(categories);
    let config = GraphConfig {
        first_level_size: 1,
        expanded_parents: 1,
        ..GraphConfig::default()
    };

    let ranked = vec![candidate("rainha", 0.9)];
    GraphBuilder::new(&resolver, &engine, &ranker, &config)
        .build("rei", &ranked, &["rei".to_string()])
        .await;

    // the parent itself plus at most 60 candidates
    let seen = provider.seen();
    assert_eq!(seen[0], "rainha");
    assert_eq!(seen.len(), 1 + config.second_level_max_candidates);
    assert!(!seen.iter().any(|w| w == "rei"));
    assert!(provider.peak_in_flight() <= config.second_level_batch_size);
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::info;

/// A neighbor of a MOF in the similarity graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub refcode: String,
    pub score: f64,
}

/// Undirected weighted graph of structurally similar MOFs
///
/// Built from an adjacency mapping `refcode -> {neighbor: score}`. An edge
/// listed only in one direction is usable from both ends. When both
/// directions are listed with different scores, each node keeps the score
/// from its own entry.
#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    adjacency: HashMap<String, HashMap<String, f64>>,
}

impl SimilarityGraph {
    /// Load the adjacency mapping from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read similarity file: {}", path.display()))?;
        let mapping: BTreeMap<String, BTreeMap<String, f64>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse similarity file: {}", path.display()))?;

        let graph = Self::from_adjacency(mapping);
        info!(
            "Loaded similarity graph from {} with {} MOFs and {} edges",
            path.display(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    pub fn from_adjacency(mapping: BTreeMap<String, BTreeMap<String, f64>>) -> Self {
        let mut adjacency: HashMap<String, HashMap<String, f64>> = HashMap::new();

        for (node, neighbors) in &mapping {
            let entry = adjacency.entry(node.clone()).or_default();
            for (neighbor, score) in neighbors {
                entry.insert(neighbor.clone(), *score);
            }
        }

        // Reverse edges fill in only where the node has no explicit score
        for (node, neighbors) in &mapping {
            for (neighbor, score) in neighbors {
                adjacency
                    .entry(neighbor.clone())
                    .or_default()
                    .entry(node.clone())
                    .or_insert(*score);
            }
        }

        Self { adjacency }
    }

    pub fn contains(&self, refcode: &str) -> bool {
        self.adjacency.contains_key(refcode)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges, self loops excluded
    pub fn edge_count(&self) -> usize {
        let directed: usize = self
            .adjacency
            .iter()
            .map(|(node, neighbors)| neighbors.keys().filter(|n| *n != node).count())
            .sum();
        directed / 2
    }

    /// The `top_n` highest scoring neighbors of `refcode`
    ///
    /// Returns `None` when the refcode is not in the graph. Ties are broken
    /// by refcode. A node is never its own neighbor.
    pub fn similar(&self, refcode: &str, top_n: usize) -> Option<Vec<Neighbor>> {
        let neighbors = self.adjacency.get(refcode)?;

        let mut ranked: Vec<Neighbor> = neighbors
            .iter()
            .filter(|(neighbor, _)| neighbor.as_str() != refcode)
            .map(|(neighbor, score)| Neighbor {
                refcode: neighbor.clone(),
                score: *score,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.refcode.cmp(&b.refcode))
        });
        ranked.truncate(top_n);

        Some(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn graph(json: serde_json::Value) -> SimilarityGraph {
        SimilarityGraph::from_adjacency(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn test_neighbors_sorted_by_score() {
        let g = graph(serde_json::json!({
            "ABAFUH": {"BIBCOM": 0.4, "CUBTCX": 0.9, "DAXZAQ": 0.4}
        }));

        let similar = g.similar("ABAFUH", 10).unwrap();
        let order: Vec<&str> = similar.iter().map(|n| n.refcode.as_str()).collect();
        assert_eq!(order, vec!["CUBTCX", "BIBCOM", "DAXZAQ"]);
        assert_eq!(similar[0].score, 0.9);
    }

    #[test]
    fn test_reverse_edges_are_reachable() {
        let g = graph(serde_json::json!({
            "ABAFUH": {"BIBCOM": 0.4}
        }));

        let similar = g.similar("BIBCOM", 5).unwrap();
        assert_eq!(
            similar,
            vec![Neighbor {
                refcode: "ABAFUH".to_string(),
                score: 0.4
            }]
        );
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_explicit_score_wins_over_reverse() {
        let g = graph(serde_json::json!({
            "ABAFUH": {"BIBCOM": 0.4},
            "BIBCOM": {"ABAFUH": 0.7}
        }));

        assert_eq!(g.similar("ABAFUH", 1).unwrap()[0].score, 0.4);
        assert_eq!(g.similar("BIBCOM", 1).unwrap()[0].score, 0.7);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_unknown_refcode_and_truncation() {
        let g = graph(serde_json::json!({
            "ABAFUH": {"ABAFUH": 1.0, "B": 0.1, "C": 0.2, "D": 0.3}
        }));

        assert!(g.similar("NOPE", 5).is_none());
        let similar = g.similar("ABAFUH", 2).unwrap();
        assert_eq!(similar.len(), 2);
        assert!(similar.iter().all(|n| n.refcode != "ABAFUH"));
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("similarity.json");
        fs::write(&path, r#"{"ABAFUH": {"BIBCOM": 0.5}}"#)?;

        let g = SimilarityGraph::load(&path)?;
        assert!(g.contains("ABAFUH"));
        assert!(g.contains("BIBCOM"));

        fs::write(&path, r#"{"ABAFUH": {"BIBCOM": "high"}}"#)?;
        assert!(SimilarityGraph::load(&path).is_err());
        Ok(())
    }
}

//! Impersonation graph assembled from the edges found during a walk.
//!
//! Nodes are identity names, edges point from the impersonating identity to the
//! impersonated one and carry the project whose policy exposed the binding.
//! Only used for reporting; the traversal itself never consults it.

use common::ImpersonationEdge;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed graph of successful impersonations.
#[derive(Debug, Default)]
pub struct ImpersonationGraph {
    graph: DiGraph<String, String>,
    nodes: HashMap<String, NodeIndex>,
}

impl ImpersonationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from seeds plus edges. Seeds with no edges still
    /// appear as isolated nodes.
    pub fn from_edges<'a>(
        seeds: impl IntoIterator<Item = &'a str>,
        edges: &[ImpersonationEdge],
    ) -> Self {
        let mut graph = Self::new();
        for seed in seeds {
            graph.node(seed);
        }
        for edge in edges {
            graph.add_edge(edge);
        }
        graph
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    pub fn add_edge(&mut self, edge: &ImpersonationEdge) {
        let src = self.node(&edge.source);
        let dst = self.node(&edge.target);
        self.graph.add_edge(src, dst, edge.project_id.clone());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Identities reachable from `start` through one or more impersonations,
    /// in BFS order. `start` itself is excluded.
    pub fn reachable_from(&self, start: &str) -> Vec<String> {
        let Some(&start_idx) = self.nodes.get(start) else {
            return Vec::new();
        };

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut out = Vec::new();
        seen.insert(start_idx);
        queue.push_back(start_idx);

        while let Some(idx) = queue.pop_front() {
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                if seen.insert(target) {
                    out.push(self.graph[target].clone());
                    queue.push_back(target);
                }
            }
        }
        out
    }

    /// Graphviz rendering, edges labelled with the project ID.
    pub fn to_dot(&self) -> String {
        let body = format!("{}", Dot::with_config(&self.graph, &[Config::GraphContentOnly]));
        let mut out = String::from("digraph impersonation {\n");
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(project: &str, source: &str, target: &str) -> ImpersonationEdge {
        ImpersonationEdge {
            project_id: project.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    #[test]
    fn test_reachability() {
        let edges = vec![
            edge("p1", "a", "b"),
            edge("p2", "b", "c"),
            edge("p3", "c", "a"),
            edge("p4", "x", "y"),
        ];
        let graph = ImpersonationGraph::from_edges(["a", "lonely"], &edges);

        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.reachable_from("a"), ["b", "c"]);
        assert!(graph.reachable_from("lonely").is_empty());
        assert!(graph.reachable_from("missing").is_empty());
    }

    #[test]
    fn test_dot_output() {
        let graph = ImpersonationGraph::from_edges(["a"], &[edge("p1", "a", "b")]);
        let dot = graph.to_dot();

        assert!(dot.starts_with("digraph impersonation {\n"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("\"a\""));
        assert!(dot.contains("\"b\""));
        assert!(dot.contains("\"p1\""));
    }
}

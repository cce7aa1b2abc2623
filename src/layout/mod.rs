//! Layered left-to-right auto-layout.
//!
//! Positions depend only on the node list, the edge list and their order:
//!
//! 1. Break cycles by reversing DFS back edges (DFS roots are taken in input
//!    order).
//! 2. Rank nodes by longest path from a source, so every edge points to a
//!    strictly higher rank.
//! 3. Order nodes inside each rank with alternating barycenter sweeps.
//! 4. Turn rank and order into top-left pixel coordinates.
//!
//! Self-loops and edges to unknown nodes are ignored.

use std::cmp::Ordering;
use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::models::{NodeId, Position};

/// Node size and spacing used to turn ranks into pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Horizontal gap between adjacent ranks.
    pub rank_spacing: f64,
    /// Vertical gap between adjacent nodes of the same rank.
    pub node_spacing: f64,
    /// Number of down+up barycenter sweep pairs.
    pub sweeps: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 200.0,
            node_height: 100.0,
            rank_spacing: 80.0,
            node_spacing: 50.0,
            sweeps: 4,
        }
    }
}

type FlowDigraph = DiGraph<NodeId, ()>;

/// Compute a position for every distinct node in `nodes`, in input order.
pub fn compute_layout(
    nodes: &[NodeId],
    edges: &[(NodeId, NodeId)],
    config: &LayoutConfig,
) -> Vec<(NodeId, Position)> {
    let mut graph = build_graph(nodes, edges);

    break_cycles(&mut graph);
    let ranks = assign_ranks(&graph);
    let layers = order_layers(&graph, &ranks, config.sweeps);

    let tallest = layers.iter().map(Vec::len).max().unwrap_or(0);
    let column_step = config.node_width + config.rank_spacing;
    let row_step = config.node_height + config.node_spacing;

    let mut positions = vec![Position::default(); graph.node_count()];
    for (rank, layer) in layers.iter().enumerate() {
        // Center shorter layers against the tallest one
        let offset = (tallest - layer.len()) as f64 * row_step / 2.0;
        for (slot, node) in layer.iter().enumerate() {
            positions[node.index()] =
                Position::new(rank as f64 * column_step, offset + slot as f64 * row_step);
        }
    }

    graph
        .node_indices()
        .map(|index| (graph[index], positions[index.index()]))
        .collect()
}

/// One graph node per distinct id, added in input order.
fn build_graph(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> FlowDigraph {
    let mut graph = FlowDigraph::new();
    let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::new();
    for &node in nodes {
        index_of.entry(node).or_insert_with(|| graph.add_node(node));
    }

    for (source, target) in edges {
        match (index_of.get(source), index_of.get(target)) {
            (Some(&source), Some(&target)) if source != target => {
                graph.add_edge(source, target, ());
            }
            _ => tracing::debug!("Layout ignores edge {} -> {}", source, target),
        }
    }
    graph
}

/// Reverse every edge that closes a cycle during a depth-first search rooted
/// at each node in input order.
fn break_cycles(graph: &mut FlowDigraph) {
    let mut back_edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();
    depth_first_search(&*graph, graph.node_indices(), |event| {
        if let DfsEvent::BackEdge(source, target) = event {
            back_edges.push((source, target));
        }
    });

    for (source, target) in back_edges {
        if let Some(edge) = graph.find_edge(source, target) {
            graph.remove_edge(edge);
            graph.add_edge(target, source, ());
        }
    }
}

/// Longest path from any source, over an acyclic graph.
fn assign_ranks(graph: &FlowDigraph) -> Vec<usize> {
    let order = toposort(graph, None).unwrap_or_else(|cycle| {
        tracing::warn!("Cycle left at {} after reversal", graph[cycle.node_id()]);
        graph.node_indices().collect()
    });

    let mut rank = vec![0usize; graph.node_count()];
    for node in order {
        let below = graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|pred| rank[pred.index()] + 1)
            .max()
            .unwrap_or(0);
        rank[node.index()] = below;
    }
    rank
}

/// Group nodes by rank, then reorder each rank to reduce crossings.
fn order_layers(graph: &FlowDigraph, ranks: &[usize], sweeps: usize) -> Vec<Vec<NodeIndex>> {
    let depth = ranks.iter().max().map_or(0, |r| r + 1);
    let mut layers: Vec<Vec<NodeIndex>> = vec![Vec::new(); depth];
    for node in graph.node_indices() {
        layers[ranks[node.index()]].push(node);
    }

    let mut slot = vec![0usize; graph.node_count()];
    for layer in &layers {
        for (i, node) in layer.iter().enumerate() {
            slot[node.index()] = i;
        }
    }

    for _ in 0..sweeps {
        for rank in 1..depth {
            reorder(graph, &mut layers[rank], Direction::Incoming, &mut slot);
        }
        for rank in (0..depth.saturating_sub(1)).rev() {
            reorder(graph, &mut layers[rank], Direction::Outgoing, &mut slot);
        }
    }

    layers
}

/// Stable sort of one layer by the mean slot of each node's neighbours in
/// the adjacent rank. A node with no such neighbours keeps its current slot as its key.
fn reorder(
    graph: &FlowDigraph,
    layer: &mut [NodeIndex],
    direction: Direction,
    slot: &mut [usize],
) {
    let mut keyed: Vec<(f64, usize, NodeIndex)> = layer
        .iter()
        .map(|&node| {
            let adjacent: Vec<f64> = graph
                .neighbors_directed(node, direction)
                .map(|n| slot[n.index()] as f64)
                .collect();
            let key = if adjacent.is_empty() {
                slot[node.index()] as f64
            } else {
                adjacent.iter().sum::<f64>() / adjacent.len() as f64
            };
            (key, slot[node.index()], node)
        })
        .collect();

    keyed.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    for (i, (_, _, node)) in keyed.into_iter().enumerate() {
        layer[i] = node;
        slot[node.index()] = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: i64) -> NodeId {
        NodeId::task(id)
    }

    fn d(id: i64) -> NodeId {
        NodeId::deliverable(id)
    }

    fn position_of(layout: &[(NodeId, Position)], node: NodeId) -> Position {
        layout.iter().find(|(n, _)| *n == node).map(|(_, p)| *p).unwrap()
    }

    #[test]
    fn test_chain_advances_one_rank_per_edge() {
        let config = LayoutConfig::default();
        let layout = compute_layout(&[t(1), d(1), t(2)], &[(t(1), d(1)), (d(1), t(2))], &config);

        let step = config.node_width + config.rank_spacing;
        assert_eq!(position_of(&layout, t(1)).x, 0.0);
        assert_eq!(position_of(&layout, d(1)).x, step);
        assert_eq!(position_of(&layout, t(2)).x, 2.0 * step);
    }

    #[test]
    fn test_longest_path_wins() {
        // 1 -> 2 -> 3 and 1 -> 3: node 3 sits at rank 2, not rank 1.
        let config = LayoutConfig::default();
        let layout = compute_layout(
            &[t(1), t(2), t(3)],
            &[(t(1), t(2)), (t(2), t(3)), (t(1), t(3))],
            &config,
        );
        let step = config.node_width + config.rank_spacing;
        assert_eq!(position_of(&layout, t(3)).x, 2.0 * step);
    }

    #[test]
    fn test_every_edge_points_right_after_cycle_breaking() {
        let nodes = [t(1), t(2), t(3)];
        let edges = [(t(1), t(2)), (t(2), t(3)), (t(3), t(1))];
        let layout = compute_layout(&nodes, &edges, &LayoutConfig::default());

        assert_eq!(layout.len(), 3);
        let xs: Vec<f64> = nodes.iter().map(|n| position_of(&layout, *n).x).collect();
        assert!(xs[0] < xs[1]);
        assert!(xs[1] < xs[2]);
    }

    #[test]
    fn test_two_node_cycle_is_tolerated() {
        let layout = compute_layout(
            &[t(1), t(2)],
            &[(t(1), t(2)), (t(2), t(1))],
            &LayoutConfig::default(),
        );
        assert_ne!(position_of(&layout, t(1)), position_of(&layout, t(2)));
    }

    #[test]
    fn test_parallel_edges_in_a_cycle_are_all_reversed() {
        let config = LayoutConfig::default();
        let layout = compute_layout(
            &[t(1), t(2)],
            &[(t(1), t(2)), (t(2), t(1)), (t(2), t(1))],
            &config,
        );
        assert_eq!(position_of(&layout, t(1)).x, 0.0);
        assert_eq!(position_of(&layout, t(2)).x, config.node_width + config.rank_spacing);
    }

    #[test]
    fn test_self_loop_and_unknown_endpoint_ignored() {
        let layout = compute_layout(
            &[t(1)],
            &[(t(1), t(1)), (t(1), d(99))],
            &LayoutConfig::default(),
        );
        assert_eq!(layout, vec![(t(1), Position::new(0.0, 0.0))]);
    }

    #[test]
    fn test_same_rank_nodes_do_not_overlap() {
        let config = LayoutConfig::default();
        let layout = compute_layout(&[t(1), t(2), t(3)], &[], &config);
        let ys: Vec<f64> = layout.iter().map(|(_, p)| p.y).collect();
        assert_eq!(
            ys,
            vec![0.0, config.node_height + config.node_spacing, 2.0 * (config.node_height + config.node_spacing)]
        );
    }

    #[test]
    fn test_barycenter_uncrosses_simple_pair() {
        // a1 -> b2, a2 -> b1 with b1 listed first: sweeps should swap b1 and b2.
        let nodes = [t(1), t(2), d(1), d(2)];
        let edges = [(t(1), d(2)), (t(2), d(1))];
        let layout = compute_layout(&nodes, &edges, &LayoutConfig::default());

        assert!(position_of(&layout, d(2)).y < position_of(&layout, d(1)).y);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let nodes: Vec<NodeId> = (1..=12).map(t).chain((1..=6).map(d)).collect();
        let edges: Vec<(NodeId, NodeId)> = (1..=12)
            .map(|i| (t(i), d((i % 6) + 1)))
            .chain((1..=6).map(|i| (d(i), t(13 - i * 2))))
            .collect();

        let config = LayoutConfig::default();
        let first = compute_layout(&nodes, &edges, &config);
        let second = compute_layout(&nodes, &edges, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_nodes_are_laid_out_once() {
        let layout = compute_layout(&[t(1), t(1)], &[], &LayoutConfig::default());
        assert_eq!(layout.len(), 1);
    }
}

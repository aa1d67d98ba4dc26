//! Deterministic dependency ordering.
//!
//! Kahn's algorithm over a petgraph [`DiGraph`]. Among the nodes that are
//! ready at any point the one declared first is emitted first, so identical
//! input always produces identical output. Both the per-stack resource sort
//! and the linked-template deployment order go through [`stable_topological_order`].

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// Order `names` so that every dependency precedes its dependents.
///
/// `edges` holds `(dependent, dependency)` pairs of indices into `names`.
/// Duplicate edges are collapsed. On success the result is a permutation of
/// `0..names.len()`. If a cycle remains, the error lists the names of every
/// node that sits on a cycle, in declaration order.
pub fn stable_topological_order(
    names: &[String],
    edges: &[(usize, usize)],
) -> Result<Vec<usize>, Vec<String>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(names.len(), edges.len());
    let nodes: Vec<NodeIndex> = (0..names.len()).map(|i| graph.add_node(i)).collect();

    // Edges point from dependency to dependent: the dependency is emitted first.
    for &(dependent, dependency) in edges {
        graph.update_edge(nodes[dependency], nodes[dependent], ());
    }

    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..names.len()).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(names.len());

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for dependent in graph.neighbors_directed(nodes[index], Direction::Outgoing) {
            let target = graph[dependent];
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.push(Reverse(target));
            }
        }
    }

    if order.len() == names.len() {
        return Ok(order);
    }

    Err(cycle_members(&graph).into_iter().map(|i| names[i].clone()).collect())
}

/// Indices of nodes on a cycle: members of strongly connected components
/// with more than one node, plus nodes with a self-loop.
fn cycle_members(graph: &DiGraph<usize, ()>) -> BTreeSet<usize> {
    let mut members = BTreeSet::new();
    for component in tarjan_scc(graph) {
        let cyclic = component.len() > 1
            || component.first().is_some_and(|&n| graph.contains_edge(n, n));
        if cyclic {
            members.extend(component.into_iter().map(|n| graph[n]));
        }
    }
    members
}

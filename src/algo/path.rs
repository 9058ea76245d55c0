//! Path reconstruction.
//!
//! The labelling answers distance queries only. To recover the node
//! sequence, the query's meeting hub splits the request into two segments,
//! each reconstructed by a Dijkstra whose relaxations are pruned with the
//! label distances as admissible lower bounds. The pruning keeps the search
//! inside the shortest-path corridor, so reconstruction stays close to the
//! reported path length in work.
//!
//! When the index may be stale with respect to the effective graph, the
//! caller falls back to [`dijkstra_path`] with a blast-radius bound instead.

use super::{contraction_index::ContractionIndex, dijkstra::DijkstraData};
use crate::datastr::graph::*;

/// Reconstruct a shortest path using the index for guidance.
///
/// The graph passed must be the one the index was built on. Returns the
/// distance and the node sequence from `from` to `to`, or `None` if the
/// endpoints are disconnected.
pub fn index_path<G: LinkIterable>(graph: &G, index: &ContractionIndex, data: &mut DijkstraData, from: NodeId, to: NodeId) -> Option<(Weight, Vec<NodeId>)> {
    if from == to {
        return Some((0, vec![from]));
    }

    let from_chain = index.chain_to_core(from);
    let to_chain = index.chain_to_core(to);

    // both endpoints on one pendant path: the chain itself is the path
    for (to_idx, &(node, to_pre)) in to_chain.iter().enumerate() {
        if let Some(from_idx) = from_chain.iter().position(|&(x, _)| x == node) {
            let mut path: Vec<NodeId> = from_chain[..=from_idx].iter().map(|&(x, _)| x).collect();
            path.extend(to_chain[..to_idx].iter().rev().map(|&(x, _)| x));
            return Some((from_chain[from_idx].1 + to_pre, path));
        }
    }

    let &(from_core, from_pre) = from_chain.last().unwrap();
    let &(to_core, to_pre) = to_chain.last().unwrap();

    let (hub, core_distance) = index.query(from_core, to_core)?;
    let total = from_pre as u64 + core_distance as u64 + to_pre as u64;
    if total >= INFINITY as u64 {
        return None;
    }

    let mut path: Vec<NodeId> = from_chain.iter().map(|&(x, _)| x).collect();
    if from_core != to_core {
        let first_leg = guided_segment(graph, index, data, from_core, hub);
        path.extend(first_leg.into_iter().skip(1));
        let second_leg = guided_segment(graph, index, data, hub, to_core);
        path.extend(second_leg.into_iter().skip(1));
    }
    path.extend(to_chain[..to_chain.len() - 1].iter().rev().map(|&(x, _)| x));

    Some((total as Weight, path))
}

/// Shortest path between two core vertices, found by a Dijkstra pruned with
/// the index distances towards the target.
fn guided_segment<G: LinkIterable>(graph: &G, index: &ContractionIndex, data: &mut DijkstraData, from: NodeId, to: NodeId) -> Vec<NodeId> {
    if from == to {
        return vec![from];
    }
    let bound = index.distance(from, to);
    data.run_guided(graph, from, to, bound, |node| index.distance(node, to));
    if data.tentative_distance(to) < INFINITY {
        return data.path_to(to);
    }
    // correctness backstop, reachable when the oracle disagrees with the graph
    data.run_with_target(graph, from, Some(to), INFINITY);
    debug_assert!(data.tentative_distance(to) < INFINITY);
    data.path_to(to)
}

/// Plain Dijkstra on the (effective) graph with a parent map, pruned at `bound`.
/// Returns `None` if `to` was not settled within the bound.
pub fn dijkstra_path(graph: &RoadGraph, data: &mut DijkstraData, from: NodeId, to: NodeId, bound: Weight) -> Option<(Weight, Vec<NodeId>)> {
    if from == to {
        return Some((0, vec![from]));
    }
    data.run_with_target(graph, from, Some(to), bound);
    let distance = data.tentative_distance(to);
    if distance >= INFINITY {
        return None;
    }
    Some((distance, data.path_to(to)))
}

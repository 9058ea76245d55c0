//! Balanced vertex separators for the hierarchy decomposition.
//!
//! The decomposition only relies on the [`SeparatorHeuristic`] contract:
//! return a vertex set whose removal splits the cell into two sides of
//! bounded relative size. The shipped heuristic is a BFS layer cut with a
//! double-sweep start, which is cheap and works well on road networks;
//! flow-based separators can be plugged in behind the same trait.

use crate::datastr::graph::*;
use crate::util::InRangeOption;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// A vertex cut and the two sides its removal induces.
///
/// The cut vertices are sorted ascending; the sides are sorted ascending and
/// may be empty (degenerate cells). For disconnected cells the cut is empty
/// and the sides are a balanced grouping of the components.
#[derive(Debug, Clone)]
pub struct Cut {
    pub vertices: Vec<NodeId>,
    pub side_a: Vec<NodeId>,
    pub side_b: Vec<NodeId>,
}

pub trait SeparatorHeuristic {
    /// Compute a cut of the subgraph induced by `cell`.
    ///
    /// `max(side_a, side_b)` should not exceed `balance * cell.len()`, though
    /// heuristics may overshoot on degenerate inputs. Both sides must be
    /// strictly smaller than the cell, so the decomposition always makes
    /// progress.
    fn find_cut<G: LinkIterable>(&self, graph: &G, cell: &[NodeId], balance: f64) -> Cut;
}

/// BFS layering from a pseudo-peripheral vertex; the cut is the cheapest
/// layer whose removal leaves both layer prefixes within the balance bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct BfsLayerSeparator;

struct CellBfs {
    position: FxHashMap<NodeId, u32>,
    layer: Vec<InRangeOption<u32>>,
    order: Vec<NodeId>,
}

impl CellBfs {
    fn new(cell: &[NodeId]) -> Self {
        let position = cell.iter().enumerate().map(|(i, &v)| (v, i as u32)).collect();
        CellBfs {
            position,
            layer: vec![InRangeOption::new(None); cell.len()],
            order: Vec::with_capacity(cell.len()),
        }
    }

    /// Unit-weight BFS from `source` through cell members only.
    /// Returns the visitation order; `self.layer` holds the BFS depth per cell position.
    fn run<G: LinkIterable>(&mut self, graph: &G, source: NodeId) {
        self.layer.iter_mut().for_each(|l| *l = InRangeOption::new(None));
        self.order.clear();

        let source_pos = self.position[&source] as usize;
        self.layer[source_pos] = InRangeOption::new(Some(0));
        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(node) = queue.pop_front() {
            self.order.push(node);
            let node_layer = self.layer[self.position[&node] as usize].value().unwrap();
            graph.for_each_link(node, |link| {
                if link.weight >= INFINITY {
                    return;
                }
                if let Some(&pos) = self.position.get(&link.node) {
                    if self.layer[pos as usize].value().is_none() {
                        self.layer[pos as usize] = InRangeOption::new(Some(node_layer + 1));
                        queue.push_back(link.node);
                    }
                }
            });
        }
    }

    fn layer_of(&self, node: NodeId) -> u32 {
        self.layer[self.position[&node] as usize].value().expect("node not reached by the cell bfs")
    }

    /// Deepest vertex of the last BFS, ties broken towards the smallest id.
    fn peripheral_vertex(&self) -> NodeId {
        let max_layer = self.order.iter().map(|&v| self.layer_of(v)).max().unwrap();
        self.order.iter().copied().filter(|&v| self.layer_of(v) == max_layer).min().unwrap()
    }
}

impl SeparatorHeuristic for BfsLayerSeparator {
    fn find_cut<G: LinkIterable>(&self, graph: &G, cell: &[NodeId], balance: f64) -> Cut {
        debug_assert!(!cell.is_empty());
        debug_assert!(cell.windows(2).all(|w| w[0] < w[1]));

        if cell.len() == 1 {
            return Cut {
                vertices: cell.to_vec(),
                side_a: Vec::new(),
                side_b: Vec::new(),
            };
        }

        let mut bfs = CellBfs::new(cell);
        bfs.run(graph, cell[0]);

        if bfs.order.len() < cell.len() {
            return split_components(graph, cell);
        }

        // double sweep for a pseudo-peripheral start
        let start = bfs.peripheral_vertex();
        bfs.run(graph, start);

        let num_layers = bfs.order.iter().map(|&v| bfs.layer_of(v)).max().unwrap() as usize + 1;
        let mut layer_sizes = vec![0usize; num_layers];
        for &v in &bfs.order {
            layer_sizes[bfs.layer_of(v) as usize] += 1;
        }

        let balance_cap = ((balance * cell.len() as f64).ceil() as usize).max(1);

        // pick the cheapest interior layer whose prefix and suffix both respect
        // the balance cap; if none does, fall back to the most balanced one
        let mut best_feasible: Option<(usize, usize)> = None; // (layer size, layer)
        let mut best_fallback: Option<(usize, usize)> = None; // (max(prefix, suffix), layer)
        let mut prefix = layer_sizes[0];
        for split in 1..num_layers.saturating_sub(1) {
            let suffix = cell.len() - prefix - layer_sizes[split];
            if prefix <= balance_cap && suffix <= balance_cap {
                let candidate = (layer_sizes[split], split);
                if best_feasible.map(|best| candidate < best).unwrap_or(true) {
                    best_feasible = Some(candidate);
                }
            }
            let candidate = (prefix.max(suffix), split);
            if best_fallback.map(|best| candidate < best).unwrap_or(true) {
                best_fallback = Some(candidate);
            }
            prefix += layer_sizes[split];
        }

        let cut_layer = match best_feasible.or(best_fallback) {
            Some((_, layer)) => layer as u32,
            // two BFS layers only: everything except the start becomes the cut
            None => 1,
        };

        let mut vertices: Vec<NodeId> = cell.iter().copied().filter(|&v| bfs.layer_of(v) == cut_layer).collect();
        vertices.sort_unstable();

        let remaining: Vec<NodeId> = cell.iter().copied().filter(|&v| bfs.layer_of(v) != cut_layer).collect();
        let (side_a, side_b) = group_components(graph, &remaining);
        Cut { vertices, side_a, side_b }
    }
}

/// Cell with several connected components: no cut, just a balanced grouping.
fn split_components<G: LinkIterable>(graph: &G, cell: &[NodeId]) -> Cut {
    let (side_a, side_b) = group_components(graph, cell);
    Cut {
        vertices: Vec::new(),
        side_a,
        side_b,
    }
}

/// Group the connected components of the subgraph induced by `nodes` into
/// two sides, greedily balancing their sizes. Deterministic: components are
/// found in ascending seed order and assigned largest-first.
fn group_components<G: LinkIterable>(graph: &G, nodes: &[NodeId]) -> (Vec<NodeId>, Vec<NodeId>) {
    if nodes.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut bfs = CellBfs::new(nodes);
    let mut assigned = vec![false; nodes.len()];
    let mut components: Vec<Vec<NodeId>> = Vec::new();
    for (pos, &seed) in nodes.iter().enumerate() {
        if assigned[pos] {
            continue;
        }
        bfs.run(graph, seed);
        let component: Vec<NodeId> = bfs.order.clone();
        for &v in &component {
            assigned[bfs.position[&v] as usize] = true;
        }
        components.push(component);
    }

    components.sort_by_key(|c| (std::cmp::Reverse(c.len()), c[0]));

    let mut side_a = Vec::new();
    let mut side_b = Vec::new();
    for component in components {
        let target = if side_a.len() <= side_b.len() { &mut side_a } else { &mut side_b };
        target.extend(component);
    }
    side_a.sort_unstable();
    side_b.sort_unstable();
    (side_a, side_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastr::graph::EdgeList;

    fn path_graph(n: usize) -> RoadGraph {
        let mut edges = EdgeList::new(n);
        for v in 1..n as NodeId {
            edges.add_edge(v, v + 1, 1);
        }
        edges.build()
    }

    #[test]
    fn path_cell_splits_in_the_middle() {
        let graph = path_graph(9);
        let cell: Vec<NodeId> = (1..=9).collect();
        let cut = BfsLayerSeparator.find_cut(&graph, &cell, 0.5);
        assert_eq!(cut.vertices.len(), 1);
        assert!(cut.side_a.len() <= 5 && cut.side_b.len() <= 5);
        assert_eq!(cut.vertices.len() + cut.side_a.len() + cut.side_b.len(), 9);
    }

    #[test]
    fn disconnected_cell_yields_empty_cut() {
        let mut edges = EdgeList::new(5);
        edges.add_edge(1, 2, 1);
        edges.add_edge(3, 4, 1);
        edges.add_edge(4, 5, 1);
        let graph = edges.build();
        let cell: Vec<NodeId> = (1..=5).collect();
        let cut = BfsLayerSeparator.find_cut(&graph, &cell, 0.5);
        assert!(cut.vertices.is_empty());
        assert_eq!(cut.side_a, vec![3, 4, 5]);
        assert_eq!(cut.side_b, vec![1, 2]);
    }

    #[test]
    fn singleton_cell_resolves_as_its_own_cut() {
        let graph = path_graph(2);
        let cut = BfsLayerSeparator.find_cut(&graph, &[2], 0.5);
        assert_eq!(cut.vertices, vec![2]);
        assert!(cut.side_a.is_empty() && cut.side_b.is_empty());
    }
}

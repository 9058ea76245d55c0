//! Construction of the hierarchical 2-hop cut labelling.
//!
//! The builder recursively decomposes the core graph with balanced vertex
//! cuts. At each hierarchy node it runs one Dijkstra per cut vertex over the
//! current cell plus all ancestor cut vertices, writes the resulting
//! distances into the labels of the cell members, and materialises shortcut
//! edges between cut pairs whose shortest connecting path runs through the
//! cell interior. Ancestor cut vertices stay traversable in descendant
//! searches, so together with the shortcuts the label distances match the
//! distances of the graph the index is built on.

use super::{dijkstra::DijkstraData, folding::FoldedChains, separator::*};
use crate::datastr::graph::*;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

/// Per-vertex ancestor-cut labels plus hierarchy bookkeeping,
/// as produced by [`CutIndexBuilder`]. Gets consolidated into a
/// [`super::contraction_index::ContractionIndex`] for querying.
#[derive(Debug)]
pub struct CutIndex {
    /// per vertex: `(cut vertex, distance)` pairs, sorted by cut vertex id
    pub labels: Vec<Vec<(NodeId, Weight)>>,
    /// per vertex: root-to-vertex side bits, one bit per hierarchy level
    pub partition: Vec<Vec<u64>>,
    /// per vertex: hierarchy level at which the vertex was resolved
    pub depth: Vec<u16>,
    /// deepest resolution level of any vertex
    pub height: u16,
    pub num_cuts: usize,
    pub sum_cut_sizes: usize,
    pub max_cut_size: usize,
    pub num_shortcuts: usize,
}

pub struct CutIndexBuilder<'a, S = BfsLayerSeparator> {
    graph: &'a RoadGraph,
    folded: &'a FoldedChains,
    balance: f64,
    separator: S,
    shortcuts: Vec<Vec<Link>>,
    cell_mark: Vec<u32>,
    scope_mark: Vec<u32>,
    mark_run: u32,
    dijkstra: DijkstraData,
    labels: Vec<Vec<(NodeId, Weight)>>,
    partition: Vec<Vec<u64>>,
    depth: Vec<u16>,
    height: u16,
    num_cuts: usize,
    sum_cut_sizes: usize,
    max_cut_size: usize,
    num_shortcuts: usize,
}

/// View of the base graph plus accumulated shortcuts, restricted to the
/// marked scope of the current hierarchy node.
struct ScopedGraph<'g> {
    graph: &'g RoadGraph,
    shortcuts: &'g [Vec<Link>],
    mark: &'g [u32],
    run: u32,
}

impl<'g> Graph for ScopedGraph<'g> {
    fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }
    fn num_arcs(&self) -> usize {
        self.graph.num_arcs()
    }
    fn degree(&self, node: NodeId) -> usize {
        self.graph.degree(node)
    }
}

impl<'g> LinkIterable for ScopedGraph<'g> {
    fn for_each_link(&self, node: NodeId, mut f: impl FnMut(Link)) {
        for link in self.graph.link_iter(node).chain(self.shortcuts[node as usize].iter().copied()) {
            if link.weight < INFINITY && self.mark[link.node as usize] == self.run {
                f(link);
            }
        }
    }
}

/// View restricted to the current cell only, for the separator heuristic.
struct CellGraph<'g> {
    graph: &'g RoadGraph,
    mark: &'g [u32],
    run: u32,
}

impl<'g> Graph for CellGraph<'g> {
    fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }
    fn num_arcs(&self) -> usize {
        self.graph.num_arcs()
    }
    fn degree(&self, node: NodeId) -> usize {
        self.graph.degree(node)
    }
}

impl<'g> LinkIterable for CellGraph<'g> {
    fn for_each_link(&self, node: NodeId, mut f: impl FnMut(Link)) {
        for link in self.graph.link_iter(node) {
            if link.weight < INFINITY && self.mark[link.node as usize] == self.run {
                f(link);
            }
        }
    }
}

impl<'a> CutIndexBuilder<'a, BfsLayerSeparator> {
    pub fn new(graph: &'a RoadGraph, folded: &'a FoldedChains, balance: f64) -> Self {
        Self::with_separator(graph, folded, balance, BfsLayerSeparator)
    }
}

impl<'a, S: SeparatorHeuristic> CutIndexBuilder<'a, S> {
    pub fn with_separator(graph: &'a RoadGraph, folded: &'a FoldedChains, balance: f64, separator: S) -> Self {
        assert!(balance > 0.0 && balance < 1.0, "balance parameter must be in (0, 1)");
        let num_slots = graph.num_slots();
        CutIndexBuilder {
            graph,
            folded,
            balance,
            separator,
            shortcuts: vec![Vec::new(); num_slots],
            cell_mark: vec![0; num_slots],
            scope_mark: vec![0; num_slots],
            mark_run: 0,
            dijkstra: DijkstraData::new(num_slots),
            labels: vec![Vec::new(); num_slots],
            partition: vec![Vec::new(); num_slots],
            depth: vec![0; num_slots],
            height: 0,
            num_cuts: 0,
            sum_cut_sizes: 0,
            max_cut_size: 0,
            num_shortcuts: 0,
        }
    }

    pub fn build(mut self) -> CutIndex {
        let core: Vec<NodeId> = (1..self.graph.num_slots() as NodeId).filter(|&v| !self.folded.is_folded(v)).collect();
        let mut ancestors = Vec::new();
        let mut path = Vec::new();
        self.decompose(core, &mut ancestors, &mut path, 0);

        let mut labels = self.labels;
        labels.par_iter_mut().for_each(|label| {
            label.sort_unstable_by_key(|&(hub, _)| hub);
            debug_assert!(label.windows(2).all(|w| w[0].0 < w[1].0), "duplicate hub in label");
        });

        CutIndex {
            labels,
            partition: self.partition,
            depth: self.depth,
            height: self.height,
            num_cuts: self.num_cuts,
            sum_cut_sizes: self.sum_cut_sizes,
            max_cut_size: self.max_cut_size,
            num_shortcuts: self.num_shortcuts,
        }
    }

    fn decompose(&mut self, cell: Vec<NodeId>, ancestors: &mut Vec<NodeId>, path: &mut Vec<u64>, level: u16) {
        if cell.is_empty() {
            return;
        }
        assert!(level < u16::MAX, "hierarchy degenerated");

        self.mark_run += 1;
        let cell_run = self.mark_run;
        for &v in &cell {
            self.cell_mark[v as usize] = cell_run;
        }
        let cut = {
            let view = CellGraph {
                graph: self.graph,
                mark: &self.cell_mark,
                run: cell_run,
            };
            self.separator.find_cut(&view, &cell, self.balance)
        };

        if !cut.vertices.is_empty() {
            self.label_cell(&cell, &cut.vertices, ancestors, cell_run);

            self.num_cuts += 1;
            self.sum_cut_sizes += cut.vertices.len();
            self.max_cut_size = self.max_cut_size.max(cut.vertices.len());

            for &c in &cut.vertices {
                self.depth[c as usize] = level;
                self.partition[c as usize] = path.clone();
            }
            self.height = self.height.max(level);
        }

        let old_ancestors = ancestors.len();
        ancestors.extend_from_slice(&cut.vertices);

        let word = level as usize / 64;
        let bit = 1u64 << (level % 64);

        self.decompose(cut.side_a, ancestors, path, level + 1);

        if path.len() <= word {
            path.resize(word + 1, 0);
        }
        path[word] |= bit;
        self.decompose(cut.side_b, ancestors, path, level + 1);
        path[word] &= !bit;

        ancestors.truncate(old_ancestors);
    }

    /// Run one Dijkstra per cut vertex over the cell plus the ancestor cut
    /// vertices, record labels for the cell members and collect shortcuts.
    fn label_cell(&mut self, cell: &[NodeId], cut: &[NodeId], ancestors: &[NodeId], cell_run: u32) {
        self.mark_run += 1;
        for &v in cell.iter().chain(ancestors.iter()) {
            self.scope_mark[v as usize] = self.mark_run;
        }

        let cut_set: FxHashSet<NodeId> = cut.iter().copied().collect();
        let mut new_shortcuts: Vec<(NodeId, NodeId, Weight)> = Vec::new();

        for (i, &c) in cut.iter().enumerate() {
            let view = ScopedGraph {
                graph: self.graph,
                shortcuts: &self.shortcuts,
                mark: &self.scope_mark,
                run: self.mark_run,
            };
            self.dijkstra.run(&view, c);

            for &v in cell {
                let distance = self.dijkstra.tentative_distance(v);
                if distance < INFINITY {
                    self.labels[v as usize].push((c, distance));
                }
            }

            // shortcuts between cut pairs whose shortest path stays in the cell interior
            for &other in &cut[i + 1..] {
                let distance = self.dijkstra.tentative_distance(other);
                if distance >= INFINITY || self.dijkstra.predecessor(other) == c {
                    continue;
                }
                let mut interior_only = true;
                let mut current = self.dijkstra.predecessor(other);
                while current != c {
                    if cut_set.contains(&current) || self.cell_mark[current as usize] != cell_run {
                        interior_only = false;
                        break;
                    }
                    current = self.dijkstra.predecessor(current);
                }
                if interior_only {
                    new_shortcuts.push((c, other, distance));
                }
            }
        }

        for (c, other, distance) in new_shortcuts {
            self.shortcuts[c as usize].push(Link { node: other, weight: distance });
            self.shortcuts[other as usize].push(Link { node: c, weight: distance });
            self.num_shortcuts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastr::graph::EdgeList;

    fn build_index(graph: &RoadGraph) -> (CutIndex, FoldedChains) {
        let folded = FoldedChains::identity(graph.num_slots());
        let index = CutIndexBuilder::new(graph, &folded, 0.5).build();
        (index, folded)
    }

    fn label_distance(index: &CutIndex, u: NodeId, w: NodeId) -> Weight {
        let mut best = INFINITY;
        for &(hub_u, d_u) in &index.labels[u as usize] {
            for &(hub_w, d_w) in &index.labels[w as usize] {
                if hub_u == hub_w {
                    best = best.min(d_u + d_w);
                }
            }
        }
        best
    }

    #[test]
    fn diamond_labels_cover_all_pairs() {
        let mut edges = EdgeList::new(4);
        edges.add_edge(1, 2, 10);
        edges.add_edge(1, 3, 15);
        edges.add_edge(2, 4, 20);
        edges.add_edge(3, 4, 5);
        let graph = edges.build();
        let (index, _) = build_index(&graph);

        assert_eq!(label_distance(&index, 1, 4), 20);
        assert_eq!(label_distance(&index, 2, 3), 25);
        assert_eq!(label_distance(&index, 1, 1), 0);
    }

    #[test]
    fn every_vertex_is_resolved_exactly_once() {
        let mut edges = EdgeList::new(7);
        for v in 1..7 {
            edges.add_edge(v, v + 1, 1);
        }
        let graph = edges.build();
        let (index, _) = build_index(&graph);

        for v in 1..=7u32 {
            // own hub with distance zero
            assert!(index.labels[v as usize].contains(&(v, 0)));
        }
        assert!(index.num_cuts > 0);
        assert!(index.max_cut_size >= 1);
    }

    #[test]
    fn disconnected_components_share_no_hubs() {
        let mut edges = EdgeList::new(4);
        edges.add_edge(1, 2, 1);
        edges.add_edge(3, 4, 1);
        let graph = edges.build();
        let (index, _) = build_index(&graph);

        assert_eq!(label_distance(&index, 1, 3), INFINITY);
        assert_eq!(label_distance(&index, 1, 2), 1);
        assert_eq!(label_distance(&index, 3, 4), 1);
    }
}

//! Read-optimised form of the cut labelling.
//!
//! All per-vertex hub arrays are consolidated into one global blob with a
//! per-vertex descriptor (offset, length, resolution depth, partition
//! bitmask). A distance query intersects the two sorted hub arrays with a
//! coordinated linear sweep and takes the minimal distance sum; the meeting
//! hub doubles as the seed for path reconstruction. Folded vertices carry no
//! labels and are translated through the degree-1 chain table instead.

use super::{cut_index::CutIndex, folding::FoldedChains};
use crate::datastr::graph::*;
use rustc_hash::FxHashSet;

/// Statistics of a built index, for telemetry and benchmark reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub size_bytes: usize,
    pub label_count: usize,
    pub height: u16,
    pub avg_cut_size: f64,
    pub max_cut_size: usize,
    pub avg_label_size: f64,
    pub num_shortcuts: usize,
    pub num_folded: usize,
}

#[derive(Debug, Clone)]
pub struct ContractionIndex {
    height: u16,
    bitmask_words: u16,
    // label blob, indexed per vertex through label_first
    label_first: Vec<u64>,
    hubs: Vec<NodeId>,
    hub_dists: Vec<Weight>,
    // per-vertex descriptors
    depth: Vec<u16>,
    partition: Vec<u64>,
    // degree-1 chain table, parent 0 = core vertex
    fold_parent: Vec<NodeId>,
    fold_dist: Vec<Weight>,
    // hierarchy statistics carried from construction
    num_cuts: u64,
    sum_cut_sizes: u64,
    max_cut_size: u32,
    num_shortcuts: u64,
}

impl ContractionIndex {
    pub fn new(cut_index: CutIndex, folded: FoldedChains) -> ContractionIndex {
        let num_slots = cut_index.labels.len();
        let bitmask_words = (usize::from(cut_index.height) + 64) / 64;

        let mut label_first = Vec::with_capacity(num_slots + 1);
        label_first.push(0u64);
        let mut hubs = Vec::new();
        let mut hub_dists = Vec::new();
        let mut partition = vec![0u64; num_slots * bitmask_words];
        for (node, label) in cut_index.labels.iter().enumerate() {
            for &(hub, dist) in label {
                hubs.push(hub);
                hub_dists.push(dist);
            }
            label_first.push(hubs.len() as u64);
            let words = &cut_index.partition[node];
            partition[node * bitmask_words..node * bitmask_words + words.len()].copy_from_slice(words);
        }

        let (fold_parent, fold_dist) = folded.into_tables();
        assert_eq!(fold_parent.len(), num_slots);

        ContractionIndex {
            height: cut_index.height,
            bitmask_words: bitmask_words as u16,
            label_first,
            hubs,
            hub_dists,
            depth: cut_index.depth,
            partition,
            fold_parent,
            fold_dist,
            num_cuts: cut_index.num_cuts as u64,
            sum_cut_sizes: cut_index.sum_cut_sizes as u64,
            max_cut_size: cut_index.max_cut_size as u32,
            num_shortcuts: cut_index.num_shortcuts as u64,
        }
    }

    /// Number of vertices covered by the index (excluding the sentinel slot).
    pub fn num_nodes(&self) -> usize {
        self.fold_parent.len() - 1
    }

    pub fn is_folded(&self, node: NodeId) -> bool {
        self.fold_parent[node as usize] != 0
    }

    fn label(&self, node: NodeId) -> (&[NodeId], &[Weight]) {
        let range = (self.label_first[node as usize] as usize)..(self.label_first[node as usize + 1] as usize);
        (&self.hubs[range.clone()], &self.hub_dists[range])
    }

    /// Shortest distance between `u` and `w`, [`INFINITY`] if disconnected.
    pub fn distance(&self, u: NodeId, w: NodeId) -> Weight {
        self.query(u, w).map(|(_, distance)| distance).unwrap_or(INFINITY)
    }

    /// Shortest distance together with the vertex the minimum was attained at.
    /// Returns `None` for disconnected pairs.
    ///
    /// For folded endpoints the chain towards the core is climbed first,
    /// watching for a meeting point on a shared pendant path.
    pub fn query(&self, u: NodeId, w: NodeId) -> Option<(NodeId, Weight)> {
        if u == w {
            return Some((u, 0));
        }

        let mut u_chain = vec![(u, 0 as Weight)];
        {
            let mut current = u;
            let mut pre = 0;
            while self.is_folded(current) {
                pre += self.fold_dist[current as usize];
                current = self.fold_parent[current as usize];
                u_chain.push((current, pre));
            }
        }

        // climb w's chain, checking for a meeting point within u's chain
        let mut w_core = w;
        let mut w_pre: Weight = 0;
        loop {
            if let Some(&(_, u_pre)) = u_chain.iter().find(|&&(x, _)| x == w_core) {
                return Some((w_core, u_pre + w_pre));
            }
            if !self.is_folded(w_core) {
                break;
            }
            w_pre += self.fold_dist[w_core as usize];
            w_core = self.fold_parent[w_core as usize];
        }

        let &(u_core, u_pre) = u_chain.last().unwrap();
        let (u_hubs, u_dists) = self.label(u_core);
        let (w_hubs, w_dists) = self.label(w_core);
        let (hub, core_distance) = Self::best_hub(u_hubs, u_dists, w_hubs, w_dists)?;

        let total = u_pre as u64 + core_distance as u64 + w_pre as u64;
        if total >= INFINITY as u64 {
            return None;
        }
        Some((hub, total as Weight))
    }

    /// Coordinated linear sweep over two sorted hub arrays.
    /// Ties on the distance sum resolve to the smallest hub id.
    fn best_hub(u_hubs: &[NodeId], u_dists: &[Weight], w_hubs: &[NodeId], w_dists: &[Weight]) -> Option<(NodeId, Weight)> {
        let mut result: Option<(NodeId, Weight)> = None;
        let mut i = 0;
        let mut j = 0;

        while i < u_hubs.len() && j < w_hubs.len() {
            if u_hubs[i] < w_hubs[j] {
                i += 1;
            } else if w_hubs[j] < u_hubs[i] {
                j += 1;
            } else {
                let distance = u_dists[i] + w_dists[j];
                match result {
                    Some((_, best)) if best <= distance => (),
                    _ => result = Some((u_hubs[i], distance)),
                }
                i += 1;
                j += 1;
            }
        }

        result
    }

    /// Number of shared ancestor cuts of `u` and `w`: the length of the common
    /// prefix of their partition bitstrings, capped by both resolution depths.
    pub fn common_cut_level(&self, u: NodeId, w: NodeId) -> u16 {
        let words = self.bitmask_words as usize;
        let u_words = &self.partition[u as usize * words..(u as usize + 1) * words];
        let w_words = &self.partition[w as usize * words..(w as usize + 1) * words];

        let mut agreement = 0u32;
        for (word, (&a, &b)) in u_words.iter().zip(w_words.iter()).enumerate() {
            let diff = a ^ b;
            if diff != 0 {
                agreement = word as u32 * 64 + diff.trailing_zeros();
                break;
            }
            agreement = (word as u32 + 1) * 64;
        }

        (agreement as u16).min(self.depth[u as usize]).min(self.depth[w as usize])
    }

    /// True if any vertex of `set` appears among the hubs of `node`, its
    /// degree-1 chain, or is `node` itself. Used for staleness checks.
    pub fn intersects_ancestors(&self, node: NodeId, set: &FxHashSet<NodeId>) -> bool {
        let mut current = node;
        loop {
            if set.contains(&current) {
                return true;
            }
            if !self.is_folded(current) {
                break;
            }
            current = self.fold_parent[current as usize];
        }
        let (hubs, _) = self.label(current);
        hubs.iter().any(|hub| set.contains(hub))
    }

    /// Chain from a folded vertex to its core, as `(vertex, accumulated distance)` pairs.
    pub fn chain_to_core(&self, node: NodeId) -> Vec<(NodeId, Weight)> {
        let mut chain = vec![(node, 0)];
        let mut current = node;
        let mut pre = 0;
        while self.is_folded(current) {
            pre += self.fold_dist[current as usize];
            current = self.fold_parent[current as usize];
            chain.push((current, pre));
        }
        chain
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn stats(&self) -> IndexStats {
        let label_count = self.hubs.len();
        let size_bytes = self.label_first.len() * 8
            + self.hubs.len() * 4
            + self.hub_dists.len() * 4
            + self.depth.len() * 2
            + self.partition.len() * 8
            + self.fold_parent.len() * 4
            + self.fold_dist.len() * 4;
        let num_core = (1..self.fold_parent.len()).filter(|&v| self.fold_parent[v] == 0).count();
        IndexStats {
            size_bytes,
            label_count,
            height: self.height,
            avg_cut_size: if self.num_cuts == 0 {
                0.0
            } else {
                self.sum_cut_sizes as f64 / self.num_cuts as f64
            },
            max_cut_size: self.max_cut_size as usize,
            avg_label_size: if num_core == 0 { 0.0 } else { label_count as f64 / num_core as f64 },
            num_shortcuts: self.num_shortcuts as usize,
            num_folded: self.num_nodes() - num_core,
        }
    }

    pub(crate) fn raw_parts(&self) -> RawIndexParts {
        RawIndexParts {
            height: self.height,
            bitmask_words: self.bitmask_words,
            label_first: &self.label_first,
            hubs: &self.hubs,
            hub_dists: &self.hub_dists,
            depth: &self.depth,
            partition: &self.partition,
            fold_parent: &self.fold_parent,
            fold_dist: &self.fold_dist,
            num_cuts: self.num_cuts,
            sum_cut_sizes: self.sum_cut_sizes,
            max_cut_size: self.max_cut_size,
            num_shortcuts: self.num_shortcuts,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_raw_parts(
        height: u16,
        bitmask_words: u16,
        label_first: Vec<u64>,
        hubs: Vec<NodeId>,
        hub_dists: Vec<Weight>,
        depth: Vec<u16>,
        partition: Vec<u64>,
        fold_parent: Vec<NodeId>,
        fold_dist: Vec<Weight>,
        num_cuts: u64,
        sum_cut_sizes: u64,
        max_cut_size: u32,
        num_shortcuts: u64,
    ) -> ContractionIndex {
        ContractionIndex {
            height,
            bitmask_words,
            label_first,
            hubs,
            hub_dists,
            depth,
            partition,
            fold_parent,
            fold_dist,
            num_cuts,
            sum_cut_sizes,
            max_cut_size,
            num_shortcuts,
        }
    }
}

/// Borrowed view of all index arrays, for serialisation.
pub(crate) struct RawIndexParts<'a> {
    pub height: u16,
    pub bitmask_words: u16,
    pub label_first: &'a [u64],
    pub hubs: &'a [NodeId],
    pub hub_dists: &'a [Weight],
    pub depth: &'a [u16],
    pub partition: &'a [u64],
    pub fold_parent: &'a [NodeId],
    pub fold_dist: &'a [Weight],
    pub num_cuts: u64,
    pub sum_cut_sizes: u64,
    pub max_cut_size: u32,
    pub num_shortcuts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::cut_index::CutIndexBuilder;
    use crate::datastr::graph::EdgeList;

    fn build(graph: &RoadGraph) -> ContractionIndex {
        let folded = FoldedChains::fold(graph);
        let cut_index = CutIndexBuilder::new(graph, &folded, 0.5).build();
        ContractionIndex::new(cut_index, folded)
    }

    #[test]
    fn diamond_distances() {
        let mut edges = EdgeList::new(4);
        edges.add_edge(1, 2, 10);
        edges.add_edge(1, 3, 15);
        edges.add_edge(2, 4, 20);
        edges.add_edge(3, 4, 5);
        let index = build(&edges.build());

        assert_eq!(index.distance(1, 4), 20);
        assert_eq!(index.distance(4, 1), 20);
        assert_eq!(index.distance(2, 3), 25);
        assert_eq!(index.distance(3, 3), 0);
    }

    #[test]
    fn pendant_chain_pairs_resolve_along_the_chain() {
        // chain 1-2-3 hanging off triangle 3-4-5
        let mut edges = EdgeList::new(5);
        edges.add_edge(1, 2, 2);
        edges.add_edge(2, 3, 3);
        edges.add_edge(3, 4, 1);
        edges.add_edge(4, 5, 1);
        edges.add_edge(3, 5, 1);
        let index = build(&edges.build());

        // both endpoints folded onto the same chain
        assert_eq!(index.distance(1, 2), 2);
        assert_eq!(index.distance(2, 1), 2);
        assert_eq!(index.distance(1, 3), 5);
        // across the core
        assert_eq!(index.distance(1, 4), 6);
        assert_eq!(index.distance(2, 5), 4);
    }

    #[test]
    fn disconnected_pair_is_unreachable() {
        let mut edges = EdgeList::new(4);
        edges.add_edge(1, 2, 1);
        edges.add_edge(3, 4, 1);
        let index = build(&edges.build());

        assert_eq!(index.distance(1, 3), INFINITY);
        assert_eq!(index.query(1, 3), None);
        assert_eq!(index.common_cut_level(1, 3), 0);
    }

    #[test]
    fn meeting_hub_lies_on_a_shortest_path() {
        let mut edges = EdgeList::new(5);
        for v in 1..5 {
            edges.add_edge(v, v + 1, 1);
        }
        let index = build(&edges.build());

        let (hub, distance) = index.query(1, 5).unwrap();
        assert_eq!(distance, 4);
        assert_eq!(index.distance(1, hub) + index.distance(hub, 5), 4);
    }
}

//! Adjacency-array graph store for road networks.
//!
//! Nodes are identified by dense 1-based ids; id `0` is reserved as a
//! sentinel and its slot stays empty. The graph is undirected: every edge is
//! stored as two directed arcs. Edges carry a base weight (from the input),
//! a current weight (disruption-adjusted) and a closure flag. Closed edges
//! remain visible to iteration but have effective weight [`INFINITY`].

/// Node ids are 32bit unsigned ints, `0` is the "none" sentinel
pub type NodeId = u32;
/// Edge ids are 32bit unsigned ints
pub type EdgeId = u32;
/// Edge weights are 32bit unsigned ints
pub type Weight = u32;
/// A sufficiently large infinity constant.
/// Set to `u32::MAX / 2` so that `INFINITY + x` for `x <= INFINITY` does not overflow.
pub const INFINITY: Weight = u32::MAX / 2;
/// Largest weight an edge may carry; anything above is treated as unreachable.
pub const MAX_WEIGHT: Weight = INFINITY - 1;

/// Simple struct for weighted links.
/// No behaviour, just a pure data struct.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link {
    pub node: NodeId,
    pub weight: Weight,
}

/// Base trait for graphs.
pub trait Graph {
    fn num_nodes(&self) -> usize;
    fn num_arcs(&self) -> usize;
    fn degree(&self, node: NodeId) -> usize;

    /// Number of array slots needed for per-node data, including the sentinel slot.
    fn num_slots(&self) -> usize {
        self.num_nodes() + 1
    }
}

/// Trait for graph data structures which allow iterating over the outgoing links of a node.
pub trait LinkIterable: Graph {
    fn for_each_link(&self, node: NodeId, f: impl FnMut(Link));
}

/// Accumulates undirected edges before building a [`RoadGraph`].
///
/// Self-loops are dropped on insertion, parallel edges merge to the minimum
/// weight at build time.
#[derive(Debug)]
pub struct EdgeList {
    num_nodes: usize,
    edges: Vec<(NodeId, NodeId, Weight)>,
}

impl EdgeList {
    pub fn new(num_nodes: usize) -> EdgeList {
        EdgeList {
            num_nodes,
            edges: Vec::new(),
        }
    }

    /// Insert an undirected edge. Endpoints outside `[1, num_nodes]`,
    /// self-loops and weights above [`MAX_WEIGHT`] are rejected.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId, weight: Weight) -> bool {
        if u == v || u == 0 || v == 0 || u as usize > self.num_nodes || v as usize > self.num_nodes || weight == 0 || weight > MAX_WEIGHT {
            return false;
        }
        let (u, v) = if u < v { (u, v) } else { (v, u) };
        self.edges.push((u, v, weight));
        true
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn build(mut self) -> RoadGraph {
        // merge parallel edges to the minimum weight
        self.edges.sort_unstable();
        self.edges.dedup_by(|later, first| {
            if later.0 == first.0 && later.1 == first.1 {
                first.2 = first.2.min(later.2);
                true
            } else {
                false
            }
        });

        let n = self.num_nodes;
        let mut first_out = vec![0 as EdgeId; n + 2];
        for &(u, v, _) in &self.edges {
            first_out[u as usize + 1] += 1;
            first_out[v as usize + 1] += 1;
        }
        for node in 1..first_out.len() {
            first_out[node] += first_out[node - 1];
        }

        let m = self.edges.len() * 2;
        let mut head = vec![0 as NodeId; m];
        let mut weight = vec![0 as Weight; m];
        let mut next_free = first_out.clone();
        for &(u, v, w) in &self.edges {
            for (from, to) in [(u, v), (v, u)] {
                let idx = next_free[from as usize] as usize;
                next_free[from as usize] += 1;
                head[idx] = to;
                weight[idx] = w;
            }
        }

        RoadGraph {
            first_out,
            head,
            base_weight: weight.clone(),
            weight,
            closed: vec![false; m],
        }
    }
}

/// Undirected weighted graph with mutable edge weights and closure flags.
///
/// The topology is fixed after construction; disruptions only change the
/// current weights and the closure flags.
#[derive(Debug, Clone)]
pub struct RoadGraph {
    // index of first arc of each node, +1 entry in the end; slot 0 is the sentinel
    first_out: Vec<EdgeId>,
    // the node ids to which each arc points
    head: Vec<NodeId>,
    // weights as loaded from the input
    base_weight: Vec<Weight>,
    // disruption-adjusted weights
    weight: Vec<Weight>,
    closed: Vec<bool>,
}

impl RoadGraph {
    fn arc_range(&self, node: NodeId) -> std::ops::Range<usize> {
        (self.first_out[node as usize] as usize)..(self.first_out[node as usize + 1] as usize)
    }

    /// Iterator over the outgoing links of `node` with effective weights
    /// (closed arcs yield [`INFINITY`]).
    pub fn link_iter(&self, node: NodeId) -> impl Iterator<Item = Link> + '_ {
        let range = self.arc_range(node);
        self.head[range.clone()]
            .iter()
            .zip(self.weight[range.clone()].iter())
            .zip(self.closed[range].iter())
            .map(|((&node, &weight), &closed)| Link {
                node,
                weight: if closed { INFINITY } else { weight },
            })
    }

    /// Number of incident arcs with finite effective weight.
    pub fn effective_degree(&self, node: NodeId) -> usize {
        let range = self.arc_range(node);
        self.weight[range.clone()]
            .iter()
            .zip(self.closed[range].iter())
            .filter(|(&w, &closed)| !closed && w < INFINITY)
            .count()
    }

    fn arc_index(&self, from: NodeId, to: NodeId) -> Option<usize> {
        self.arc_range(from).find(|&idx| self.head[idx] == to)
    }

    /// Effective weight of the edge between `u` and `v`, if present.
    pub fn edge_weight(&self, u: NodeId, v: NodeId) -> Option<Weight> {
        self.arc_index(u, v)
            .map(|idx| if self.closed[idx] { INFINITY } else { self.weight[idx] })
    }

    /// Base (undisrupted) weight of the edge between `u` and `v`, if present.
    pub fn base_edge_weight(&self, u: NodeId, v: NodeId) -> Option<Weight> {
        self.arc_index(u, v).map(|idx| self.base_weight[idx])
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.arc_index(u, v).is_some()
    }

    pub fn is_edge_closed(&self, u: NodeId, v: NodeId) -> bool {
        self.arc_index(u, v).map(|idx| self.closed[idx]).unwrap_or(false)
    }

    /// Overwrite the current weight of the edge `u`-`v` in both directions.
    /// Returns false if the edge does not exist.
    pub fn set_weight(&mut self, u: NodeId, v: NodeId, new_weight: Weight) -> bool {
        let mut found = false;
        for (from, to) in [(u, v), (v, u)] {
            if let Some(idx) = self.arc_index(from, to) {
                self.weight[idx] = new_weight;
                found = true;
            }
        }
        found
    }

    /// Apply a slowdown with speed ratio `r` in `(0, 1]`:
    /// the effective weight becomes `base_weight / r`, saturating at [`INFINITY`].
    pub fn apply_slowdown(&mut self, u: NodeId, v: NodeId, ratio: f64) -> bool {
        let Some(idx) = self.arc_index(u, v) else {
            return false;
        };
        let ratio = ratio.clamp(1e-9, 1.0);
        let scaled = (self.base_weight[idx] as f64 / ratio).round();
        let new_weight = if scaled >= MAX_WEIGHT as f64 { INFINITY } else { scaled as Weight };
        self.set_weight(u, v, new_weight)
    }

    /// Set or clear the closure flag of the edge `u`-`v` in both directions.
    pub fn mark_closed(&mut self, u: NodeId, v: NodeId, closed: bool) -> bool {
        let mut found = false;
        for (from, to) in [(u, v), (v, u)] {
            if let Some(idx) = self.arc_index(from, to) {
                self.closed[idx] = closed;
                found = true;
            }
        }
        found
    }

    /// Restore all weights to their base values and reopen all edges.
    pub fn reset_disruptions(&mut self) {
        self.weight.copy_from_slice(&self.base_weight);
        self.closed.iter_mut().for_each(|c| *c = false);
    }

    /// Number of undirected edges.
    pub fn num_edges(&self) -> usize {
        self.head.len() / 2
    }
}

impl Graph for RoadGraph {
    fn num_nodes(&self) -> usize {
        self.first_out.len() - 2
    }

    fn num_arcs(&self) -> usize {
        self.head.len()
    }

    fn degree(&self, node: NodeId) -> usize {
        self.arc_range(node).len()
    }
}

impl LinkIterable for RoadGraph {
    fn for_each_link(&self, node: NodeId, mut f: impl FnMut(Link)) {
        for link in self.link_iter(node) {
            f(link);
        }
    }
}

/// View of a [`RoadGraph`] with base weights and without closures,
/// matching what an index built on the undisrupted graph expects.
pub struct BaseWeights<'a>(pub &'a RoadGraph);

impl<'a> Graph for BaseWeights<'a> {
    fn num_nodes(&self) -> usize {
        self.0.num_nodes()
    }
    fn num_arcs(&self) -> usize {
        self.0.num_arcs()
    }
    fn degree(&self, node: NodeId) -> usize {
        self.0.degree(node)
    }
}

impl<'a> LinkIterable for BaseWeights<'a> {
    fn for_each_link(&self, node: NodeId, mut f: impl FnMut(Link)) {
        let range = self.0.arc_range(node);
        for (&node, &weight) in self.0.head[range.clone()].iter().zip(self.0.base_weight[range].iter()) {
            f(Link { node, weight });
        }
    }
}

//! Degree-1 contraction.
//!
//! Road networks carry long pendant chains (dead ends, service roads).
//! Folding them away before the separator decomposition shrinks the core
//! graph the labelling has to cover. Every folded vertex records its parent
//! towards the core and the edge weight to it; queries climb this chain and
//! accumulate the pre-distance.

use crate::datastr::graph::*;
use std::collections::VecDeque;

/// Chain table produced by iterative leaf peeling.
///
/// `parent[v] == 0` means `v` survived as a core vertex.
#[derive(Debug, Clone)]
pub struct FoldedChains {
    parent: Vec<NodeId>,
    dist_to_parent: Vec<Weight>,
}

impl FoldedChains {
    /// Iteratively remove vertices of effective degree 1.
    ///
    /// Vertices are peeled in ascending id order, so the chain table is
    /// deterministic for a given graph. Closed edges count as absent.
    pub fn fold(graph: &RoadGraph) -> FoldedChains {
        let num_slots = graph.num_slots();
        let mut parent = vec![0 as NodeId; num_slots];
        let mut dist_to_parent = vec![0 as Weight; num_slots];
        let mut degree: Vec<usize> = (0..num_slots).map(|v| graph.effective_degree(v as NodeId)).collect();
        let mut folded = vec![false; num_slots];

        let mut queue: VecDeque<NodeId> = (1..num_slots as NodeId).filter(|&v| degree[v as usize] == 1).collect();

        while let Some(node) = queue.pop_front() {
            if folded[node as usize] || degree[node as usize] != 1 {
                continue;
            }

            let mut link_to_core = None;
            graph.for_each_link(node, |link| {
                if link.weight < INFINITY && !folded[link.node as usize] {
                    link_to_core = Some(link);
                }
            });
            let Some(link) = link_to_core else { continue };

            folded[node as usize] = true;
            parent[node as usize] = link.node;
            dist_to_parent[node as usize] = link.weight;

            degree[link.node as usize] -= 1;
            if degree[link.node as usize] == 1 {
                queue.push_back(link.node);
            }
        }

        FoldedChains { parent, dist_to_parent }
    }

    /// A chain table without any folded vertices.
    pub fn identity(num_slots: usize) -> FoldedChains {
        FoldedChains {
            parent: vec![0; num_slots],
            dist_to_parent: vec![0; num_slots],
        }
    }

    pub fn is_folded(&self, node: NodeId) -> bool {
        self.parent[node as usize] != 0
    }

    pub fn num_folded(&self) -> usize {
        self.parent.iter().filter(|&&p| p != 0).count()
    }

    /// The retained core vertex `node` resolves to, with the accumulated pre-distance.
    pub fn core_of(&self, node: NodeId) -> (NodeId, Weight) {
        let mut current = node;
        let mut pre_dist: Weight = 0;
        while self.is_folded(current) {
            pre_dist += self.dist_to_parent[current as usize];
            current = self.parent[current as usize];
        }
        (current, pre_dist)
    }

    /// The full chain from `node` to its core vertex as `(vertex, accumulated distance)`
    /// pairs, starting with `(node, 0)` and ending with the core vertex.
    pub fn chain_to_core(&self, node: NodeId) -> Vec<(NodeId, Weight)> {
        let mut chain = vec![(node, 0)];
        let mut current = node;
        let mut pre_dist: Weight = 0;
        while self.is_folded(current) {
            pre_dist += self.dist_to_parent[current as usize];
            current = self.parent[current as usize];
            chain.push((current, pre_dist));
        }
        chain
    }

    pub fn into_tables(self) -> (Vec<NodeId>, Vec<Weight>) {
        (self.parent, self.dist_to_parent)
    }

    pub fn from_tables(parent: Vec<NodeId>, dist_to_parent: Vec<Weight>) -> FoldedChains {
        FoldedChains { parent, dist_to_parent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastr::graph::EdgeList;

    // 1-2-3 hangs off 4, which sits in a triangle 4-5-6
    fn pendant_triangle() -> RoadGraph {
        let mut edges = EdgeList::new(6);
        edges.add_edge(1, 2, 2);
        edges.add_edge(2, 3, 3);
        edges.add_edge(3, 4, 4);
        edges.add_edge(4, 5, 1);
        edges.add_edge(5, 6, 1);
        edges.add_edge(4, 6, 1);
        edges.build()
    }

    #[test]
    fn pendant_chain_folds_into_core() {
        let folded = FoldedChains::fold(&pendant_triangle());
        assert_eq!(folded.num_folded(), 3);
        assert!(folded.is_folded(1));
        assert!(folded.is_folded(2));
        assert!(folded.is_folded(3));
        assert!(!folded.is_folded(4));

        assert_eq!(folded.core_of(1), (4, 9));
        assert_eq!(folded.core_of(3), (4, 4));
        assert_eq!(folded.core_of(5), (5, 0));

        assert_eq!(folded.chain_to_core(2), vec![(2, 0), (3, 3), (4, 7)]);
    }

    #[test]
    fn whole_tree_keeps_a_single_core_vertex() {
        let mut edges = EdgeList::new(4);
        edges.add_edge(1, 2, 1);
        edges.add_edge(2, 3, 1);
        edges.add_edge(2, 4, 1);
        let folded = FoldedChains::fold(&edges.build());
        assert_eq!(folded.num_folded(), 3);
        let cores: Vec<NodeId> = (1..=4).filter(|&v| !folded.is_folded(v)).collect();
        assert_eq!(cores.len(), 1);
    }
}

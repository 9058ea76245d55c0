//! Building blocks for the labelling and query algorithms.

use crate::datastr::graph::*;

pub mod contraction_index;
pub mod cut_index;
pub mod dijkstra;
pub mod folding;
pub mod path;
pub mod separator;

/// Simply a source-target pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub from: NodeId,
    pub to: NodeId,
}

impl Query {
    /// The unordered pair of endpoints, normalized for use as a map key.
    pub fn key(&self) -> (NodeId, NodeId) {
        if self.from <= self.to {
            (self.from, self.to)
        } else {
            (self.to, self.from)
        }
    }
}

/// Full preprocessing pipeline: degree-1 folding, separator decomposition
/// with labelling, consolidation into the query form.
pub fn build_index(graph: &RoadGraph, balance: f64) -> contraction_index::ContractionIndex {
    let folded = folding::FoldedChains::fold(graph);
    let cut_index = cut_index::CutIndexBuilder::new(graph, &folded, balance).build();
    contraction_index::ContractionIndex::new(cut_index, folded)
}

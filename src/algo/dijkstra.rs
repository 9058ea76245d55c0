//! Basic variant of Dijkstra's algorithm, reused by preprocessing,
//! fallback queries and path reconstruction.

use crate::datastr::{graph::*, index_heap::*, timestamped_vector::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct State {
    pub distance: Weight,
    pub node: NodeId,
}

impl Indexing for State {
    #[inline]
    fn as_index(&self) -> usize {
        self.node as usize
    }
}

/// Add two finite distances; `None` when the sum leaves the representable range.
#[inline]
fn checked_add(a: Weight, b: Weight) -> Option<Weight> {
    let sum = a as u64 + b as u64;
    if sum >= INFINITY as u64 {
        None
    } else {
        Some(sum as Weight)
    }
}

/// Reusable scratch state for Dijkstra runs.
///
/// The distance array is timestamped, so starting a new run does not require
/// touching all entries. One instance is shared across the many searches of
/// index construction and the per-query fallbacks.
pub struct DijkstraData {
    distances: TimestampedVector<Weight>,
    predecessors: Vec<NodeId>,
    queue: IndexedMinHeap<State>,
}

impl DijkstraData {
    pub fn new(num_slots: usize) -> DijkstraData {
        DijkstraData {
            distances: TimestampedVector::new(num_slots, INFINITY),
            predecessors: vec![0; num_slots],
            queue: IndexedMinHeap::new(num_slots),
        }
    }

    /// Run a full Dijkstra from `from`, relaxing every link the graph yields.
    pub fn run<G: LinkIterable>(&mut self, graph: &G, from: NodeId) {
        self.run_with_target(graph, from, None, INFINITY)
    }

    /// Run Dijkstra from `from` until either `target` is settled, the queue
    /// runs dry, or the smallest tentative distance exceeds `bound`.
    ///
    /// Nodes beyond `bound` are never settled; if the target lies beyond the
    /// bound it reads as unreachable afterwards.
    pub fn run_with_target<G: LinkIterable>(&mut self, graph: &G, from: NodeId, target: Option<NodeId>, bound: Weight) {
        self.queue.clear();
        self.distances.reset();
        self.distances.set(from as usize, 0);
        self.predecessors[from as usize] = from;
        self.queue.push(State { distance: 0, node: from });

        while let Some(State { distance, node }) = self.queue.pop() {
            if distance > bound {
                return;
            }
            if Some(node) == target {
                return;
            }

            graph.for_each_link(node, |link| {
                if link.weight >= INFINITY {
                    return;
                }
                // distances beyond the representable maximum count as unreachable
                let Some(next_distance) = checked_add(distance, link.weight) else {
                    return;
                };
                if next_distance < self.distances[link.node as usize] && next_distance <= bound {
                    self.distances.set(link.node as usize, next_distance);
                    self.predecessors[link.node as usize] = node;
                    let next = State {
                        distance: next_distance,
                        node: link.node,
                    };
                    if self.queue.contains_index(next.as_index()) {
                        self.queue.decrease_key(next);
                    } else {
                        self.queue.push(next);
                    }
                }
            });
        }
    }

    /// Dijkstra from `from` towards `to`, pruning every relaxation whose
    /// tentative distance plus the caller-supplied lower bound on the
    /// remaining distance exceeds `bound`.
    ///
    /// With an exact distance oracle as the lower bound and
    /// `bound = dist(from, to)` the search only settles vertices on shortest
    /// `from`-`to` paths.
    pub fn run_guided<G: LinkIterable>(&mut self, graph: &G, from: NodeId, to: NodeId, bound: Weight, mut lower_bound: impl FnMut(NodeId) -> Weight) {
        self.queue.clear();
        self.distances.reset();
        self.distances.set(from as usize, 0);
        self.predecessors[from as usize] = from;
        self.queue.push(State { distance: 0, node: from });

        while let Some(State { distance, node }) = self.queue.pop() {
            if node == to {
                return;
            }

            graph.for_each_link(node, |link| {
                if link.weight >= INFINITY {
                    return;
                }
                let Some(next_distance) = checked_add(distance, link.weight) else {
                    return;
                };
                if next_distance >= self.distances[link.node as usize] {
                    return;
                }
                if next_distance as u64 + lower_bound(link.node) as u64 > bound as u64 {
                    return;
                }
                self.distances.set(link.node as usize, next_distance);
                self.predecessors[link.node as usize] = node;
                let next = State {
                    distance: next_distance,
                    node: link.node,
                };
                if self.queue.contains_index(next.as_index()) {
                    self.queue.decrease_key(next);
                } else {
                    self.queue.push(next);
                }
            });
        }
    }

    pub fn tentative_distance(&self, node: NodeId) -> Weight {
        self.distances[node as usize]
    }

    pub fn predecessor(&self, node: NodeId) -> NodeId {
        self.predecessors[node as usize]
    }

    /// Walk the predecessor pointers from `node` back to the search origin.
    /// Only valid for nodes with a finite tentative distance.
    pub fn path_to(&self, node: NodeId) -> Vec<NodeId> {
        debug_assert!(self.tentative_distance(node) < INFINITY);
        let mut path = vec![node];
        while self.predecessor(*path.last().unwrap()) != *path.last().unwrap() {
            path.push(self.predecessor(*path.last().unwrap()));
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastr::graph::EdgeList;

    #[test]
    fn distances_on_a_diamond() {
        let mut edges = EdgeList::new(4);
        edges.add_edge(1, 2, 10);
        edges.add_edge(1, 3, 15);
        edges.add_edge(2, 4, 20);
        edges.add_edge(3, 4, 5);
        let graph = edges.build();

        let mut data = DijkstraData::new(graph.num_slots());
        data.run(&graph, 1);
        assert_eq!(data.tentative_distance(4), 20);
        assert_eq!(data.path_to(4), vec![1, 3, 4]);
    }

    #[test]
    fn bound_prunes_the_search() {
        let mut edges = EdgeList::new(3);
        edges.add_edge(1, 2, 5);
        edges.add_edge(2, 3, 5);
        let graph = edges.build();

        let mut data = DijkstraData::new(graph.num_slots());
        data.run_with_target(&graph, 1, Some(3), 7);
        assert_eq!(data.tentative_distance(3), INFINITY);
        data.run_with_target(&graph, 1, Some(3), 10);
        assert_eq!(data.tentative_distance(3), 10);
    }
}

//! Disruption records, impact scoring and the label update policy.
//!
//! The manager owns the graph and the disruption state. Every disruption
//! batch is scored against the configured threshold: high network impact
//! triggers an immediate background rebuild of the labelling, low impact
//! marks the incident vertices stale and defers the work to query time.
//! The published index lives behind an `Arc` swap guarded by a generation
//! counter, so in-flight readers keep their snapshot and a newer batch
//! supersedes an unfinished rebuild.

use crate::algo::{build_index, contraction_index::ContractionIndex, dijkstra::DijkstraData, path, Query};
use crate::datastr::graph::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;

/// Factor by which a repair search may exceed the index estimate before the
/// target counts as unreachable. Caps the blast radius of stale-label repairs.
const BLAST_RADIUS_FACTOR: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Base,
    Disrupted,
    LazyUpdate,
    ImmediateUpdate,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Mode::Base => "BASE",
            Mode::Disrupted => "DISRUPTED",
            Mode::LazyUpdate => "LAZY_UPDATE",
            Mode::ImmediateUpdate => "IMMEDIATE_UPDATE",
        };
        f.write_str(name)
    }
}

/// How the published labels relate to the current effective graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelsStatus {
    Fresh,
    PrecomputedFresh,
    OnDemandRepair,
}

impl fmt::Display for LabelsStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LabelsStatus::Fresh => "fresh",
            LabelsStatus::PrecomputedFresh => "precomputed_fresh",
            LabelsStatus::OnDemandRepair => "on_demand_repair",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Light,
    Medium,
    Heavy,
    Closed,
}

impl Severity {
    /// Speed ratio a user-reported disruption of this severity maps to.
    pub fn slowdown_ratio(self) -> f64 {
        match self {
            Severity::Light => 0.85,
            Severity::Medium => 0.6,
            Severity::Heavy => 0.3,
            Severity::Closed => 0.0,
        }
    }

    /// Classify a measured speed ratio.
    pub fn from_ratio(ratio: f64, closed: bool) -> Severity {
        if closed {
            Severity::Closed
        } else if ratio >= 0.8 {
            Severity::Light
        } else if ratio >= 0.5 {
            Severity::Medium
        } else {
            Severity::Heavy
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Light" | "light" => Ok(Severity::Light),
            "Medium" | "medium" => Ok(Severity::Medium),
            "Heavy" | "heavy" => Ok(Severity::Heavy),
            "Closed" | "closed" => Ok(Severity::Closed),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Severity::Light => "Light",
            Severity::Medium => "Medium",
            Severity::Heavy => "Heavy",
            Severity::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// State of one disrupted edge, owned by the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct DisruptionRecord {
    /// speed ratio in `(0, 1]`, 1 = no slowdown; ignored for closures
    pub slowdown: f64,
    pub closed: bool,
    pub severity: Severity,
    pub incident_type: String,
    /// jam factor in `[0, 10]`
    pub jam_factor: f64,
    /// affected segment length in meters
    pub segment_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactScore {
    pub f_delta_w: f64,
    pub f_jam: f64,
    pub f_closure: f64,
    pub score: f64,
    pub network_percentage_affected: f64,
    pub exceeds_threshold: bool,
}

/// Score a single disruption: `f_delta_w * f_jam * f_closure`.
pub fn impact_score(slowdown_ratio: f64, jam_factor: f64, closed: bool, network_percentage: f64, tau: f64) -> ImpactScore {
    let f_delta_w = if closed { 1.0 } else { (1.0 - slowdown_ratio).clamp(0.0, 1.0) };
    let f_jam = (jam_factor / 10.0).min(1.0);
    let f_closure = if closed { 1.5 } else { 1.0 };
    ImpactScore {
        f_delta_w,
        f_jam,
        f_closure,
        score: f_delta_w * f_jam * f_closure,
        network_percentage_affected: network_percentage,
        exceeds_threshold: network_percentage >= tau,
    }
}

/// Severity-weighted fraction of the network touched by the given records:
/// closures count double, harsh slowdowns (ratio below 0.5) count 1.5.
pub fn network_impact_percentage<'a>(records: impl Iterator<Item = &'a DisruptionRecord>, total_edges: usize) -> f64 {
    if total_edges == 0 {
        return 0.0;
    }
    let weighted: f64 = records
        .map(|record| {
            if record.closed {
                2.0
            } else if record.slowdown < 0.5 {
                1.5
            } else {
                1.0
            }
        })
        .sum();
    (weighted / total_edges as f64).min(1.0)
}

/// Pure mode policy: impact at or above the threshold forces an eager
/// rebuild, anything else defers to on-access repair.
pub fn determine_mode(network_percentage: f64, tau: f64) -> Mode {
    if network_percentage >= tau {
        Mode::ImmediateUpdate
    } else {
        Mode::LazyUpdate
    }
}

/// Snapshot slot shared between the manager and the rebuild worker.
struct PublishedIndex {
    // (generation, snapshot); the generation only ever increases
    state: Mutex<(u64, Arc<ContractionIndex>)>,
    refreshed: Condvar,
}

struct RebuildJob {
    generation: u64,
    graph: RoadGraph,
    balance: f64,
}

pub struct DisruptionManager {
    graph: RoadGraph,
    balance: f64,
    tau: f64,
    repair_cache_cap: usize,
    mode: Mode,
    records: FxHashMap<(NodeId, NodeId), DisruptionRecord>,
    stale_nodes: FxHashSet<NodeId>,
    repair_cache: FxHashMap<(NodeId, NodeId), Weight>,
    dijkstra: DijkstraData,
    base_index: Arc<ContractionIndex>,
    published: Arc<PublishedIndex>,
    scheduled_generation: u64,
    jobs: mpsc::Sender<RebuildJob>,
    // joined on drop so a pending rebuild cannot outlive the manager
    worker: Option<thread::JoinHandle<()>>,
}

impl DisruptionManager {
    /// Build the initial index synchronously and start the rebuild worker.
    pub fn new(graph: RoadGraph, balance: f64, tau: f64, repair_cache_cap: usize) -> DisruptionManager {
        let base_index = Arc::new(build_index(&graph, balance));
        let published = Arc::new(PublishedIndex {
            state: Mutex::new((0, base_index.clone())),
            refreshed: Condvar::new(),
        });

        let (jobs, job_receiver) = mpsc::channel::<RebuildJob>();
        let worker_slot = published.clone();
        let worker = thread::spawn(move || {
            while let Ok(mut job) = job_receiver.recv() {
                // a newer batch supersedes any queued rebuild
                while let Ok(newer) = job_receiver.try_recv() {
                    job = newer;
                }
                let index = build_index(&job.graph, job.balance);
                let mut state = worker_slot.state.lock().unwrap();
                if job.generation > state.0 {
                    *state = (job.generation, Arc::new(index));
                }
                worker_slot.refreshed.notify_all();
            }
        });

        let num_slots = graph.num_slots();
        DisruptionManager {
            graph,
            balance,
            tau,
            repair_cache_cap,
            mode: Mode::Base,
            records: FxHashMap::default(),
            stale_nodes: FxHashSet::default(),
            repair_cache: FxHashMap::default(),
            dijkstra: DijkstraData::new(num_slots),
            base_index,
            published,
            scheduled_generation: 0,
            jobs,
            worker: Some(worker),
        }
    }

    /// The currently published index snapshot. Immutable; queries started on
    /// an older snapshot keep it alive through the `Arc`.
    pub fn snapshot(&self) -> Arc<ContractionIndex> {
        self.published.state.lock().unwrap().1.clone()
    }

    /// True once the published labels match the last scheduled rebuild.
    pub fn labels_fresh(&self) -> bool {
        self.published.state.lock().unwrap().0 >= self.scheduled_generation
    }

    /// Block until the last scheduled rebuild has been published.
    pub fn wait_for_rebuild(&self) {
        let mut state = self.published.state.lock().unwrap();
        while state.0 < self.scheduled_generation {
            state = self.published.refreshed.wait(state).unwrap();
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.repair_cache.clear();
    }

    pub fn labels_status(&self) -> LabelsStatus {
        match self.mode {
            Mode::ImmediateUpdate => LabelsStatus::PrecomputedFresh,
            Mode::LazyUpdate | Mode::Disrupted => LabelsStatus::OnDemandRepair,
            Mode::Base => LabelsStatus::Fresh,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.tau
    }

    /// Set the mode selection threshold and re-evaluate the current batch.
    pub fn set_threshold(&mut self, tau: f64) {
        self.tau = tau;
        if !self.records.is_empty() {
            self.reevaluate();
        }
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn records(&self) -> &FxHashMap<(NodeId, NodeId), DisruptionRecord> {
        &self.records
    }

    pub fn network_percentage(&self) -> f64 {
        network_impact_percentage(self.records.values(), self.graph.num_edges())
    }

    fn edge_key(u: NodeId, v: NodeId) -> (NodeId, NodeId) {
        Query { from: u, to: v }.key()
    }

    pub fn is_edge_disrupted(&self, u: NodeId, v: NodeId) -> bool {
        self.records.contains_key(&Self::edge_key(u, v))
    }

    /// True if any consecutive pair of `path` runs over a disrupted edge.
    pub fn route_uses_disruptions(&self, path: &[NodeId]) -> bool {
        path.windows(2).any(|pair| self.is_edge_disrupted(pair[0], pair[1]))
    }

    /// Insert or overwrite a batch of disruption records, then re-run the
    /// update policy.
    pub fn apply_batch(&mut self, batch: impl IntoIterator<Item = ((NodeId, NodeId), DisruptionRecord)>) {
        for ((u, v), record) in batch {
            self.records.insert(Self::edge_key(u, v), record);
        }
        self.reevaluate();
    }

    /// Record a user-reported disruption and re-run the update policy.
    /// Returns the impact score of the reported incident.
    pub fn add_user_disruption(&mut self, u: NodeId, v: NodeId, incident_type: &str, severity: Severity) -> ImpactScore {
        let closed = severity == Severity::Closed;
        let slowdown = if closed { 1.0 } else { severity.slowdown_ratio() };
        let jam_factor = if closed { 10.0 } else { 10.0 * (1.0 - slowdown) };
        let record = DisruptionRecord {
            slowdown,
            closed,
            severity,
            incident_type: incident_type.to_string(),
            jam_factor,
            segment_length: 100.0,
        };
        self.records.insert(Self::edge_key(u, v), record);
        self.reevaluate();
        impact_score(slowdown, jam_factor, closed, self.network_percentage(), self.tau)
    }

    /// Drop all disruptions and return to the base index and BASE mode.
    pub fn clear_disruptions(&mut self) {
        self.records.clear();
        self.reevaluate();
    }

    /// Materialise the effective graph and select the update strategy for
    /// the current record set.
    fn reevaluate(&mut self) {
        self.repair_cache.clear();
        self.stale_nodes.clear();

        self.graph.reset_disruptions();
        for (&(u, v), record) in &self.records {
            if record.closed {
                self.graph.mark_closed(u, v, true);
            } else {
                self.graph.apply_slowdown(u, v, record.slowdown);
            }
        }

        if self.records.is_empty() {
            self.mode = Mode::Base;
            self.scheduled_generation += 1;
            let mut state = self.published.state.lock().unwrap();
            *state = (self.scheduled_generation, self.base_index.clone());
            self.published.refreshed.notify_all();
            return;
        }

        self.mode = determine_mode(self.network_percentage(), self.tau);
        match self.mode {
            Mode::ImmediateUpdate => {
                self.scheduled_generation += 1;
                self.jobs
                    .send(RebuildJob {
                        generation: self.scheduled_generation,
                        graph: self.graph.clone(),
                        balance: self.balance,
                    })
                    .expect("rebuild worker is gone");
            }
            Mode::LazyUpdate => {
                for &(u, v) in self.records.keys() {
                    self.stale_nodes.insert(u);
                    self.stale_nodes.insert(v);
                }
            }
            _ => unreachable!("policy only selects update modes"),
        }
    }

    /// Stale test of the lazy protocol: does any disrupted vertex show up
    /// among the endpoints or their ancestor cuts?
    fn is_stale(&self, index: &ContractionIndex, u: NodeId, w: NodeId) -> bool {
        !self.stale_nodes.is_empty()
            && (index.intersects_ancestors(u, &self.stale_nodes) || index.intersects_ancestors(w, &self.stale_nodes))
    }

    fn blast_radius(estimate: Weight) -> Weight {
        if estimate >= INFINITY {
            return INFINITY;
        }
        ((estimate as f64 * BLAST_RADIUS_FACTOR) as u64).min(INFINITY as u64) as Weight
    }

    fn cache_repair(&mut self, key: (NodeId, NodeId), distance: Weight) {
        if self.repair_cache.len() >= self.repair_cache_cap {
            self.repair_cache.clear();
        }
        self.repair_cache.insert(key, distance);
    }

    /// Distance on the effective graph, bounded if a finite bound is given.
    fn effective_distance(&mut self, u: NodeId, w: NodeId, bound: Weight) -> Weight {
        self.dijkstra.run_with_target(&self.graph, u, Some(w), bound);
        self.dijkstra.tentative_distance(w)
    }

    fn lazy_distance(&mut self, u: NodeId, w: NodeId) -> Weight {
        let index = self.snapshot();
        if !self.is_stale(&index, u, w) {
            return index.distance(u, w);
        }
        let key = Self::edge_key(u, w);
        if let Some(&cached) = self.repair_cache.get(&key) {
            return cached;
        }
        let estimate = index.distance(u, w);
        let repaired = self.effective_distance(u, w, Self::blast_radius(estimate));
        self.cache_repair(key, repaired);
        repaired
    }

    /// Mode dispatch for distance queries.
    pub fn distance(&mut self, u: NodeId, w: NodeId) -> Weight {
        if u == w {
            return 0;
        }
        match self.mode {
            Mode::Base => self.snapshot().distance(u, w),
            Mode::ImmediateUpdate => {
                if self.labels_fresh() {
                    self.snapshot().distance(u, w)
                } else {
                    // rebuild still in flight, fall back instead of blocking
                    self.effective_distance(u, w, INFINITY)
                }
            }
            Mode::LazyUpdate => self.lazy_distance(u, w),
            Mode::Disrupted => self.effective_distance(u, w, INFINITY),
        }
    }

    /// Mode dispatch for path queries. Unreachable pairs yield `(INFINITY, [])`.
    pub fn path(&mut self, u: NodeId, w: NodeId) -> (Weight, Vec<NodeId>) {
        let unreachable = (INFINITY, Vec::new());
        match self.mode {
            Mode::Base => {
                let index = self.snapshot();
                self.guided_index_path(&index, u, w).unwrap_or(unreachable)
            }
            Mode::ImmediateUpdate => {
                if self.labels_fresh() {
                    let index = self.snapshot();
                    self.guided_index_path(&index, u, w).unwrap_or(unreachable)
                } else {
                    path::dijkstra_path(&self.graph, &mut self.dijkstra, u, w, INFINITY).unwrap_or(unreachable)
                }
            }
            Mode::LazyUpdate => {
                let index = self.snapshot();
                if self.is_stale(&index, u, w) {
                    let bound = Self::blast_radius(index.distance(u, w));
                    path::dijkstra_path(&self.graph, &mut self.dijkstra, u, w, bound).unwrap_or(unreachable)
                } else {
                    self.guided_index_path(&index, u, w).unwrap_or(unreachable)
                }
            }
            Mode::Disrupted => path::dijkstra_path(&self.graph, &mut self.dijkstra, u, w, INFINITY).unwrap_or(unreachable),
        }
    }

    /// Index-guided reconstruction against the graph the snapshot was built
    /// on: the base weights for the base index, the effective weights for a
    /// rebuilt one.
    fn guided_index_path(&mut self, index: &Arc<ContractionIndex>, u: NodeId, w: NodeId) -> Option<(Weight, Vec<NodeId>)> {
        if Arc::ptr_eq(index, &self.base_index) {
            path::index_path(&BaseWeights(&self.graph), index, &mut self.dijkstra, u, w)
        } else {
            path::index_path(&self.graph, index, &mut self.dijkstra, u, w)
        }
    }

    /// Path on the undisrupted graph via the base index, ignoring the
    /// current mode. Used when a caller explicitly opts out of disruptions.
    pub fn base_path(&mut self, u: NodeId, w: NodeId) -> (Weight, Vec<NodeId>) {
        let base = self.base_index.clone();
        path::index_path(&BaseWeights(&self.graph), &base, &mut self.dijkstra, u, w).unwrap_or((INFINITY, Vec::new()))
    }

    /// Unit-weight distance on the effective graph (hop count).
    pub fn unweighted_distance(&mut self, u: NodeId, w: NodeId) -> Weight {
        if u == w {
            return 0;
        }
        struct UnitWeights<'a>(&'a RoadGraph);
        impl<'a> Graph for UnitWeights<'a> {
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
        impl<'a> LinkIterable for UnitWeights<'a> {
            fn for_each_link(&self, node: NodeId, mut f: impl FnMut(Link)) {
                self.0.for_each_link(node, |link| {
                    if link.weight < INFINITY {
                        f(Link { node: link.node, weight: 1 });
                    }
                });
            }
        }
        self.dijkstra.run_with_target(&UnitWeights(&self.graph), u, Some(w), INFINITY);
        self.dijkstra.tentative_distance(w)
    }
}

impl Drop for DisruptionManager {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        let (sender, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.jobs, sender));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastr::graph::EdgeList;

    fn chain(n: u32) -> RoadGraph {
        let mut edges = EdgeList::new(n as usize);
        for v in 1..n {
            edges.add_edge(v, v + 1, 1);
        }
        edges.build()
    }

    fn closure_record() -> DisruptionRecord {
        DisruptionRecord {
            slowdown: 1.0,
            closed: true,
            severity: Severity::Closed,
            incident_type: "Road Closure".to_string(),
            jam_factor: 10.0,
            segment_length: 100.0,
        }
    }

    fn slowdown_record(ratio: f64) -> DisruptionRecord {
        DisruptionRecord {
            slowdown: ratio,
            closed: false,
            severity: Severity::from_ratio(ratio, false),
            incident_type: "Congestion".to_string(),
            jam_factor: 10.0 * (1.0 - ratio),
            segment_length: 100.0,
        }
    }

    #[test]
    fn impact_score_formula() {
        let score = impact_score(0.5, 5.0, false, 0.2, 0.5);
        assert!((score.f_delta_w - 0.5).abs() < 1e-9);
        assert!((score.f_jam - 0.5).abs() < 1e-9);
        assert_eq!(score.f_closure, 1.0);
        assert!((score.score - 0.25).abs() < 1e-9);
        assert!(!score.exceeds_threshold);

        let closure = impact_score(0.3, 10.0, true, 0.6, 0.5);
        assert_eq!(closure.f_delta_w, 1.0);
        assert_eq!(closure.f_closure, 1.5);
        assert!((closure.score - 1.5).abs() < 1e-9);
        assert!(closure.exceeds_threshold);
    }

    #[test]
    fn network_percentage_weighs_severity() {
        let records = [closure_record(), slowdown_record(0.4), slowdown_record(0.8)];
        // 2.0 + 1.5 + 1.0 over 10 edges
        let pct = network_impact_percentage(records.iter(), 10);
        assert!((pct - 0.45).abs() < 1e-9);
        assert_eq!(network_impact_percentage(records.iter(), 2), 1.0);
        assert_eq!(network_impact_percentage(records.iter(), 0), 0.0);
    }

    #[test]
    fn mode_policy_is_a_pure_threshold_test() {
        assert_eq!(determine_mode(0.5, 0.5), Mode::ImmediateUpdate);
        assert_eq!(determine_mode(0.49, 0.5), Mode::LazyUpdate);
        assert_eq!(determine_mode(0.1, 0.1), Mode::ImmediateUpdate);
    }

    #[test]
    fn closure_batch_above_threshold_goes_immediate() {
        let mut manager = DisruptionManager::new(chain(5), 0.5, 0.1, 64);
        manager.apply_batch(vec![((3, 4), closure_record())]);
        assert_eq!(manager.mode(), Mode::ImmediateUpdate);
        manager.wait_for_rebuild();
        assert_eq!(manager.distance(1, 5), INFINITY);
        assert_eq!(manager.path(1, 5), (INFINITY, vec![]));
        assert_eq!(manager.distance(1, 3), 2);
    }

    #[test]
    fn slowdown_batch_below_threshold_goes_lazy() {
        let mut manager = DisruptionManager::new(chain(5), 0.5, 0.5, 64);
        manager.apply_batch(vec![((3, 4), slowdown_record(0.5))]);
        assert_eq!(manager.mode(), Mode::LazyUpdate);
        // effective weight of (3,4) doubled
        assert_eq!(manager.distance(1, 5), 5);
        // untouched regions are served straight from the index
        assert_eq!(manager.distance(1, 2), 1);
    }

    #[test]
    fn clearing_disruptions_restores_base() {
        let mut manager = DisruptionManager::new(chain(5), 0.5, 0.1, 64);
        manager.apply_batch(vec![((3, 4), closure_record())]);
        manager.wait_for_rebuild();
        assert_eq!(manager.distance(1, 5), INFINITY);
        manager.clear_disruptions();
        assert_eq!(manager.mode(), Mode::Base);
        assert_eq!(manager.distance(1, 5), 4);
        assert_eq!(manager.path(1, 5).1, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn user_disruption_rescores_and_reroutes() {
        // square with a shortcut edge: 1-2-3 and 1-4-3, plus more edges to keep impact low
        let mut edges = EdgeList::new(6);
        edges.add_edge(1, 2, 1);
        edges.add_edge(2, 3, 1);
        edges.add_edge(1, 4, 2);
        edges.add_edge(4, 3, 2);
        edges.add_edge(3, 5, 1);
        edges.add_edge(5, 6, 1);
        let mut manager = DisruptionManager::new(edges.build(), 0.5, 0.5, 64);

        let before = manager.distance(1, 3);
        assert_eq!(before, 2);

        let impact = manager.add_user_disruption(1, 2, "Accident", Severity::Heavy);
        assert!(impact.score > 0.0);
        assert_eq!(manager.mode(), Mode::LazyUpdate);

        let after = manager.distance(1, 3);
        assert!(after > before);
    }
}

//! Public facade: initialisation, query dispatch and the error taxonomy.
//!
//! An [`Engine`] owns the graph (through the disruption manager), the
//! coordinate table and the per-edge road names. Queries are routed
//! according to the manager's mode; unreachable results are values
//! ([`INFINITY`] / empty path), not errors.

use crate::algo::contraction_index::IndexStats;
use crate::datastr::graph::*;
use crate::disruption::{DisruptionManager, DisruptionRecord, ImpactScore, LabelsStatus, Mode, Severity};
use crate::geo::NodeCoordinates;
use crate::import::csv::{read_node_coordinates, read_scenario, ScenarioRow};
use crate::import::dimacs::read_graph_file;
use crate::report::Timer;
use rustc_hash::FxHashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed graph or CSV structure. Row-level problems are skipped and
    /// counted instead.
    #[error("input error: {0}")]
    Input(String),
    /// Node id outside `[1, node_count]`.
    #[error("invalid node id {0}")]
    InvalidNode(NodeId),
    /// No graph node within the snap threshold of the coordinate.
    #[error("no node within {threshold_m}m of ({latitude}, {longitude})")]
    SnapFailed { latitude: f64, longitude: f64, threshold_m: f64 },
    /// GPS routing requested without a loaded coordinate table.
    #[error("coordinate data not loaded")]
    CoordinatesMissing,
    /// Threshold outside the configurable range `[0.1, 1.0]`.
    #[error("disruption threshold must be in [0.1, 1.0], got {0}")]
    ThresholdOutOfRange(f64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn input(line_number: usize, message: &str) -> Error {
        Error::Input(format!("line {}: {}", line_number + 1, message))
    }

    /// CLI exit code class: 1 for usage and input problems, 2 for the rest.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Input(_) | Error::Io(_) => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// separator balance parameter, in `(0, 1)`
    pub balance: f64,
    /// network impact threshold for immediate updates, in `[0.1, 1.0]`
    pub threshold_tau: f64,
    /// default snap radius for GPS queries in meters
    pub snap_threshold_m: f64,
    /// entries kept in the lazy repair cache
    pub repair_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            balance: 0.5,
            threshold_tau: 0.5,
            snap_threshold_m: 1000.0,
            repair_cache_capacity: 4096,
        }
    }
}

/// Result of a GPS-to-GPS routing request.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub distance: Weight,
    pub path: Vec<NodeId>,
    /// road name per traversed segment, `"Unknown Road"` where the scenario
    /// file did not cover the edge
    pub road_names: Vec<String>,
    /// `(lat, lng)` per path node, `(0, 0)` for nodes without coordinates
    pub coordinates: Vec<(f64, f64)>,
    pub uses_disruptions: bool,
    pub estimated_time_minutes: f64,
    pub query_micros: u128,
    /// snapped source node and its snap distance in meters
    pub source_snap: (NodeId, f64),
    pub target_snap: (NodeId, f64),
}

pub struct Engine {
    manager: DisruptionManager,
    coordinates: Option<NodeCoordinates>,
    road_names: FxHashMap<(NodeId, NodeId), String>,
    config: EngineConfig,
}

impl Engine {
    /// Load a graph file, build the index and optionally load coordinates
    /// and a disruption scenario.
    pub fn initialize<P: AsRef<Path>>(graph_path: P, nodes_path: Option<P>, scenario_path: Option<P>, config: EngineConfig) -> Result<Engine, Error> {
        let graph = read_graph_file(graph_path)?;
        report!("graph", { "num_nodes": graph.num_nodes(), "num_edges": graph.num_edges() });

        let mut engine = Engine::from_graph(graph, config);

        if let Some(nodes_path) = nodes_path {
            let (coordinates, skipped) = read_node_coordinates(nodes_path, engine.num_nodes() + 1)?;
            report!("coordinate_rows_skipped", skipped);
            engine.coordinates = Some(coordinates);
        }
        if let Some(scenario_path) = scenario_path {
            engine.load_scenario(scenario_path)?;
        }
        Ok(engine)
    }

    /// Build an engine around an already constructed graph.
    pub fn from_graph(graph: RoadGraph, config: EngineConfig) -> Engine {
        let manager = DisruptionManager::new(graph, config.balance, config.threshold_tau, config.repair_cache_capacity);
        let stats = manager.snapshot().stats();
        report!("index", {
            "size_bytes": stats.size_bytes,
            "label_count": stats.label_count,
            "height": stats.height,
            "avg_cut_size": stats.avg_cut_size,
            "max_cut_size": stats.max_cut_size,
            "num_shortcuts": stats.num_shortcuts,
            "num_folded": stats.num_folded,
        });
        Engine {
            manager,
            coordinates: None,
            road_names: FxHashMap::default(),
            config,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.manager.graph().num_nodes()
    }

    /// Install a coordinate table, e.g. one not backed by a CSV file.
    pub fn set_coordinates(&mut self, coordinates: NodeCoordinates) {
        self.coordinates = Some(coordinates);
    }

    fn check_node(&self, node: NodeId) -> Result<(), Error> {
        if node == 0 || node as usize > self.num_nodes() {
            Err(Error::InvalidNode(node))
        } else {
            Ok(())
        }
    }

    pub fn mode(&self) -> Mode {
        self.manager.mode()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.manager.set_mode(mode);
    }

    pub fn labels_status(&self) -> LabelsStatus {
        self.manager.labels_status()
    }

    pub fn set_disruption_threshold(&mut self, tau: f64) -> Result<(), Error> {
        if !(0.1..=1.0).contains(&tau) {
            return Err(Error::ThresholdOutOfRange(tau));
        }
        self.manager.set_threshold(tau);
        Ok(())
    }

    /// Block until a pending immediate rebuild has published fresh labels.
    pub fn wait_for_fresh_labels(&self) {
        self.manager.wait_for_rebuild();
    }

    /// Shortest distance between two nodes; [`INFINITY`] when unreachable.
    /// `weighted = false` counts hops on the effective graph instead.
    pub fn distance(&mut self, from: NodeId, to: NodeId, weighted: bool) -> Result<Weight, Error> {
        self.check_node(from)?;
        self.check_node(to)?;
        if weighted {
            Ok(self.manager.distance(from, to))
        } else {
            Ok(self.manager.unweighted_distance(from, to))
        }
    }

    /// Shortest distance and node sequence; `(INFINITY, [])` when unreachable.
    pub fn path(&mut self, from: NodeId, to: NodeId) -> Result<(Weight, Vec<NodeId>), Error> {
        self.check_node(from)?;
        self.check_node(to)?;
        Ok(self.manager.path(from, to))
    }

    /// Route between two GPS positions.
    ///
    /// Snapping ignores nodes isolated by the active disruptions. With
    /// `use_disruptions = false` the query runs against the undisrupted
    /// graph regardless of the current mode.
    pub fn route_by_gps(
        &mut self,
        source_lat: f64,
        source_lng: f64,
        target_lat: f64,
        target_lng: f64,
        use_disruptions: bool,
        snap_threshold_m: Option<f64>,
    ) -> Result<RouteInfo, Error> {
        let threshold_m = snap_threshold_m.unwrap_or(self.config.snap_threshold_m);
        let source_snap = self.snap(source_lat, source_lng, threshold_m, use_disruptions)?;
        let target_snap = self.snap(target_lat, target_lng, threshold_m, use_disruptions)?;

        let timer = Timer::new();
        let (distance, path) = if use_disruptions {
            self.manager.path(source_snap.0, target_snap.0)
        } else {
            self.manager.base_path(source_snap.0, target_snap.0)
        };
        let query_micros = timer.get_passed_micros();

        let coordinates = path
            .iter()
            .map(|&node| self.coordinates.as_ref().and_then(|c| c.get(node)).unwrap_or((0.0, 0.0)))
            .collect();
        let road_names = path
            .windows(2)
            .map(|pair| {
                let key = if pair[0] <= pair[1] { (pair[0], pair[1]) } else { (pair[1], pair[0]) };
                self.road_names.get(&key).cloned().unwrap_or_else(|| "Unknown Road".to_string())
            })
            .collect();
        let uses_disruptions = use_disruptions && self.manager.route_uses_disruptions(&path);

        // urban average of 30 km/h, reduced on disrupted routes
        let mut average_speed_kph = 30.0;
        if uses_disruptions {
            average_speed_kph *= 0.7;
        }
        let estimated_time_minutes = if distance >= INFINITY {
            0.0
        } else {
            (distance as f64 / 1000.0) / average_speed_kph * 60.0
        };

        Ok(RouteInfo {
            distance,
            path,
            road_names,
            coordinates,
            uses_disruptions,
            estimated_time_minutes,
            query_micros,
            source_snap,
            target_snap,
        })
    }

    fn snap(&self, latitude: f64, longitude: f64, threshold_m: f64, use_disruptions: bool) -> Result<(NodeId, f64), Error> {
        let coordinates = self.coordinates.as_ref().ok_or(Error::CoordinatesMissing)?;
        let graph = self.manager.graph();
        let snapped = if use_disruptions && self.manager.mode() != Mode::Base {
            coordinates.nearest_matching(latitude, longitude, |node| graph.effective_degree(node) > 0)
        } else {
            coordinates.nearest(latitude, longitude)
        };
        match snapped {
            Some((node, distance)) if distance <= threshold_m => Ok((node, distance)),
            _ => Err(Error::SnapFailed {
                latitude,
                longitude,
                threshold_m,
            }),
        }
    }

    /// Load a scenario CSV and apply it as one disruption batch.
    /// Returns the number of applied rows.
    pub fn load_scenario<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, Error> {
        let (rows, skipped) = read_scenario(path)?;
        report!("scenario_rows_skipped", skipped);
        Ok(self.apply_scenario_rows(rows))
    }

    /// Apply scenario rows as one disruption batch (also used by tests to
    /// bypass the filesystem). Rows naming unknown nodes are dropped.
    pub fn apply_scenario_rows(&mut self, rows: Vec<ScenarioRow>) -> usize {
        let num_nodes = self.num_nodes();
        let mut batch = Vec::new();
        for row in rows {
            if row.source == 0 || row.target == 0 || row.source as usize > num_nodes || row.target as usize > num_nodes {
                continue;
            }
            let key = if row.source <= row.target {
                (row.source, row.target)
            } else {
                (row.target, row.source)
            };
            if !row.road_name.is_empty() {
                self.road_names.insert(key, row.road_name.clone());
            }
            batch.push((key, record_from_scenario(&row)));
        }
        let applied = batch.len();
        self.manager.apply_batch(batch);
        report!("disruptions", {
            "applied": applied,
            "network_percentage": self.manager.network_percentage(),
            "mode": self.manager.mode().to_string(),
            "labels_status": self.manager.labels_status().to_string(),
        });
        applied
    }

    /// Record a user-reported incident on the edge `u`-`v`.
    pub fn add_user_disruption(&mut self, u: NodeId, v: NodeId, incident_type: &str, severity: Severity) -> Result<ImpactScore, Error> {
        self.check_node(u)?;
        self.check_node(v)?;
        Ok(self.manager.add_user_disruption(u, v, incident_type, severity))
    }

    pub fn clear_disruptions(&mut self) {
        self.manager.clear_disruptions();
    }

    pub fn index_stats(&self) -> IndexStats {
        self.manager.snapshot().stats()
    }

    pub fn effective_graph(&self) -> &RoadGraph {
        self.manager.graph()
    }
}

/// Derive the disruption record for one scenario row, including the
/// incident classification.
pub fn record_from_scenario(row: &ScenarioRow) -> DisruptionRecord {
    let ratio = row.slowdown_ratio();
    DisruptionRecord {
        slowdown: ratio,
        closed: row.is_closed,
        severity: Severity::from_ratio(ratio, row.is_closed),
        incident_type: classify_incident(ratio, row.jam_factor, row.is_closed, row.speed_kph, row.segment_length).to_string(),
        jam_factor: row.jam_factor.clamp(0.0, 10.0),
        segment_length: row.segment_length,
    }
}

/// Heuristic incident label from the measured traffic values.
pub fn classify_incident(slowdown_ratio: f64, jam_factor: f64, closed: bool, speed_kph: f64, segment_length: f64) -> &'static str {
    if closed || jam_factor >= 10.0 {
        "Road Closure"
    } else if speed_kph < 2.0 && jam_factor > 7.0 {
        "Accident"
    } else if slowdown_ratio <= 0.5 && jam_factor < 7.0 {
        "Construction"
    } else if jam_factor > 7.0 && speed_kph < 5.0 {
        "Congestion"
    } else if speed_kph <= 1.0 && jam_factor < 4.0 && segment_length < 100.0 {
        "Disabled Vehicle"
    } else if slowdown_ratio < 0.4 {
        "Road Hazard"
    } else if (10.0..=15.0).contains(&speed_kph) {
        "Lane Restriction"
    } else if speed_kph < 10.0 {
        "Weather"
    } else {
        "Other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incident_classification_matches_the_heuristics() {
        assert_eq!(classify_incident(0.5, 10.0, true, 0.0, 100.0), "Road Closure");
        assert_eq!(classify_incident(0.1, 8.0, false, 1.0, 100.0), "Accident");
        assert_eq!(classify_incident(0.4, 5.0, false, 12.0, 100.0), "Construction");
        assert_eq!(classify_incident(0.6, 8.0, false, 4.0, 100.0), "Congestion");
        assert_eq!(classify_incident(0.9, 9.0, false, 20.0, 100.0), "Other");
    }
}

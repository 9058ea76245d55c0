use hc2l::algo::build_index;
use hc2l::datastr::graph::*;
use hc2l::disruption::{DisruptionManager, DisruptionRecord, Mode, Severity};
use hc2l::engine::{Engine, EngineConfig, Error};
use hc2l::geo::NodeCoordinates;
use hc2l::import::csv::ScenarioRow;
use rand::prelude::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

fn diamond() -> RoadGraph {
    let mut edges = EdgeList::new(4);
    edges.add_edge(1, 2, 10);
    edges.add_edge(1, 3, 15);
    edges.add_edge(2, 4, 20);
    edges.add_edge(3, 4, 5);
    edges.build()
}

fn chain(n: u32) -> RoadGraph {
    let mut edges = EdgeList::new(n as usize);
    for v in 1..n {
        edges.add_edge(v, v + 1, 1);
    }
    edges.build()
}

fn ring(n: u32) -> RoadGraph {
    let mut edges = EdgeList::new(n as usize);
    for v in 1..n {
        edges.add_edge(v, v + 1, 1);
    }
    edges.add_edge(n, 1, 1);
    edges.build()
}

/// Random connected graph: a random spanning tree plus extra edges.
fn random_graph(seed: u64, num_nodes: u32, extra_edges: usize) -> RoadGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut edges = EdgeList::new(num_nodes as usize);
    for v in 2..=num_nodes {
        let u = rng.gen_range(1..v);
        edges.add_edge(u, v, rng.gen_range(1..=20));
    }
    let mut added = 0;
    while added < extra_edges {
        let u = rng.gen_range(1..=num_nodes);
        let v = rng.gen_range(1..=num_nodes);
        if edges.add_edge(u, v, rng.gen_range(1..=20)) {
            added += 1;
        }
    }
    edges.build()
}

/// Independent Dijkstra over the effective graph, as ground truth.
fn reference_distance(graph: &RoadGraph, from: NodeId, to: NodeId) -> Weight {
    let mut distances = vec![INFINITY as u64; graph.num_slots()];
    let mut queue = BinaryHeap::new();
    distances[from as usize] = 0;
    queue.push(Reverse((0u64, from)));
    while let Some(Reverse((distance, node))) = queue.pop() {
        if node == to {
            return distance as Weight;
        }
        if distance > distances[node as usize] {
            continue;
        }
        for link in graph.link_iter(node) {
            if link.weight >= INFINITY {
                continue;
            }
            let next = distance + link.weight as u64;
            if next < distances[link.node as usize] {
                distances[link.node as usize] = next;
                queue.push(Reverse((next, link.node)));
            }
        }
    }
    INFINITY
}

fn closure_row(u: NodeId, v: NodeId) -> ScenarioRow {
    ScenarioRow {
        source: u,
        target: v,
        road_name: "Test Road".to_string(),
        speed_kph: 0.0,
        freeflow_kph: 40.0,
        jam_factor: 10.0,
        is_closed: true,
        segment_length: 120.0,
    }
}

fn slowdown_row(u: NodeId, v: NodeId, speed_kph: f64, freeflow_kph: f64) -> ScenarioRow {
    ScenarioRow {
        source: u,
        target: v,
        road_name: "Test Road".to_string(),
        speed_kph,
        freeflow_kph,
        jam_factor: 6.0,
        is_closed: false,
        segment_length: 120.0,
    }
}

#[test]
fn s1_diamond_distance_and_path() {
    let mut engine = Engine::from_graph(diamond(), EngineConfig::default());
    assert_eq!(engine.distance(1, 4, true).unwrap(), 20);
    let (distance, path) = engine.path(1, 4).unwrap();
    assert_eq!(distance, 20);
    assert_eq!(path, vec![1, 3, 4]);
}

#[test]
fn s2_closure_forces_immediate_update_and_disconnects() {
    let mut engine = Engine::from_graph(chain(5), EngineConfig::default());
    engine.set_disruption_threshold(0.1).unwrap();
    engine.apply_scenario_rows(vec![closure_row(3, 4)]);

    assert_eq!(engine.mode(), Mode::ImmediateUpdate);
    engine.wait_for_fresh_labels();

    assert_eq!(engine.distance(1, 5, true).unwrap(), INFINITY);
    let (distance, path) = engine.path(1, 5).unwrap();
    assert_eq!(distance, INFINITY);
    assert!(path.is_empty());
}

#[test]
fn s3_slowdown_uses_the_inverse_ratio_weight_convention() {
    let mut engine = Engine::from_graph(chain(5), EngineConfig::default());
    // speed 20 of 40 kph: ratio 0.5, so the edge weight doubles
    engine.apply_scenario_rows(vec![slowdown_row(3, 4, 20.0, 40.0)]);

    assert_eq!(engine.mode(), Mode::LazyUpdate);
    assert_eq!(engine.distance(1, 5, true).unwrap(), 5);
}

#[test]
fn s5_heavy_scenario_rebuilds_and_agrees_with_dijkstra() {
    let graph = ring(10);
    let mut engine = Engine::from_graph(graph.clone(), EngineConfig::default());

    // close 6 of 10 edges: weighted impact 12/10, capped to 1.0 >= 0.5
    let rows: Vec<ScenarioRow> = (1..=6).map(|v| closure_row(v, v + 1)).collect();
    engine.apply_scenario_rows(rows);
    assert_eq!(engine.mode(), Mode::ImmediateUpdate);
    engine.wait_for_fresh_labels();

    let effective = engine.effective_graph().clone();
    for u in 1..=10 {
        for w in 1..=10 {
            assert_eq!(
                engine.distance(u, w, true).unwrap(),
                reference_distance(&effective, u, w),
                "pair ({}, {})",
                u,
                w
            );
        }
    }
}

#[test]
fn s6_user_disruption_increases_affected_distance() {
    // two parallel routes of different length plus slack edges to keep the
    // batch below the threshold
    let mut edges = EdgeList::new(8);
    edges.add_edge(1, 2, 1);
    edges.add_edge(2, 3, 1);
    edges.add_edge(1, 4, 3);
    edges.add_edge(4, 3, 3);
    edges.add_edge(3, 5, 1);
    edges.add_edge(5, 6, 1);
    edges.add_edge(6, 7, 1);
    edges.add_edge(7, 8, 1);
    let mut engine = Engine::from_graph(edges.build(), EngineConfig::default());

    let before = engine.distance(1, 3, true).unwrap();
    assert_eq!(before, 2);

    engine.add_user_disruption(1, 2, "Accident", Severity::Heavy).unwrap();
    assert_eq!(engine.mode(), Mode::LazyUpdate);

    let after = engine.distance(1, 3, true).unwrap();
    assert!(after > before, "distance {} should exceed {}", after, before);
}

#[test]
fn base_mode_agrees_with_dijkstra_on_random_graphs() {
    for seed in [7, 42, 1337] {
        let graph = random_graph(seed, 60, 90);
        let mut engine = Engine::from_graph(graph.clone(), EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(seed ^ 0xabcd);
        for _ in 0..300 {
            let u = rng.gen_range(1..=60);
            let w = rng.gen_range(1..=60);
            assert_eq!(
                engine.distance(u, w, true).unwrap(),
                reference_distance(&graph, u, w),
                "seed {} pair ({}, {})",
                seed,
                u,
                w
            );
        }
    }
}

#[test]
fn returned_paths_are_valid_and_match_the_distance() {
    let graph = random_graph(99, 40, 60);
    let mut engine = Engine::from_graph(graph.clone(), EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(4711);

    for _ in 0..200 {
        let u = rng.gen_range(1..=40);
        let w = rng.gen_range(1..=40);
        let (distance, path) = engine.path(u, w).unwrap();
        if distance >= INFINITY {
            assert!(path.is_empty());
            continue;
        }
        assert_eq!(*path.first().unwrap(), u);
        assert_eq!(*path.last().unwrap(), w);
        let mut sum: u64 = 0;
        for pair in path.windows(2) {
            let weight = graph.edge_weight(pair[0], pair[1]).expect("path uses a non-existent edge");
            sum += weight as u64;
        }
        assert_eq!(sum, distance as u64);
    }
}

#[test]
fn closures_never_decrease_distances() {
    let graph = random_graph(5, 30, 40);
    let mut engine = Engine::from_graph(graph, EngineConfig::default());

    let pairs: Vec<(NodeId, NodeId)> = (1..=30).map(|v| (v, 31 - v)).collect();
    let before: Vec<Weight> = pairs.iter().map(|&(u, w)| engine.distance(u, w, true).unwrap()).collect();

    engine.set_mode(Mode::Disrupted);
    engine.add_user_disruption(1, 2, "Roadwork", Severity::Closed).ok();
    engine.add_user_disruption(10, 11, "Roadwork", Severity::Closed).ok();

    // user disruptions re-select the update policy; force plain effective-graph search
    engine.set_mode(Mode::Disrupted);
    for (&(u, w), &old) in pairs.iter().zip(before.iter()) {
        let new = engine.distance(u, w, true).unwrap();
        assert!(new >= old, "closure shortened ({}, {}): {} < {}", u, w, new, old);
    }
}

#[test]
fn disrupted_mode_agrees_with_dijkstra_on_the_effective_graph() {
    let graph = random_graph(21, 40, 60);
    let mut engine = Engine::from_graph(graph, EngineConfig::default());
    engine.apply_scenario_rows(vec![closure_row(1, 2), slowdown_row(5, 6, 10.0, 40.0)]);
    engine.set_mode(Mode::Disrupted);

    let effective = engine.effective_graph().clone();
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let u = rng.gen_range(1..=40);
        let w = rng.gen_range(1..=40);
        assert_eq!(engine.distance(u, w, true).unwrap(), reference_distance(&effective, u, w));
    }
}

#[test]
fn snapshots_survive_mode_transitions() {
    let mut manager = DisruptionManager::new(chain(5), 0.5, 0.1, 64);
    let old_snapshot = manager.snapshot();

    manager.apply_batch(vec![(
        (3, 4),
        DisruptionRecord {
            slowdown: 1.0,
            closed: true,
            severity: Severity::Closed,
            incident_type: "Road Closure".to_string(),
            jam_factor: 10.0,
            segment_length: 100.0,
        },
    )]);
    assert_eq!(manager.mode(), Mode::ImmediateUpdate);
    manager.wait_for_rebuild();

    // the old snapshot still answers against the graph it was built on
    assert_eq!(old_snapshot.distance(1, 5), 4);
    assert_eq!(manager.snapshot().distance(1, 5), INFINITY);
}

#[test]
fn rebuilding_on_the_same_effective_graph_is_byte_identical() {
    let mut graph = random_graph(11, 30, 40);
    graph.mark_closed(1, 2, true);
    graph.apply_slowdown(3, 4, 0.5);

    let mut first = Vec::new();
    build_index(&graph, 0.5).write_to(&mut first).unwrap();
    let mut second = Vec::new();
    build_index(&graph, 0.5).write_to(&mut second).unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn gps_routing_snaps_and_reports_route_details() {
    let mut engine = Engine::from_graph(chain(4), EngineConfig::default());
    let mut coordinates = NodeCoordinates::new(5);
    coordinates.set(1, 14.60, 121.00);
    coordinates.set(2, 14.61, 121.00);
    coordinates.set(3, 14.62, 121.00);
    coordinates.set(4, 14.63, 121.00);
    engine.set_coordinates(coordinates);

    let route = engine.route_by_gps(14.601, 121.0, 14.629, 121.0, false, None).unwrap();
    assert_eq!(route.source_snap.0, 1);
    assert_eq!(route.target_snap.0, 4);
    assert_eq!(route.path, vec![1, 2, 3, 4]);
    assert_eq!(route.distance, 3);
    assert_eq!(route.road_names.len(), 3);
    assert!(!route.uses_disruptions);

    // nothing anywhere near this coordinate
    let err = engine.route_by_gps(0.0, 0.0, 14.6, 121.0, false, None).unwrap_err();
    assert!(matches!(err, Error::SnapFailed { .. }));
}

#[test]
fn invalid_nodes_are_rejected() {
    let mut engine = Engine::from_graph(diamond(), EngineConfig::default());
    assert!(matches!(engine.distance(0, 3, true), Err(Error::InvalidNode(0))));
    assert!(matches!(engine.distance(1, 9, true), Err(Error::InvalidNode(9))));
    assert!(matches!(engine.path(5, 1), Err(Error::InvalidNode(5))));
    assert!(matches!(engine.set_disruption_threshold(0.05), Err(Error::ThresholdOutOfRange(_))));
}

#[test]
fn unweighted_queries_count_hops() {
    let mut engine = Engine::from_graph(diamond(), EngineConfig::default());
    assert_eq!(engine.distance(1, 4, false).unwrap(), 2);
    assert_eq!(engine.distance(2, 3, false).unwrap(), 2);
    assert_eq!(engine.distance(1, 1, false).unwrap(), 0);
}

#[test]
fn clearing_a_scenario_returns_to_base() {
    let mut engine = Engine::from_graph(chain(5), EngineConfig::default());
    engine.set_disruption_threshold(0.1).unwrap();
    engine.apply_scenario_rows(vec![closure_row(3, 4)]);
    engine.wait_for_fresh_labels();
    assert_eq!(engine.distance(1, 5, true).unwrap(), INFINITY);

    engine.clear_disruptions();
    assert_eq!(engine.mode(), Mode::Base);
    assert_eq!(engine.distance(1, 5, true).unwrap(), 4);
}

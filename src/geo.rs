//! Coordinate handling: haversine distances, the node coordinate table and
//! the nearest-node snap.
//!
//! Nearest-node lookup is a linear scan. The snap sits off the query hot
//! path, so a spatial index would only pay off for very large coordinate
//! tables; measure before reaching for one.

use crate::datastr::graph::*;

const EARTH_RADIUS_M: f64 = 6_371_000.8;

/// Great-circle distance between two WGS84 coordinates in meters.
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Dense per-node coordinate table, 1-based like the graph.
#[derive(Debug, Clone)]
pub struct NodeCoordinates {
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    present: Vec<bool>,
}

impl NodeCoordinates {
    pub fn new(num_slots: usize) -> NodeCoordinates {
        NodeCoordinates {
            latitude: vec![0.0; num_slots],
            longitude: vec![0.0; num_slots],
            present: vec![false; num_slots],
        }
    }

    pub fn set(&mut self, node: NodeId, latitude: f64, longitude: f64) {
        self.latitude[node as usize] = latitude;
        self.longitude[node as usize] = longitude;
        self.present[node as usize] = true;
    }

    pub fn get(&self, node: NodeId) -> Option<(f64, f64)> {
        if self.present[node as usize] {
            Some((self.latitude[node as usize], self.longitude[node as usize]))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.present.iter().any(|&p| p)
    }

    /// Nearest node to the given coordinate, with its haversine distance in
    /// meters. Linear scan over all known coordinates.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<(NodeId, f64)> {
        self.nearest_matching(latitude, longitude, |_| true)
    }

    /// Nearest node satisfying `accept`. Used to skip nodes isolated by
    /// disruptions when snapping under an active scenario.
    pub fn nearest_matching(&self, latitude: f64, longitude: f64, mut accept: impl FnMut(NodeId) -> bool) -> Option<(NodeId, f64)> {
        let mut best: Option<(NodeId, f64)> = None;
        for node in 1..self.present.len() {
            if !self.present[node] || !accept(node as NodeId) {
                continue;
            }
            let distance = haversine_distance_m(latitude, longitude, self.latitude[node], self.longitude[node]);
            if best.map(|(_, b)| distance < b).unwrap_or(true) {
                best = Some((node as NodeId, distance));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_sanity() {
        // one degree of latitude is about 111km
        let d = haversine_distance_m(14.0, 121.0, 15.0, 121.0);
        assert!((d - 111_195.0).abs() < 500.0, "got {}", d);
        assert_eq!(haversine_distance_m(14.6, 121.0, 14.6, 121.0), 0.0);
    }

    #[test]
    fn nearest_picks_the_closest_present_node() {
        let mut coords = NodeCoordinates::new(4);
        coords.set(1, 14.60, 121.00);
        coords.set(2, 14.65, 121.05);
        coords.set(3, 14.70, 121.10);

        let (node, distance) = coords.nearest(14.61, 121.01).unwrap();
        assert_eq!(node, 1);
        assert!(distance < 2_000.0);

        let (node, _) = coords.nearest_matching(14.61, 121.01, |n| n != 1).unwrap();
        assert_eq!(node, 2);
    }
}

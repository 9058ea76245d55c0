//! CSV readers: node coordinates, disruption scenarios and OD pairs.
//!
//! Row-level problems are counted and skipped, broken headers are fatal.

use crate::datastr::graph::NodeId;
use crate::engine::Error;
use crate::geo::NodeCoordinates;
use std::path::Path;

/// One row of a disruption scenario file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRow {
    pub source: NodeId,
    pub target: NodeId,
    pub road_name: String,
    pub speed_kph: f64,
    pub freeflow_kph: f64,
    pub jam_factor: f64,
    pub is_closed: bool,
    pub segment_length: f64,
}

impl ScenarioRow {
    /// Measured speed over freeflow speed, clamped into `(0, 1]`.
    pub fn slowdown_ratio(&self) -> f64 {
        let freeflow = if self.freeflow_kph > 0.0 { self.freeflow_kph } else { 1.0 };
        (self.speed_kph / freeflow).clamp(1e-9, 1.0)
    }
}

/// Read `node_id,latitude,longitude` rows. Returns the coordinate table and
/// the number of skipped rows.
pub fn read_node_coordinates<P: AsRef<Path>>(path: P, num_slots: usize) -> Result<(NodeCoordinates, usize), Error> {
    let mut reader = csv::Reader::from_path(path.as_ref()).map_err(csv_open_error)?;
    expect_header(&mut reader, &["node_id", "latitude", "longitude"])?;

    let mut coords = NodeCoordinates::new(num_slots);
    let mut skipped = 0;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        let parsed = (
            record.get(0).and_then(|f| f.parse::<NodeId>().ok()),
            record.get(1).and_then(|f| f.parse::<f64>().ok()),
            record.get(2).and_then(|f| f.parse::<f64>().ok()),
        );
        match parsed {
            (Some(node), Some(latitude), Some(longitude)) if node != 0 && (node as usize) < num_slots => {
                coords.set(node, latitude, longitude);
            }
            _ => skipped += 1,
        }
    }
    Ok((coords, skipped))
}

/// Read a scenario file. Rows with missing or malformed fields beyond the
/// first six are skipped silently; the skip count is returned for telemetry.
pub fn read_scenario<P: AsRef<Path>>(path: P) -> Result<(Vec<ScenarioRow>, usize), Error> {
    let mut reader = csv::Reader::from_path(path.as_ref()).map_err(csv_open_error)?;
    {
        let headers = reader.headers().map_err(|e| Error::Input(format!("broken scenario header: {}", e)))?;
        if headers.len() < 12 {
            return Err(Error::Input(format!("scenario header has {} fields, expected 12", headers.len())));
        }
    }

    let mut rows = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        match parse_scenario_row(&record) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    Ok((rows, skipped))
}

fn parse_scenario_row(record: &csv::StringRecord) -> Option<ScenarioRow> {
    if record.len() < 12 {
        return None;
    }
    Some(ScenarioRow {
        source: record.get(4)?.trim().parse().ok()?,
        target: record.get(5)?.trim().parse().ok()?,
        road_name: record.get(6)?.to_string(),
        speed_kph: record.get(7)?.trim().parse().ok()?,
        freeflow_kph: record.get(8)?.trim().parse().ok()?,
        jam_factor: record.get(9)?.trim().parse().ok()?,
        is_closed: matches!(record.get(10)?.trim(), "True" | "true" | "1"),
        segment_length: record.get(11)?.trim().parse().ok()?,
    })
}

/// Read `source,target` OD pairs, one query per row.
pub fn read_od_pairs<P: AsRef<Path>>(path: P) -> Result<Vec<(NodeId, NodeId)>, Error> {
    let mut reader = csv::Reader::from_path(path.as_ref()).map_err(csv_open_error)?;
    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Input(format!("broken od row: {}", e)))?;
        let source = record
            .get(0)
            .and_then(|f| f.trim().parse().ok())
            .ok_or_else(|| Error::Input("malformed od source".to_string()))?;
        let target = record
            .get(1)
            .and_then(|f| f.trim().parse().ok())
            .ok_or_else(|| Error::Input("malformed od target".to_string()))?;
        pairs.push((source, target));
    }
    Ok(pairs)
}

fn expect_header(reader: &mut csv::Reader<std::fs::File>, expected: &[&str]) -> Result<(), Error> {
    let headers = reader.headers().map_err(|e| Error::Input(format!("broken header: {}", e)))?;
    let ok = headers.len() >= expected.len()
        && headers
            .iter()
            .zip(expected.iter())
            .all(|(field, expected)| field.trim().eq_ignore_ascii_case(expected));
    if ok {
        Ok(())
    } else {
        Err(Error::Input(format!("unexpected header, need columns {:?}", expected)))
    }
}

fn csv_open_error(err: csv::Error) -> Error {
    match err.kind() {
        csv::ErrorKind::Io(_) => {
            if let csv::ErrorKind::Io(io) = err.into_kind() {
                Error::Io(io)
            } else {
                unreachable!()
            }
        }
        _ => Error::Input(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("hc2l_csv_test_{}_{:?}", std::process::id(), std::thread::current().id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn coordinates_roundtrip_with_skips() {
        let path = temp_file("node_id,latitude,longitude\n1,14.6,121.0\n2,broken,121.1\n3,14.7,121.2\n");
        let (coords, skipped) = read_node_coordinates(&path, 4).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(coords.get(1), Some((14.6, 121.0)));
        assert_eq!(coords.get(2), None);
        assert_eq!(coords.get(3), Some((14.7, 121.2)));
        assert_eq!(skipped, 1);
    }

    #[test]
    fn scenario_rows_parse_and_skip() {
        let header = "source_lat,source_lng,target_lat,target_lng,source_id,target_id,road_name,speed_kph,freeflow_kph,jam_factor,is_closed,segment_length\n";
        let good = "14.6,121.0,14.7,121.1,3,4,Commonwealth Ave,10.0,40.0,8.0,False,250.0\n";
        let bad = "14.6,121.0,14.7,121.1,5,6,Some Road,notanumber,40.0,8.0,False,250.0\n";
        let path = temp_file(&format!("{}{}{}", header, good, bad));
        let (rows, skipped) = read_scenario(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 1);
        let row = &rows[0];
        assert_eq!((row.source, row.target), (3, 4));
        assert!(!row.is_closed);
        assert!((row.slowdown_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn broken_scenario_header_is_fatal() {
        let path = temp_file("just,three,cols\n1,2,3\n");
        assert!(read_scenario(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}

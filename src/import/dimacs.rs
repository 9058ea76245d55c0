//! Reader for the line-oriented DIMACS-style graph format:
//!
//! ```text
//! p sp <n> <m>
//! a <u> <v> <w>
//! c <comment>
//! ```
//!
//! Every `a` line describes one undirected edge. Comment lines are ignored,
//! structural problems are fatal.

use crate::datastr::graph::*;
use crate::engine::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub fn read_graph_file<P: AsRef<Path>>(path: P) -> Result<RoadGraph, Error> {
    let file = File::open(path.as_ref())?;
    read_graph(BufReader::new(file))
}

pub fn read_graph<R: BufRead>(reader: R) -> Result<RoadGraph, Error> {
    let mut edges: Option<EdgeList> = None;
    let mut num_nodes = 0;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }

        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("p") => {
                if edges.is_some() {
                    return Err(Error::input(line_number, "duplicate problem line"));
                }
                if fields.next() != Some("sp") {
                    return Err(Error::input(line_number, "expected problem line `p sp <n> <m>`"));
                }
                num_nodes = parse_field(&mut fields, line_number, "node count")?;
                let _num_edges: usize = parse_field(&mut fields, line_number, "edge count")?;
                edges = Some(EdgeList::new(num_nodes));
            }
            Some("a") => {
                let edges = edges.as_mut().ok_or_else(|| Error::input(line_number, "arc line before problem line"))?;
                let u: NodeId = parse_field(&mut fields, line_number, "tail node")?;
                let v: NodeId = parse_field(&mut fields, line_number, "head node")?;
                let weight: Weight = parse_field(&mut fields, line_number, "weight")?;
                if u == 0 || v == 0 || u as usize > num_nodes || v as usize > num_nodes {
                    return Err(Error::input(line_number, "node id out of range"));
                }
                if weight == 0 || weight > MAX_WEIGHT {
                    return Err(Error::input(line_number, "weight out of range"));
                }
                // self-loops are meaningless for routing, the store drops them
                edges.add_edge(u, v, weight);
            }
            _ => return Err(Error::input(line_number, "unrecognized line type")),
        }
    }

    edges.map(EdgeList::build).ok_or_else(|| Error::Input("graph file contains no problem line".to_string()))
}

fn parse_field<T: std::str::FromStr>(fields: &mut std::str::SplitWhitespace, line_number: usize, what: &str) -> Result<T, Error> {
    fields
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| Error::input(line_number, &format!("missing or malformed {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastr::graph::Graph;

    #[test]
    fn reads_a_small_graph() {
        let input = "c tiny test graph\np sp 3 2\na 1 2 10\na 2 3 20\n";
        let graph = read_graph(input.as_bytes()).unwrap();
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_edges(), 2);
        assert_eq!(graph.edge_weight(1, 2), Some(10));
        assert_eq!(graph.edge_weight(3, 2), Some(20));
    }

    #[test]
    fn rejects_out_of_range_ids() {
        let input = "p sp 2 1\na 1 5 10\n";
        assert!(read_graph(input.as_bytes()).is_err());
    }

    #[test]
    fn rejects_missing_problem_line() {
        let input = "a 1 2 10\n";
        assert!(read_graph(input.as_bytes()).is_err());
    }
}

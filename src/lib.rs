//! HC2L - hierarchical 2-hop cut labelling for road networks.
//!
//! The crate builds a separator-based hierarchy over a weighted undirected
//! road graph, derives a 2-hop distance labelling from it and answers
//! distance and path queries through a read-optimised [`algo::contraction_index::ContractionIndex`].
//! Runtime disruptions (closures and slowdowns) are handled by the
//! [`disruption::DisruptionManager`], which scores each disruption batch and
//! either eagerly rebuilds the labelling in the background or marks the
//! affected labels stale and repairs them on access.
//!
//! [`engine::Engine`] is the public facade tying everything together.

#[macro_use]
pub mod report;
pub mod algo;
pub mod datastr;
pub mod disruption;
pub mod engine;
pub mod geo;
pub mod import;
pub mod io;
pub mod util;

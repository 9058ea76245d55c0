//! Readers for the external input formats: DIMACS-style graph files and the
//! coordinate / scenario / OD-pair CSVs.

pub mod csv;
pub mod dimacs;

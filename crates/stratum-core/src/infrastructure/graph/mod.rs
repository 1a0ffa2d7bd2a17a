//! Graph engine infrastructure
//!
//! Ephemeral concept-graph projections stored as SQLite tables, clustered by
//! an injected partitioning algorithm.

mod engine;

pub use engine::{GraphPartitioner, ProjectedEdge, ProjectedGraph, SqliteGraphEngine};

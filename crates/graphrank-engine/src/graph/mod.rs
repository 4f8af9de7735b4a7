//! Graph construction for the PageRank engine.
//!
//! # Overview
//!
//! [`load::LoadedGraph`] reads the caller's edge relation (and optional
//! vertex relation) through the tabular store, collapses duplicate edges,
//! and builds a petgraph `DiGraph` whose node indices follow sorted
//! [`graphrank_core::NodeId`] order. [`degree::OutDegreeIndex`] then derives
//! each node's out-degree and the sink set once for the whole run.
//!
//! ## Cache Invalidation
//!
//! [`LoadedGraph::content_hash`] is a BLAKE3 hash of the sorted edge set.
//! Two runs reporting the same hash saw the same edges.

pub mod degree;
pub mod load;

pub use degree::OutDegreeIndex;
pub use load::{EdgeSource, GraphInput, LoadedGraph, VertexSource};

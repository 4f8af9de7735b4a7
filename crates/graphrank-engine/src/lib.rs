#![forbid(unsafe_code)]
//! graphrank-engine library.
//!
//! Damped PageRank over an edge list held in a [`TabularStore`]:
//!
//! ```text
//! edge relation (+ optional vertex relation)
//!        ↓  graph::LoadedGraph::load()
//! LoadedGraph (deduplicated, deterministic node order)
//!        ↓  graph::OutDegreeIndex::{from_graph, from_store}()
//! OutDegreeIndex (out-degree + sink set, computed once)
//!        ↓  rank::IterationEngine::run()
//! RankOutcome (Converged | MaxIterReached | Stopped)
//!        ↓  rank::ResultMaterializer::write()
//! <output> and <output>_summary relations
//! ```
//!
//! [`compute::compute`] wires the stages together.
//!
//! # Conventions
//!
//! - **Errors**: Return [`graphrank_core::RankError`]; validation errors are
//!   raised before the first iteration.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
//!
//! [`TabularStore`]: graphrank_core::TabularStore

pub mod compute;
pub mod graph;
pub mod rank;

pub use compute::{EngineOptions, RankRequest, compute};
pub use graph::{GraphInput, LoadedGraph, OutDegreeIndex};
pub use rank::{PageRankParams, PageRankReport, StopFlag, Termination};

//! Damped PageRank iteration.
//!
//! # Overview
//!
//! Each pass computes, for every node `v`:
//!
//! ```text
//! r'[v] = (1 - d) / N  +  d * ( Σ_{u→v} r[u] / outdeg(u)  +  S / N )
//! ```
//!
//! where `S` is the total rank held by sinks in the previous pass. Spreading
//! sink mass uniformly keeps `Σ r' = 1` on every pass.
//!
//! The incoming sum is delegated to an [`IncomingAggregator`]:
//! [`ParallelAggregator`] shards the edge list over the rayon pool, while
//! [`StoreAggregator`] pushes a join plus grouped sum into the tabular store.
//! Both produce the same ranks up to floating-point reassociation.
//!
//! # Termination
//!
//! After each pass the engine checks, in order: convergence (L1 change
//! `Σ |r'[v] - r[v]|` below epsilon), the iteration cap, then the caller's
//! [`StopFlag`].

pub mod aggregate;
pub mod engine;
pub mod materialize;
pub mod params;
pub mod report;

pub use aggregate::{IncomingAggregator, ParallelAggregator, StoreAggregator};
pub use engine::{IterationEngine, RankOutcome, RankState, Step, StopFlag, Termination};
pub use materialize::ResultMaterializer;
pub use params::{PageRankParams, ResolvedParams, default_epsilon};
pub use report::{PageRankReport, RankEntry, RunSummary};

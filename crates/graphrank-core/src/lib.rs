#![forbid(unsafe_code)]
//! graphrank-core library.
//!
//! Shared building blocks for the PageRank engine: node identifiers, the
//! error taxonomy, configuration loading, and the tabular store the engine
//! reads edge lists from and writes results to.
//!
//! # Conventions
//!
//! - **Errors**: library APIs return [`error::RankError`] or
//!   [`store::StoreError`]; configuration helpers use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod error;
pub mod node;
pub mod store;

pub use error::{ErrorCode, RankError};
pub use node::NodeId;
pub use store::{SqliteStore, StoreError, TabularStore};

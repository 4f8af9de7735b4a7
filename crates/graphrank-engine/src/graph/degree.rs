//! Out-degree and sink index.
//!
//! Computed once per run and reused by every iteration. Out-degree counts
//! distinct outgoing edges, self-loops included. A node with out-degree 0
//! is a sink; its rank mass is redistributed uniformly each iteration.

#![allow(clippy::module_name_repetitions)]

use graphrank_core::store::{ColumnRef, TableRef};
use graphrank_core::{ErrorCode, NodeId, RankError, TabularStore};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;

use super::LoadedGraph;

/// Per-node out-degree plus the sink set, indexed like [`LoadedGraph::nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutDegreeIndex {
    degrees: Vec<usize>,
    sinks: Vec<usize>,
}

impl OutDegreeIndex {
    /// Count outgoing neighbors of every node in the loaded graph.
    #[must_use]
    pub fn from_graph(loaded: &LoadedGraph) -> Self {
        let graph = &loaded.graph;
        let degrees: Vec<usize> = (0..graph.node_count())
            .into_par_iter()
            .map(|i| {
                graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
                    .count()
            })
            .collect();
        Self::from_degrees(degrees)
    }

    /// Count out-degrees inside the store with a grouped count on `src`.
    ///
    /// `edges` must hold distinct `(src, dst)` pairs (see
    /// [`crate::rank::StoreAggregator::edge_relation`]); duplicates would
    /// inflate the counts. Nodes absent from the result are sinks.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] if a grouped key is not a valid
    /// node identifier, [`RankError::Internal`] if it is not part of the
    /// loaded node set, or a store error.
    pub fn from_store<S: TabularStore>(
        store: &S,
        edges: &TableRef,
        src: &ColumnRef,
        loaded: &LoadedGraph,
    ) -> Result<Self, RankError> {
        let mut degrees = vec![0usize; loaded.node_count()];
        for (value, count) in store.grouped_count(edges, src)? {
            let id = NodeId::from_value(&value).ok_or_else(|| {
                RankError::invalid(
                    ErrorCode::InvalidNodeId,
                    format!("grouped key {value:?} is not a node identifier"),
                )
            })?;
            let Some(idx) = loaded.node_index(&id) else {
                return Err(RankError::Internal(format!(
                    "edge source {id} is missing from the node set"
                )));
            };
            degrees[idx.index()] = usize::try_from(count)
                .map_err(|_| RankError::Internal(format!("out-degree {count} overflows usize")))?;
        }
        Ok(Self::from_degrees(degrees))
    }

    fn from_degrees(degrees: Vec<usize>) -> Self {
        let sinks = degrees
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| (d == 0).then_some(i))
            .collect();
        Self { degrees, sinks }
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Out-degree of node `i`.
    #[must_use]
    pub fn out_degree(&self, i: usize) -> usize {
        self.degrees[i]
    }

    #[must_use]
    pub fn is_sink(&self, i: usize) -> bool {
        self.degrees[i] == 0
    }

    /// Sink indices in ascending order.
    #[must_use]
    pub fn sinks(&self) -> &[usize] {
        &self.sinks
    }

    #[must_use]
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }
}

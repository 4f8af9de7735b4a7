//! Incoming-rank aggregation strategies.
//!
//! An aggregator answers one question per pass: for every node `v`, what is
//! `Σ_{u→v} r[u] / outdeg(u)`? Damping and sink redistribution are applied
//! by the engine, not here.

#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;

use graphrank_core::store::{
    Affinity, ColumnDef, ColumnRef, Ident, JoinColumn, JoinSpec, Relation, TableRef, WriteMode,
};
use graphrank_core::{ErrorCode, NodeId, RankError, TabularStore};
use rayon::prelude::*;
use rusqlite::types::Value;
use tracing::{trace, warn};

use crate::graph::{LoadedGraph, OutDegreeIndex};

/// Computes the undamped incoming rank of every node.
pub trait IncomingAggregator {
    /// Return a vector indexed like `ranks` where entry `v` is
    /// `Σ_{u→v} ranks[u] / degrees.out_degree(u)`.
    ///
    /// # Errors
    ///
    /// Implementations backed by a store propagate its failures.
    fn incoming(&self, ranks: &[f64], degrees: &OutDegreeIndex) -> Result<Vec<f64>, RankError>;
}

// ---------------------------------------------------------------------------
// ParallelAggregator
// ---------------------------------------------------------------------------

/// In-memory aggregation over fixed-size edge shards on the rayon pool.
#[derive(Debug, Clone)]
pub struct ParallelAggregator {
    edges: Vec<(usize, usize)>,
    node_count: usize,
    shard_size: usize,
}

impl ParallelAggregator {
    /// Snapshot the edge list of `graph`, split into shards of `shard_size`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] if `shard_size` is zero.
    pub fn new(graph: &LoadedGraph, shard_size: usize) -> Result<Self, RankError> {
        if shard_size == 0 {
            return Err(RankError::invalid(
                ErrorCode::InvalidParameter,
                "shard_size must be at least 1",
            ));
        }
        Ok(Self {
            edges: graph.index_edges().collect(),
            node_count: graph.node_count(),
            shard_size,
        })
    }
}

impl IncomingAggregator for ParallelAggregator {
    #[allow(clippy::cast_precision_loss)]
    fn incoming(&self, ranks: &[f64], degrees: &OutDegreeIndex) -> Result<Vec<f64>, RankError> {
        let n = self.node_count;
        if ranks.len() != n || degrees.len() != n {
            return Err(RankError::Internal(format!(
                "aggregator built for {n} nodes, got {} ranks and {} degrees",
                ranks.len(),
                degrees.len()
            )));
        }

        let sums = self
            .edges
            .par_chunks(self.shard_size)
            .fold(
                || vec![0.0_f64; n],
                |mut acc, shard| {
                    for &(src, dst) in shard {
                        acc[dst] += ranks[src] / degrees.out_degree(src) as f64;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0_f64; n],
                |mut left, right| {
                    for (l, r) in left.iter_mut().zip(right) {
                        *l += r;
                    }
                    left
                },
            );
        Ok(sums)
    }
}

// ---------------------------------------------------------------------------
// StoreAggregator
// ---------------------------------------------------------------------------

/// Aggregation executed inside the tabular store.
///
/// Owns three scratch relations named after a caller-chosen prefix:
/// `<prefix>_edges` (distinct `src`, `dst` pairs, written once),
/// `<prefix>_shares` and `<prefix>_joined` (rewritten every pass). All of
/// them are dropped when the aggregator goes out of scope.
pub struct StoreAggregator<'s, S: TabularStore> {
    store: &'s S,
    edges: TableRef,
    src: ColumnRef,
    dst: ColumnRef,
    shares_name: Ident,
    joined_name: Ident,
    node_col: Ident,
    share_col: Ident,
    node_values: Vec<Value>,
    index: HashMap<NodeId, usize>,
}

impl<'s, S: TabularStore> StoreAggregator<'s, S> {
    /// Write the deduplicated edge relation and prepare scratch names.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] if `prefix` cannot be extended
    /// into valid identifiers, [`RankError::Collision`] if any scratch name
    /// is already taken, or a store error. Nothing is written or dropped
    /// on error.
    pub fn new(store: &'s S, graph: &LoadedGraph, prefix: &Ident) -> Result<Self, RankError> {
        let edges_name = prefix.suffixed("edges")?;
        let shares_name = prefix.suffixed("shares")?;
        let joined_name = prefix.suffixed("joined")?;
        let node_col = Ident::new("node")?;
        let share_col = Ident::new("share")?;

        // Scratch relations are replaced and dropped freely, so they must
        // never alias an existing relation.
        for name in [&edges_name, &shares_name, &joined_name] {
            if store.relation_exists(name)? {
                return Err(RankError::Collision {
                    name: name.to_string(),
                });
            }
        }

        let columns = [
            ColumnDef::new(Ident::new("src")?, Affinity::Any),
            ColumnDef::new(Ident::new("dst")?, Affinity::Any),
        ];
        let rows: Vec<Vec<Value>> = graph
            .edge_pairs()
            .map(|(src, dst)| vec![src.to_value(), dst.to_value()])
            .collect();
        let written = store.materialize(
            &[Relation {
                name: &edges_name,
                columns: &columns,
                rows: &rows,
            }],
            WriteMode::Replace,
        )?;

        let resolved = written
            .into_iter()
            .next()
            .ok_or_else(|| RankError::Internal("materialize returned no relation".into()))
            .and_then(|edges| {
                let src = edges.column("src")?;
                let dst = edges.column("dst")?;
                Ok((edges, src, dst))
            });
        let (edges, src, dst) = match resolved {
            Ok(parts) => parts,
            Err(err) => {
                let _ = store.drop_relation(&edges_name);
                return Err(err);
            }
        };

        let nodes = graph.nodes();
        Ok(Self {
            store,
            edges,
            src,
            dst,
            shares_name,
            joined_name,
            node_col,
            share_col,
            node_values: nodes.iter().map(NodeId::to_value).collect(),
            index: nodes.iter().cloned().zip(0..).collect(),
        })
    }

    /// The deduplicated edge relation and its source column.
    #[must_use]
    pub const fn edge_relation(&self) -> (&TableRef, &ColumnRef) {
        (&self.edges, &self.src)
    }

    #[allow(clippy::cast_precision_loss)]
    fn write_shares(&self, ranks: &[f64], degrees: &OutDegreeIndex) -> Result<TableRef, RankError> {
        let rows: Vec<Vec<Value>> = ranks
            .iter()
            .zip(degrees.degrees())
            .zip(&self.node_values)
            .filter(|((_, deg), _)| **deg > 0)
            .map(|((rank, deg), node)| vec![node.clone(), Value::Real(rank / *deg as f64)])
            .collect();
        let columns = [
            ColumnDef::new(self.node_col.clone(), Affinity::Any),
            ColumnDef::new(self.share_col.clone(), Affinity::Real),
        ];
        self.store
            .materialize(
                &[Relation {
                    name: &self.shares_name,
                    columns: &columns,
                    rows: &rows,
                }],
                WriteMode::Replace,
            )?
            .into_iter()
            .next()
            .ok_or_else(|| RankError::Internal("materialize returned no relation".into()))
    }

    fn join_and_sum(&self, shares: &TableRef, n: usize) -> Result<Vec<f64>, RankError> {
        let select = [
            JoinColumn {
                column: self.dst.clone(),
                alias: self.node_col.clone(),
            },
            JoinColumn {
                column: shares.column(self.share_col.as_str())?,
                alias: self.share_col.clone(),
            },
        ];
        let share_node = shares.column(self.node_col.as_str())?;
        let joined = self.store.equi_join(
            &JoinSpec {
                left: &self.edges,
                left_key: &self.src,
                right: shares,
                right_key: &share_node,
                select: &select,
            },
            &self.joined_name,
        )?;

        let key = joined.column(self.node_col.as_str())?;
        let value = joined.column(self.share_col.as_str())?;
        let mut incoming = vec![0.0_f64; n];
        for (node, sum) in self.store.grouped_sum(&joined, &key, &value)? {
            let idx = NodeId::from_value(&node)
                .and_then(|id| self.index.get(&id).copied())
                .ok_or_else(|| {
                    RankError::Internal(format!("joined relation yielded unknown node {node:?}"))
                })?;
            incoming[idx] = sum;
        }
        Ok(incoming)
    }

    fn drop_pass_relations(&self) -> Result<(), RankError> {
        self.store.drop_relation(&self.joined_name)?;
        self.store.drop_relation(&self.shares_name)?;
        Ok(())
    }
}

impl<S: TabularStore> IncomingAggregator for StoreAggregator<'_, S> {
    fn incoming(&self, ranks: &[f64], degrees: &OutDegreeIndex) -> Result<Vec<f64>, RankError> {
        let n = self.node_values.len();
        if ranks.len() != n || degrees.len() != n {
            return Err(RankError::Internal(format!(
                "aggregator built for {n} nodes, got {} ranks and {} degrees",
                ranks.len(),
                degrees.len()
            )));
        }

        let result = self
            .write_shares(ranks, degrees)
            .and_then(|shares| self.join_and_sum(&shares, n));
        let cleanup = self.drop_pass_relations();
        let incoming = result?;
        cleanup?;
        trace!(relation = %self.joined_name, "store aggregation pass");
        Ok(incoming)
    }
}

impl<S: TabularStore> Drop for StoreAggregator<'_, S> {
    fn drop(&mut self) {
        for name in [&self.joined_name, &self.shares_name, self.edges.name()] {
            if let Err(err) = self.store.drop_relation(name) {
                warn!(relation = %name, error = %err, "failed to drop scratch relation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphrank_core::SqliteStore;

    fn n(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn diamond() -> LoadedGraph {
        // a -> b, a -> c, b -> d, c -> d; d is a sink.
        LoadedGraph::from_edges([
            (n("a"), n("b")),
            (n("a"), n("c")),
            (n("b"), n("d")),
            (n("c"), n("d")),
        ])
        .expect("graph")
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-12, "index {i}: {a} vs {e}");
        }
    }

    #[test]
    fn parallel_sums_shares_by_destination() {
        let graph = diamond();
        let degrees = OutDegreeIndex::from_graph(&graph);
        let ranks = [0.4, 0.2, 0.3, 0.1];
        for shard_size in [1, 2, 3, 64] {
            let agg = ParallelAggregator::new(&graph, shard_size).expect("aggregator");
            let incoming = agg.incoming(&ranks, &degrees).expect("incoming");
            assert_close(&incoming, &[0.0, 0.2, 0.2, 0.5]);
        }
    }

    #[test]
    fn parallel_rejects_zero_shard_size() {
        let err = ParallelAggregator::new(&diamond(), 0).expect_err("zero shard");
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }

    #[test]
    fn parallel_rejects_mismatched_lengths() {
        let graph = diamond();
        let degrees = OutDegreeIndex::from_graph(&graph);
        let agg = ParallelAggregator::new(&graph, 4).expect("aggregator");
        let err = agg.incoming(&[0.5, 0.5], &degrees).expect_err("length mismatch");
        assert!(matches!(err, RankError::Internal(_)));
    }

    #[test]
    fn store_matches_parallel() {
        let graph = diamond();
        let degrees = OutDegreeIndex::from_graph(&graph);
        let ranks = [0.4, 0.2, 0.3, 0.1];
        let store = SqliteStore::open_in_memory().expect("store");
        let agg = StoreAggregator::new(&store, &graph, &Ident::new("agg").expect("ident"))
            .expect("aggregator");
        let incoming = agg.incoming(&ranks, &degrees).expect("incoming");
        assert_close(&incoming, &[0.0, 0.2, 0.2, 0.5]);
    }

    #[test]
    fn store_drops_pass_relations_after_each_pass() {
        let graph = diamond();
        let degrees = OutDegreeIndex::from_graph(&graph);
        let store = SqliteStore::open_in_memory().expect("store");
        let prefix = Ident::new("scratch").expect("ident");
        let agg = StoreAggregator::new(&store, &graph, &prefix).expect("aggregator");
        agg.incoming(&[0.25; 4], &degrees).expect("incoming");

        let exists = |suffix: &str| {
            store
                .relation_exists(&prefix.suffixed(suffix).expect("ident"))
                .expect("exists")
        };
        assert!(exists("edges"));
        assert!(!exists("shares"));
        assert!(!exists("joined"));

        drop(agg);
        assert!(!exists("edges"));
    }

    #[test]
    fn store_refuses_taken_scratch_name_and_leaves_it_intact() {
        let store = SqliteStore::open_in_memory().expect("store");
        store
            .connection()
            .execute_batch(
                "CREATE TABLE scratch_shares (keep TEXT);
                 INSERT INTO scratch_shares VALUES ('x'), ('y');",
            )
            .expect("seed");
        let prefix = Ident::new("scratch").expect("ident");

        let err = StoreAggregator::new(&store, &diamond(), &prefix)
            .err()
            .expect("collision");
        assert!(matches!(err, RankError::Collision { ref name } if name == "scratch_shares"));

        let kept: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM scratch_shares", [], |row| row.get(0))
            .expect("count");
        assert_eq!(kept, 2);
        assert!(
            !store
                .relation_exists(&prefix.suffixed("edges").expect("ident"))
                .expect("exists")
        );
    }

    #[test]
    fn store_handles_integer_ids() {
        let graph = LoadedGraph::from_edges([
            (NodeId::Int(1), NodeId::Int(2)),
            (NodeId::Int(2), NodeId::Int(1)),
        ])
        .expect("graph");
        let degrees = OutDegreeIndex::from_graph(&graph);
        let store = SqliteStore::open_in_memory().expect("store");
        let agg = StoreAggregator::new(&store, &graph, &Ident::new("ints").expect("ident"))
            .expect("aggregator");
        let incoming = agg.incoming(&[0.7, 0.3], &degrees).expect("incoming");
        assert_close(&incoming, &[0.3, 0.7]);
    }
}

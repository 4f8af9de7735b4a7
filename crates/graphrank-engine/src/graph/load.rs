//! Graph loading from the tabular store.
//!
//! # Overview
//!
//! The node set is the distinct union of every source and destination
//! identifier in the edge relation, plus the ids of the optional vertex
//! relation. The edge set is the distinct set of `(src, dst)` pairs, so
//! repeating an edge carries no extra weight. Self-loops are kept: a node
//! whose only edge points at itself is its own neighbor, not a sink.
//!
//! ## Determinism
//!
//! Nodes are indexed in sorted [`NodeId`] order and edges are inserted in
//! sorted `(src, dst)` order, so identical input always yields identical
//! node indices, edge order, and content hash.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeSet, HashMap};

use graphrank_core::store::{ColumnRef, TableRef};
use graphrank_core::{ErrorCode, NodeId, RankError, TabularStore};
use petgraph::graph::{DiGraph, NodeIndex};
use rusqlite::types::Value;
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Input descriptors
// ---------------------------------------------------------------------------

/// Names of the edge relation and its endpoint attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSource {
    pub table: String,
    pub src: String,
    pub dst: String,
}

/// Names of a vertex relation and its id attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexSource {
    pub table: String,
    pub id: String,
}

/// Everything [`LoadedGraph::load`] needs to locate the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphInput {
    pub edges: EdgeSource,
    pub vertices: Option<VertexSource>,
}

impl GraphInput {
    /// Input consisting of an edge relation only.
    pub fn edges(table: impl Into<String>, src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            edges: EdgeSource {
                table: table.into(),
                src: src.into(),
                dst: dst.into(),
            },
            vertices: None,
        }
    }

    /// Add a vertex relation whose ids join the node set.
    #[must_use]
    pub fn with_vertices(mut self, table: impl Into<String>, id: impl Into<String>) -> Self {
        self.vertices = Some(VertexSource {
            table: table.into(),
            id: id.into(),
        });
        self
    }
}

// ---------------------------------------------------------------------------
// LoadedGraph
// ---------------------------------------------------------------------------

/// A deduplicated directed graph ready for ranking.
///
/// Node index `i` in [`LoadedGraph::graph`] corresponds to
/// `LoadedGraph::nodes()[i]`.
#[derive(Debug)]
pub struct LoadedGraph {
    /// Directed graph: nodes = identifiers, edges = distinct `(src, dst)` pairs.
    pub graph: DiGraph<NodeId, ()>,
    /// Mapping from identifier to petgraph `NodeIndex`.
    pub node_map: HashMap<NodeId, NodeIndex>,
    /// BLAKE3 content hash of the sorted edge set.
    pub content_hash: String,
    nodes: Vec<NodeId>,
}

impl LoadedGraph {
    /// Load the graph described by `input` from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] if a relation or column cannot be
    /// resolved, an identifier is `NULL`/real/blob, or the node set is empty.
    /// Store failures propagate as [`RankError::Store`].
    #[instrument(skip(store))]
    pub fn load<S: TabularStore>(store: &S, input: &GraphInput) -> Result<Self, RankError> {
        let table = store.resolve_table(&input.edges.table)?;
        let src = store.resolve_column(&table, &input.edges.src)?;
        let dst = store.resolve_column(&table, &input.edges.dst)?;

        let edges = store
            .distinct_projection(&table, &[&src, &dst])?
            .into_iter()
            .map(|row| edge_from_row(&table, &src, &dst, row))
            .collect::<Result<Vec<_>, _>>()?;

        let mut vertices = Vec::new();
        if let Some(source) = &input.vertices {
            let vtable = store.resolve_table(&source.table)?;
            let id = store.resolve_column(&vtable, &source.id)?;
            for row in store.distinct_projection(&vtable, &[&id])? {
                let value = row.into_iter().next().unwrap_or(Value::Null);
                vertices.push(node_from_value(&vtable, &id, &value)?);
            }
        }

        let loaded = Self::from_parts(vertices, edges)?;
        debug!(
            nodes = loaded.node_count(),
            edges = loaded.edge_count(),
            hash = %loaded.content_hash,
            "loaded graph"
        );
        Ok(loaded)
    }

    /// Build a graph from explicit nodes and edges.
    ///
    /// Every edge endpoint joins the node set; duplicate edges collapse.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] with [`ErrorCode::EmptyGraph`] if
    /// the resulting node set is empty.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Self, RankError> {
        let edge_set: BTreeSet<(NodeId, NodeId)> = edges.into_iter().collect();
        let mut node_set: BTreeSet<NodeId> = nodes.into_iter().collect();
        for (src, dst) in &edge_set {
            node_set.insert(src.clone());
            node_set.insert(dst.clone());
        }

        if node_set.is_empty() {
            return Err(RankError::invalid(
                ErrorCode::EmptyGraph,
                "the edge list produced an empty node set",
            ));
        }

        let content_hash = compute_edge_hash(&edge_set);
        let nodes: Vec<NodeId> = node_set.into_iter().collect();

        let mut graph = DiGraph::<NodeId, ()>::with_capacity(nodes.len(), edge_set.len());
        let mut node_map: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(nodes.len());
        for id in &nodes {
            let idx = graph.add_node(id.clone());
            node_map.insert(id.clone(), idx);
        }
        for (src, dst) in &edge_set {
            graph.add_edge(node_map[src], node_map[dst], ());
        }

        Ok(Self {
            graph,
            node_map,
            content_hash,
            nodes,
        })
    }

    /// Build a graph from edges alone.
    ///
    /// # Errors
    ///
    /// Same as [`LoadedGraph::from_parts`].
    pub fn from_edges(edges: impl IntoIterator<Item = (NodeId, NodeId)>) -> Result<Self, RankError> {
        Self::from_parts(std::iter::empty(), edges)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node identifiers in index order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Look up the `NodeIndex` for an identifier.
    #[must_use]
    pub fn node_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    /// Edges as `(source index, target index)` pairs in insertion order.
    pub fn index_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .raw_edges()
            .iter()
            .map(|e| (e.source().index(), e.target().index()))
    }

    /// Edges as identifier pairs in sorted order.
    pub fn edge_pairs(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> + '_ {
        self.index_edges()
            .map(|(src, dst)| (&self.nodes[src], &self.nodes[dst]))
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn node_from_value(table: &TableRef, column: &ColumnRef, value: &Value) -> Result<NodeId, RankError> {
    NodeId::from_value(value).ok_or_else(|| {
        RankError::invalid(
            ErrorCode::InvalidNodeId,
            format!(
                "`{}.{}` holds {value:?}; node identifiers must be integer or text",
                table.name(),
                column.name()
            ),
        )
    })
}

fn edge_from_row(
    table: &TableRef,
    src: &ColumnRef,
    dst: &ColumnRef,
    row: Vec<Value>,
) -> Result<(NodeId, NodeId), RankError> {
    let [s, d]: [Value; 2] = row
        .try_into()
        .map_err(|row: Vec<Value>| RankError::Internal(format!("expected 2 columns, got {}", row.len())))?;
    Ok((
        node_from_value(table, src, &s)?,
        node_from_value(table, dst, &d)?,
    ))
}

/// Compute a BLAKE3 hash of the sorted edge set for cache invalidation.
fn compute_edge_hash(edges: &BTreeSet<(NodeId, NodeId)>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (src, dst) in edges {
        src.hash_into(&mut |bytes| {
            hasher.update(bytes);
        });
        hasher.update(b"\x00");
        dst.hash_into(&mut |bytes| {
            hasher.update(bytes);
        });
        hasher.update(b"\x00");
    }
    format!("blake3:{}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

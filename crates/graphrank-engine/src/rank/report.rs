//! Per-node results and run summary.

#![allow(clippy::module_name_repetitions)]

use graphrank_core::NodeId;
use graphrank_core::config::AggregationKind;
use serde::Serialize;

use super::engine::{RankOutcome, Termination};
use super::params::ResolvedParams;
use crate::graph::{LoadedGraph, OutDegreeIndex};

/// One node's final rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub node: NodeId,
    pub rank: f64,
    pub out_degree: usize,
    pub is_sink: bool,
}

/// Run-level facts, also written to `<output>_summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub sink_count: usize,
    pub iterations: usize,
    pub converged: bool,
    pub status: Termination,
    pub final_delta: Option<f64>,
    pub damping_factor: f64,
    pub epsilon: f64,
    pub content_hash: String,
    pub aggregation: AggregationKind,
}

/// Everything a run produced, in node order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRankReport {
    pub entries: Vec<RankEntry>,
    pub summary: RunSummary,
}

impl PageRankReport {
    /// Combine the loaded graph, its degree index, and the engine outcome.
    #[must_use]
    pub fn new(
        graph: &LoadedGraph,
        degrees: &OutDegreeIndex,
        outcome: RankOutcome,
        params: &ResolvedParams,
        aggregation: AggregationKind,
    ) -> Self {
        let entries = graph
            .nodes()
            .iter()
            .zip(&outcome.ranks)
            .enumerate()
            .map(|(i, (node, &rank))| RankEntry {
                node: node.clone(),
                rank,
                out_degree: degrees.out_degree(i),
                is_sink: degrees.is_sink(i),
            })
            .collect();

        let summary = RunSummary {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            sink_count: degrees.sinks().len(),
            iterations: outcome.iterations,
            converged: outcome.converged(),
            status: outcome.termination,
            final_delta: outcome.final_delta,
            damping_factor: params.damping_factor,
            epsilon: params.epsilon,
            content_hash: graph.content_hash.clone(),
            aggregation,
        };

        Self { entries, summary }
    }

    /// Rank of `node`, if it is part of the graph.
    #[must_use]
    pub fn rank_of(&self, node: &NodeId) -> Option<f64> {
        self.entries
            .binary_search_by(|e| e.node.cmp(node))
            .ok()
            .map(|i| self.entries[i].rank)
    }

    /// Sum of all ranks; 1 up to rounding.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.entries.iter().map(|e| e.rank).sum()
    }

    /// Entries sorted by descending rank, ties broken by node order.
    #[must_use]
    pub fn ranked(&self) -> Vec<&RankEntry> {
        let mut sorted: Vec<&RankEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.rank.total_cmp(&a.rank).then_with(|| a.node.cmp(&b.node)));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::params::PageRankParams;

    #[test]
    fn report_lines_up_nodes_and_ranks() {
        let graph = LoadedGraph::from_parts(
            [NodeId::from("z")],
            [(NodeId::from("a"), NodeId::from("b"))],
        )
        .expect("graph");
        let degrees = OutDegreeIndex::from_graph(&graph);
        let params = PageRankParams::default().resolve(3).expect("params");
        let outcome = RankOutcome {
            ranks: vec![0.2, 0.5, 0.3],
            iterations: 4,
            termination: Termination::MaxIterReached,
            final_delta: Some(0.01),
            deltas: vec![0.3, 0.1, 0.05, 0.01],
        };
        let report = PageRankReport::new(&graph, &degrees, outcome, &params, AggregationKind::Parallel);

        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.rank_of(&NodeId::from("b")), Some(0.5));
        assert_eq!(report.rank_of(&NodeId::from("q")), None);
        assert!(report.entries[0].out_degree == 1 && !report.entries[0].is_sink);
        assert!(report.entries[2].is_sink);
        assert_eq!(report.summary.sink_count, 2);
        assert!(!report.summary.converged);
        assert_eq!(report.summary.status, Termination::MaxIterReached);
        assert!((report.total_mass() - 1.0).abs() < 1e-12);

        let order: Vec<String> = report.ranked().iter().map(|e| e.node.to_string()).collect();
        assert_eq!(order, ["b", "z", "a"]);
    }

    #[test]
    fn summary_serializes_status_in_snake_case() {
        let graph = LoadedGraph::from_parts([NodeId::Int(1)], Vec::new()).expect("graph");
        let degrees = OutDegreeIndex::from_graph(&graph);
        let params = PageRankParams::default().resolve(1).expect("params");
        let outcome = RankOutcome {
            ranks: vec![1.0],
            iterations: 1,
            termination: Termination::Converged,
            final_delta: Some(0.0),
            deltas: vec![0.0],
        };
        let report = PageRankReport::new(&graph, &degrees, outcome, &params, AggregationKind::Store);
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["summary"]["status"], "converged");
        assert_eq!(json["summary"]["aggregation"], "store");
        assert_eq!(json["entries"][0]["node"], 1);
    }
}

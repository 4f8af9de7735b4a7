//! The PageRank iteration state machine.
//!
//! ```text
//! Init ──initial_state()──▶ RankState ──step()──▶ Step::Continue(RankState)
//!                                          └────▶ Step::Done(RankOutcome)
//! ```
//!
//! `step` consumes the previous snapshot and returns a fresh one; the old
//! rank vector is never mutated in place.

#![allow(clippy::module_name_repetitions)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use graphrank_core::{ErrorCode, NodeId, RankError};
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::aggregate::IncomingAggregator;
use super::params::ResolvedParams;
use crate::graph::OutDegreeIndex;

// ---------------------------------------------------------------------------
// StopFlag
// ---------------------------------------------------------------------------

/// Cooperative stop signal, checked once after every completed pass.
///
/// Clones share the same flag, so one clone can be handed to a signal
/// handler or another thread while the engine holds the other.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to finish after the pass in progress.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// States and outcomes
// ---------------------------------------------------------------------------

/// Why the iteration loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The L1 change fell below epsilon.
    Converged,
    /// `max_iter` passes ran without converging.
    MaxIterReached,
    /// The caller raised the [`StopFlag`].
    Stopped,
}

impl Termination {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::MaxIterReached => "max_iter_reached",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot between passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RankState {
    ranks: Vec<f64>,
    iteration: usize,
    last_delta: Option<f64>,
    deltas: Vec<f64>,
}

impl RankState {
    /// Uniform `1/N` start.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn initial(node_count: usize) -> Self {
        Self {
            ranks: vec![1.0 / node_count.max(1) as f64; node_count],
            iteration: 0,
            last_delta: None,
            deltas: Vec::new(),
        }
    }

    #[must_use]
    pub fn ranks(&self) -> &[f64] {
        &self.ranks
    }

    /// Completed passes so far.
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    #[must_use]
    pub const fn last_delta(&self) -> Option<f64> {
        self.last_delta
    }
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankOutcome {
    /// Ranks indexed like the engine's node slice.
    pub ranks: Vec<f64>,
    pub iterations: usize,
    pub termination: Termination,
    pub final_delta: Option<f64>,
    /// L1 change of every pass, in order.
    pub deltas: Vec<f64>,
}

impl RankOutcome {
    #[must_use]
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Result of a single pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue(RankState),
    Done(RankOutcome),
}

// ---------------------------------------------------------------------------
// IterationEngine
// ---------------------------------------------------------------------------

/// Runs damped power iteration over a fixed graph.
///
/// The engine owns the out-degree index and the aggregator for the whole
/// run; both are built once and never modified.
pub struct IterationEngine<'g, A> {
    nodes: &'g [NodeId],
    degrees: OutDegreeIndex,
    aggregator: A,
    params: ResolvedParams,
    stop: Option<StopFlag>,
}

impl<'g, A: IncomingAggregator> IterationEngine<'g, A> {
    /// Assemble an engine.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] if `nodes` is empty, or
    /// [`RankError::Internal`] if `degrees` was built for a different node
    /// count.
    pub fn new(
        nodes: &'g [NodeId],
        degrees: OutDegreeIndex,
        aggregator: A,
        params: ResolvedParams,
    ) -> Result<Self, RankError> {
        if nodes.is_empty() {
            return Err(RankError::invalid(ErrorCode::EmptyGraph, "no nodes to rank"));
        }
        if degrees.len() != nodes.len() {
            return Err(RankError::Internal(format!(
                "out-degree index covers {} nodes, graph has {}",
                degrees.len(),
                nodes.len()
            )));
        }
        Ok(Self {
            nodes,
            degrees,
            aggregator,
            params,
            stop: None,
        })
    }

    /// Attach a cooperative stop flag.
    #[must_use]
    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    #[must_use]
    pub const fn degrees(&self) -> &OutDegreeIndex {
        &self.degrees
    }

    #[must_use]
    pub const fn params(&self) -> &ResolvedParams {
        &self.params
    }

    #[must_use]
    pub fn initial_state(&self) -> RankState {
        RankState::initial(self.nodes.len())
    }

    /// Run one pass over `state`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::Computation`] if any new rank is NaN or infinite,
    /// [`RankError::Internal`] if the aggregator breaks its length contract,
    /// or whatever the aggregator itself reports.
    #[allow(clippy::cast_precision_loss)]
    pub fn step(&self, state: RankState) -> Result<Step, RankError> {
        let n = self.nodes.len();
        let nf = n as f64;
        let d = self.params.damping_factor;

        let sink_total: f64 = self.degrees.sinks().iter().map(|&s| state.ranks[s]).sum();
        let sink_mass = d * sink_total / nf;

        let incoming = self.aggregator.incoming(&state.ranks, &self.degrees)?;
        if incoming.len() != n {
            return Err(RankError::Internal(format!(
                "aggregator returned {} values for {n} nodes",
                incoming.len()
            )));
        }

        let base = (1.0 - d) / nf + sink_mass;
        let next: Vec<f64> = incoming.iter().map(|inc| d.mul_add(*inc, base)).collect();

        let iteration = state.iteration + 1;
        if let Some((i, &value)) = next.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(RankError::Computation {
                node: self.nodes[i].to_string(),
                value,
                iteration,
            });
        }

        let delta: f64 = next
            .iter()
            .zip(&state.ranks)
            .map(|(new, old)| (new - old).abs())
            .sum();
        debug!(
            iteration,
            delta,
            mass = next.iter().sum::<f64>(),
            sink_mass,
            "pagerank pass"
        );

        let mut deltas = state.deltas;
        deltas.push(delta);

        let termination = if delta < self.params.epsilon {
            Some(Termination::Converged)
        } else if iteration >= self.params.max_iter {
            Some(Termination::MaxIterReached)
        } else if self.stop.as_ref().is_some_and(StopFlag::is_raised) {
            Some(Termination::Stopped)
        } else {
            None
        };

        Ok(match termination {
            Some(termination) => Step::Done(RankOutcome {
                ranks: next,
                iterations: iteration,
                termination,
                final_delta: Some(delta),
                deltas,
            }),
            None => Step::Continue(RankState {
                ranks: next,
                iteration,
                last_delta: Some(delta),
                deltas,
            }),
        })
    }

    /// Iterate from the uniform start until a terminal state.
    ///
    /// # Errors
    ///
    /// Same as [`IterationEngine::step`].
    #[instrument(skip(self), fields(nodes = self.nodes.len(), sinks = self.degrees.sinks().len()))]
    pub fn run(&self) -> Result<RankOutcome, RankError> {
        let mut state = self.initial_state();
        loop {
            match self.step(state)? {
                Step::Continue(next) => state = next,
                Step::Done(outcome) => {
                    info!(
                        iterations = outcome.iterations,
                        status = %outcome.termination,
                        final_delta = ?outcome.final_delta,
                        "pagerank finished"
                    );
                    return Ok(outcome);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LoadedGraph;
    use crate::rank::aggregate::ParallelAggregator;
    use crate::rank::params::PageRankParams;

    fn n(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn engine_for(
        graph: &LoadedGraph,
        params: PageRankParams,
    ) -> IterationEngine<'_, ParallelAggregator> {
        let degrees = OutDegreeIndex::from_graph(graph);
        let aggregator = ParallelAggregator::new(graph, 2).expect("aggregator");
        let resolved = params.resolve(graph.node_count()).expect("params");
        IterationEngine::new(graph.nodes(), degrees, aggregator, resolved).expect("engine")
    }

    fn mass(ranks: &[f64]) -> f64 {
        ranks.iter().sum()
    }

    /// Aggregator that hands back NaN for everything.
    struct Poisoned;

    impl IncomingAggregator for Poisoned {
        fn incoming(&self, ranks: &[f64], _: &OutDegreeIndex) -> Result<Vec<f64>, RankError> {
            Ok(vec![f64::NAN; ranks.len()])
        }
    }

    /// Aggregator that returns too few values.
    struct Short;

    impl IncomingAggregator for Short {
        fn incoming(&self, _: &[f64], _: &OutDegreeIndex) -> Result<Vec<f64>, RankError> {
            Ok(vec![0.0])
        }
    }

    #[test]
    fn initial_state_is_uniform() {
        let state = RankState::initial(4);
        assert_eq!(state.ranks(), &[0.25; 4]);
        assert_eq!(state.iteration(), 0);
        assert_eq!(state.last_delta(), None);
    }

    #[test]
    fn every_pass_conserves_mass() {
        // c is a sink; d only points at itself.
        let graph = LoadedGraph::from_edges([
            (n("a"), n("b")),
            (n("a"), n("c")),
            (n("b"), n("a")),
            (n("d"), n("d")),
        ])
        .expect("graph");
        let engine = engine_for(
            &graph,
            PageRankParams {
                damping_factor: 0.85,
                max_iter: 30,
                epsilon: Some(1e-12),
            },
        );

        let mut state = engine.initial_state();
        loop {
            match engine.step(state).expect("step") {
                Step::Continue(next) => {
                    assert!((mass(next.ranks()) - 1.0).abs() < 1e-12);
                    state = next;
                }
                Step::Done(outcome) => {
                    assert!((mass(&outcome.ranks) - 1.0).abs() < 1e-12);
                    break;
                }
            }
        }
    }

    #[test]
    fn two_node_cycle_stays_uniform() {
        let graph = LoadedGraph::from_edges([(n("a"), n("b")), (n("b"), n("a"))]).expect("graph");
        for d in [0.1, 0.5, 0.85, 0.99] {
            let outcome = engine_for(
                &graph,
                PageRankParams {
                    damping_factor: d,
                    max_iter: 10,
                    epsilon: Some(1e-9),
                },
            )
            .run()
            .expect("run");
            assert!(outcome.converged());
            assert_eq!(outcome.iterations, 1);
            for r in &outcome.ranks {
                assert!((r - 0.5).abs() < 1e-12, "d = {d}: {r}");
            }
        }
    }

    #[test]
    fn single_node_gets_all_mass() {
        let graph = LoadedGraph::from_parts([n("solo")], Vec::new()).expect("graph");
        let outcome = engine_for(&graph, PageRankParams::default()).run().expect("run");
        assert_eq!(outcome.ranks.len(), 1);
        assert!((outcome.ranks[0] - 1.0).abs() < 1e-12);
        assert!(outcome.converged());
    }

    #[test]
    fn unreachable_node_without_sinks_gets_teleport_share() {
        // d has no in-edges and no node is a sink.
        let graph = LoadedGraph::from_edges([
            (n("a"), n("b")),
            (n("b"), n("c")),
            (n("c"), n("a")),
            (n("d"), n("a")),
        ])
        .expect("graph");
        let outcome = engine_for(
            &graph,
            PageRankParams {
                damping_factor: 0.85,
                max_iter: 1,
                epsilon: Some(1e-9),
            },
        )
        .run()
        .expect("run");
        let d_idx = graph.node_index(&n("d")).expect("d").index();
        assert!((outcome.ranks[d_idx] - 0.15 / 4.0).abs() < 1e-15);
    }

    #[test]
    fn hitting_max_iter_is_not_an_error() {
        let graph = LoadedGraph::from_edges([
            (n("a"), n("b")),
            (n("b"), n("c")),
            (n("c"), n("a")),
            (n("a"), n("c")),
        ])
        .expect("graph");
        let outcome = engine_for(
            &graph,
            PageRankParams {
                damping_factor: 0.85,
                max_iter: 2,
                epsilon: Some(1e-15),
            },
        )
        .run()
        .expect("run");
        assert_eq!(outcome.termination, Termination::MaxIterReached);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.deltas.len(), 2);
        assert_eq!(outcome.final_delta, outcome.deltas.last().copied());
    }

    #[test]
    fn raised_stop_flag_ends_after_one_pass() {
        let graph = LoadedGraph::from_edges([
            (n("a"), n("b")),
            (n("b"), n("c")),
            (n("c"), n("a")),
            (n("a"), n("c")),
        ])
        .expect("graph");
        let stop = StopFlag::new();
        stop.raise();
        let outcome = engine_for(
            &graph,
            PageRankParams {
                damping_factor: 0.85,
                max_iter: 100,
                epsilon: Some(1e-15),
            },
        )
        .with_stop(stop.clone())
        .run()
        .expect("run");
        assert_eq!(outcome.termination, Termination::Stopped);
        assert_eq!(outcome.iterations, 1);
        assert!(stop.is_raised());
    }

    #[test]
    fn convergence_wins_over_stop() {
        let graph = LoadedGraph::from_edges([(n("a"), n("b")), (n("b"), n("a"))]).expect("graph");
        let stop = StopFlag::new();
        stop.raise();
        let outcome = engine_for(&graph, PageRankParams::default())
            .with_stop(stop)
            .run()
            .expect("run");
        assert_eq!(outcome.termination, Termination::Converged);
    }

    #[test]
    fn non_finite_rank_is_a_computation_error() {
        let graph = LoadedGraph::from_edges([(n("a"), n("b"))]).expect("graph");
        let degrees = OutDegreeIndex::from_graph(&graph);
        let params = PageRankParams::default().resolve(2).expect("params");
        let engine = IterationEngine::new(graph.nodes(), degrees, Poisoned, params).expect("engine");
        let err = engine.run().expect_err("NaN must abort");
        assert!(matches!(err, RankError::Computation { iteration: 1, .. }));
        assert_eq!(err.code(), ErrorCode::NonFiniteRank);
    }

    #[test]
    fn short_aggregator_output_is_internal_error() {
        let graph = LoadedGraph::from_edges([(n("a"), n("b"))]).expect("graph");
        let degrees = OutDegreeIndex::from_graph(&graph);
        let params = PageRankParams::default().resolve(2).expect("params");
        let engine = IterationEngine::new(graph.nodes(), degrees, Short, params).expect("engine");
        assert!(matches!(engine.run(), Err(RankError::Internal(_))));
    }

    #[test]
    fn termination_labels_are_stable() {
        assert_eq!(Termination::Converged.to_string(), "converged");
        assert_eq!(Termination::MaxIterReached.as_str(), "max_iter_reached");
        assert_eq!(
            serde_json::to_string(&Termination::Stopped).expect("json"),
            "\"stopped\""
        );
    }
}

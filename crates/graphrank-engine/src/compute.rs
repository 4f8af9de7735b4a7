//! One PageRank run, from edge relation to materialized result.
//!
//! Order of operations:
//!
//! 1. Validate the output name, parameters and engine options.
//! 2. Under [`OverwritePolicy::Strict`], fail if the destination is taken.
//! 3. Load the graph and build the out-degree index.
//! 4. Iterate until convergence, `max_iter`, or the stop flag.
//! 5. Materialize `<output>` and `<output>_summary` in one transaction.
//!
//! Any error in steps 1-3 happens before the first iteration. A failure at
//! any step leaves the destination untouched.

#![allow(clippy::module_name_repetitions)]

use graphrank_core::config::{AggregationKind, EngineSection, OverwritePolicy};
use graphrank_core::store::Ident;
use graphrank_core::{ErrorCode, RankError, TabularStore};
use tracing::{info, instrument};

use crate::graph::{GraphInput, LoadedGraph, OutDegreeIndex};
use crate::rank::{
    IncomingAggregator, IterationEngine, PageRankParams, PageRankReport, ParallelAggregator,
    ResolvedParams, ResultMaterializer, StopFlag, StoreAggregator,
};

/// Suffix for the store aggregator's scratch relations.
const SCRATCH_SUFFIX: &str = "scratch";

/// How the engine computes incoming sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub aggregation: AggregationKind,
    /// Edges per rayon shard for [`AggregationKind::Parallel`].
    pub shard_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

impl From<&EngineSection> for EngineOptions {
    fn from(section: &EngineSection) -> Self {
        Self {
            aggregation: section.aggregation,
            shard_size: section.shard_size,
        }
    }
}

/// Everything needed for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RankRequest {
    pub input: GraphInput,
    /// Destination relation; the summary goes to `<output>_summary`.
    pub output: String,
    pub params: PageRankParams,
    pub engine: EngineOptions,
    pub policy: OverwritePolicy,
}

impl RankRequest {
    /// A request with default parameters, parallel aggregation, and the
    /// replace policy.
    pub fn new(input: GraphInput, output: impl Into<String>) -> Self {
        Self {
            input,
            output: output.into(),
            params: PageRankParams::default(),
            engine: EngineOptions::default(),
            policy: OverwritePolicy::default(),
        }
    }
}

/// Run PageRank as described by `request` and write the results to `store`.
///
/// `stop` is checked once after each completed pass.
///
/// # Errors
///
/// - [`RankError::InvalidInput`] for bad names, parameters, node ids, or an
///   empty graph, always before the first iteration.
/// - [`RankError::Collision`] under [`OverwritePolicy::Strict`].
/// - [`RankError::Computation`] if a rank turns non-finite.
/// - [`RankError::Store`] if the store fails.
#[instrument(
    skip(store, request, stop),
    fields(edges = %request.input.edges.table, output = %request.output)
)]
pub fn compute<S: TabularStore>(
    store: &S,
    request: &RankRequest,
    stop: Option<StopFlag>,
) -> Result<PageRankReport, RankError> {
    let output = Ident::new(request.output.as_str())?;
    request.params.validate()?;
    if request.engine.shard_size == 0 {
        return Err(RankError::invalid(
            ErrorCode::InvalidParameter,
            "shard_size must be at least 1",
        ));
    }

    let materializer = ResultMaterializer::new(store, request.policy);
    materializer.check_collision(&output)?;

    let graph = LoadedGraph::load(store, &request.input)?;
    let params = request.params.resolve(graph.node_count())?;
    let aggregation = request.engine.aggregation;

    let report = match aggregation {
        AggregationKind::Parallel => {
            let degrees = OutDegreeIndex::from_graph(&graph);
            let aggregator = ParallelAggregator::new(&graph, request.engine.shard_size)?;
            run_engine(&graph, degrees, aggregator, params, stop, aggregation)?
        }
        AggregationKind::Store => {
            let scratch = output.suffixed(SCRATCH_SUFFIX)?;
            let aggregator = StoreAggregator::new(store, &graph, &scratch)?;
            let (edges, src) = aggregator.edge_relation();
            let degrees = OutDegreeIndex::from_store(store, edges, src, &graph)?;
            run_engine(&graph, degrees, aggregator, params, stop, aggregation)?
        }
    };

    materializer.write(&output, &report)?;
    info!(
        nodes = report.summary.node_count,
        edges = report.summary.edge_count,
        iterations = report.summary.iterations,
        status = %report.summary.status,
        "pagerank complete"
    );
    Ok(report)
}

fn run_engine<A: IncomingAggregator>(
    graph: &LoadedGraph,
    degrees: OutDegreeIndex,
    aggregator: A,
    params: ResolvedParams,
    stop: Option<StopFlag>,
    aggregation: AggregationKind,
) -> Result<PageRankReport, RankError> {
    let mut engine = IterationEngine::new(graph.nodes(), degrees, aggregator, params)?;
    if let Some(stop) = stop {
        engine = engine.with_stop(stop);
    }
    let outcome = engine.run()?;
    Ok(PageRankReport::new(
        graph,
        engine.degrees(),
        outcome,
        engine.params(),
        aggregation,
    ))
}

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use graphrank_core::SqliteStore;
use graphrank_core::config::{AggregationKind, OverwritePolicy, RankConfig};
use graphrank_engine::rank::{PageRankParams, PageRankReport, RankEntry, RunSummary};
use graphrank_engine::{EngineOptions, GraphInput, RankRequest, compute};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::output::{CliError, OutputMode, pretty_kv, pretty_rule, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct RankArgs {
    /// SQLite database holding the edge relation.
    #[arg(long)]
    pub db: PathBuf,

    /// Edge relation name.
    #[arg(long)]
    pub edges: String,

    /// Source attribute of the edge relation.
    #[arg(long, default_value = "src")]
    pub src: String,

    /// Destination attribute of the edge relation.
    #[arg(long, default_value = "dst")]
    pub dst: String,

    /// Output relation; the run summary goes to `<out>_summary`.
    #[arg(long)]
    pub out: String,

    /// Optional vertex relation whose ids join the node set.
    #[arg(long)]
    pub vertices: Option<String>,

    /// Id attribute of the vertex relation.
    #[arg(long, default_value = "id")]
    pub vertex_id: String,

    /// Damping factor in (0, 1). Overrides `pagerank.damping_factor`.
    #[arg(long)]
    pub damping: Option<f64>,

    /// Iteration cap. Overrides `pagerank.max_iter`.
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Convergence threshold. Defaults to 1/(N*1000) when unset everywhere.
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Where incoming sums are computed. Overrides `engine.aggregation`.
    #[arg(long, value_enum)]
    pub aggregation: Option<AggregationArg>,

    /// Edges per parallel shard. Overrides `engine.shard_size`.
    #[arg(long)]
    pub shard_size: Option<usize>,

    /// Worker threads for the parallel aggregator. Overrides `engine.threads`.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Fail instead of replacing an existing output relation.
    #[arg(long)]
    pub strict: bool,

    /// Number of top-ranked nodes to print.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum AggregationArg {
    Parallel,
    Store,
}

impl From<AggregationArg> for AggregationKind {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::Parallel => Self::Parallel,
            AggregationArg::Store => Self::Store,
        }
    }
}

/// Payload for `grank rank`.
#[derive(Debug, Serialize)]
struct RankOutput<'a> {
    output: &'a str,
    summary_relation: String,
    summary: &'a RunSummary,
    top: Vec<&'a RankEntry>,
}

/// Layer command-line flags over the file configuration.
fn build_request(args: &RankArgs, config: &RankConfig) -> RankRequest {
    let mut input = GraphInput::edges(&args.edges, &args.src, &args.dst);
    if let Some(vertices) = &args.vertices {
        input = input.with_vertices(vertices, &args.vertex_id);
    }

    let mut params = PageRankParams::from(&config.pagerank);
    if let Some(d) = args.damping {
        params.damping_factor = d;
    }
    if let Some(max_iter) = args.max_iter {
        params.max_iter = max_iter;
    }
    if args.epsilon.is_some() {
        params.epsilon = args.epsilon;
    }

    let mut engine = EngineOptions::from(&config.engine);
    if let Some(aggregation) = args.aggregation {
        engine.aggregation = aggregation.into();
    }
    if let Some(shard_size) = args.shard_size {
        engine.shard_size = shard_size;
    }

    let policy = if args.strict {
        OverwritePolicy::Strict
    } else {
        config.output.policy
    };

    RankRequest {
        input,
        output: args.out.clone(),
        params,
        engine,
        policy,
    }
}

fn configure_threads(threads: Option<usize>) {
    let Some(threads) = threads else {
        return;
    };
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        warn!(threads, error = %err, "rayon pool already initialized; keeping existing size");
    }
}

fn open_existing(db: &Path, output: OutputMode) -> Result<SqliteStore> {
    if !db.exists() {
        render_error(
            output,
            &CliError::with_details(
                format!("database {} not found", db.display()),
                "pass the path of an existing SQLite database with --db",
                "db_missing",
            ),
        )?;
        anyhow::bail!("database not found");
    }
    SqliteStore::open(db).with_context(|| format!("Failed to open {}", db.display()))
}

/// Execute `grank rank`.
pub fn run_rank(args: &RankArgs, config: &RankConfig, output: OutputMode) -> Result<()> {
    let request = build_request(args, config);
    debug!(?request, "resolved rank request");
    configure_threads(args.threads.or(config.engine.threads));

    let store = open_existing(&args.db, output)?;
    let report = match compute(&store, &request, None) {
        Ok(report) => report,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            return Err(err).context("pagerank run failed");
        }
    };

    print_report(&request.output, &report, args.top, output)
}

fn print_report(
    relation: &str,
    report: &PageRankReport,
    top: usize,
    output: OutputMode,
) -> Result<()> {
    let payload = RankOutput {
        output: relation,
        summary_relation: format!("{relation}_summary"),
        summary: &report.summary,
        top: report.ranked().into_iter().take(top).collect(),
    };
    render_mode(output, &payload, write_text, write_pretty)
}

fn write_text(payload: &RankOutput<'_>, w: &mut dyn Write) -> io::Result<()> {
    let s = payload.summary;
    writeln!(w, "output={}", payload.output)?;
    writeln!(w, "summary={}", payload.summary_relation)?;
    writeln!(w, "status={}", s.status)?;
    writeln!(w, "iterations={}", s.iterations)?;
    writeln!(w, "nodes={}", s.node_count)?;
    writeln!(w, "edges={}", s.edge_count)?;
    writeln!(w, "sinks={}", s.sink_count)?;
    if let Some(delta) = s.final_delta {
        writeln!(w, "final_delta={delta:e}")?;
    }
    for entry in &payload.top {
        writeln!(w, "{}\t{:.6}", entry.node, entry.rank)?;
    }
    Ok(())
}

fn write_pretty(payload: &RankOutput<'_>, w: &mut dyn Write) -> io::Result<()> {
    let s = payload.summary;
    pretty_section(w, &format!("PageRank → {}", payload.output))?;
    pretty_kv(w, "Status", s.status.as_str())?;
    pretty_kv(w, "Iterations", s.iterations.to_string())?;
    pretty_kv(
        w,
        "Final delta",
        s.final_delta.map_or_else(|| "-".to_string(), |d| format!("{d:.3e}")),
    )?;
    pretty_kv(w, "Epsilon", format!("{:.3e}", s.epsilon))?;
    pretty_kv(w, "Damping", format!("{}", s.damping_factor))?;
    pretty_kv(
        w,
        "Graph",
        format!(
            "{} nodes, {} edges, {} sinks",
            s.node_count, s.edge_count, s.sink_count
        ),
    )?;
    pretty_kv(w, "Summary", &payload.summary_relation)?;

    if !payload.top.is_empty() {
        writeln!(w)?;
        writeln!(w, "{:<32} {:>10} {:>8}", "NODE", "RANK", "OUT")?;
        pretty_rule(w)?;
        for entry in &payload.top {
            writeln!(
                w,
                "{:<32} {:>10.6} {:>8}",
                entry.node.to_string(),
                entry.rank,
                entry.out_degree
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: RankArgs,
    }

    fn parse(extra: &[&str]) -> RankArgs {
        let mut argv = vec!["grank", "--db", "g.db", "--edges", "links", "--out", "pr"];
        argv.extend_from_slice(extra);
        Wrapper::parse_from(argv).args
    }

    #[test]
    fn config_values_apply_when_flags_are_absent() {
        let mut config = RankConfig::default();
        config.pagerank.damping_factor = 0.5;
        config.pagerank.epsilon = Some(1e-4);
        config.engine.aggregation = AggregationKind::Store;
        config.output.policy = OverwritePolicy::Strict;

        let request = build_request(&parse(&[]), &config);
        assert!((request.params.damping_factor - 0.5).abs() < f64::EPSILON);
        assert_eq!(request.params.epsilon, Some(1e-4));
        assert_eq!(request.engine.aggregation, AggregationKind::Store);
        assert_eq!(request.policy, OverwritePolicy::Strict);
        assert_eq!(request.input.edges.src, "src");
        assert!(request.input.vertices.is_none());
    }

    #[test]
    fn flags_override_config() {
        let mut config = RankConfig::default();
        config.pagerank.max_iter = 5;
        let request = build_request(
            &parse(&[
                "--damping",
                "0.9",
                "--max-iter",
                "12",
                "--aggregation",
                "store",
                "--shard-size",
                "64",
                "--strict",
                "--vertices",
                "pages",
                "--vertex-id",
                "page_id",
            ]),
            &config,
        );
        assert!((request.params.damping_factor - 0.9).abs() < f64::EPSILON);
        assert_eq!(request.params.max_iter, 12);
        assert_eq!(request.engine.aggregation, AggregationKind::Store);
        assert_eq!(request.engine.shard_size, 64);
        assert_eq!(request.policy, OverwritePolicy::Strict);
        let vertices = request.input.vertices.expect("vertices");
        assert_eq!(vertices.table, "pages");
        assert_eq!(vertices.id, "page_id");
    }
}

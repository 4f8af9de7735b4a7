#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use graphrank_core::config::load_config;
use output::OutputMode;
use std::env;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "grank: damped PageRank over SQLite edge tables",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides `GRAPHRANK_FORMAT`).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Config file to use instead of ./graphrank.toml or the user config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Rank the nodes of an edge relation",
        long_about = "Load an edge relation from a SQLite database, run damped PageRank, and write \
                      node/rank pairs to an output relation plus a one-row <out>_summary relation.",
        after_help = "EXAMPLES:\n    # Rank links(src, dst) into page_rank\n    grank rank --db web.db --edges links --out page_rank\n\n    # Custom columns, damping and epsilon\n    grank rank --db web.db --edges links --src from_page --dst to_page --out pr --damping 0.9 --epsilon 1e-6\n\n    # Include isolated pages from a vertex table\n    grank rank --db web.db --edges links --vertices pages --vertex-id id --out pr\n\n    # Refuse to overwrite an existing result\n    grank rank --db web.db --edges links --out pr --strict\n\n    # Emit machine-readable output\n    grank rank --db web.db --edges links --out pr --json"
    )]
    Rank(cmd::rank::RankArgs),

    #[command(
        about = "Print rows of a relation",
        long_about = "Print the rows of any relation in the database, typically a rank output or its summary.",
        after_help = "EXAMPLES:\n    # Show a result\n    grank show --db web.db --table pr\n\n    # Show the run summary as JSON\n    grank show --db web.db --table pr_summary --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        about = "Show the effective configuration",
        long_about = "Print the configuration after resolving --config, ./graphrank.toml, and the user config file.",
        after_help = "EXAMPLES:\n    # Show resolved values\n    grank config\n\n    # Also list the searched locations\n    grank config --paths"
    )]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("GRAPHRANK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "graphrank=debug,info"
        } else {
            "graphrank=info,warn"
        })
    });

    let format = env::var("GRAPHRANK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let cwd = env::current_dir()?;
    let output = cli.output_mode();
    let (config, source) = load_config(cli.config.as_deref(), &cwd).with_context(|| {
        format!(
            "{}: {}",
            graphrank_core::ErrorCode::ConfigParseError.code(),
            graphrank_core::ErrorCode::ConfigParseError.message()
        )
    })?;

    match &cli.command {
        Commands::Rank(args) => cmd::rank::run_rank(args, &config, output),
        Commands::Show(args) => cmd::show::run_show(args, output),
        Commands::Config(args) => cmd::config::run_config(
            args,
            &config,
            source.as_deref(),
            cli.config.as_deref(),
            &cwd,
            output,
        ),
    }
}

use anyhow::Result;
use clap::Args;
use graphrank_core::config::{RankConfig, config_search_path};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Also list every location that was searched.
    #[arg(long)]
    pub paths: bool,
}

/// Payload for `grank config`.
#[derive(Debug, Serialize)]
struct EffectiveConfig<'a> {
    /// File the values came from; `None` means built-in defaults.
    source: Option<&'a Path>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    searched: Vec<PathBuf>,
    config: &'a RankConfig,
}

/// Execute `grank config`.
pub fn run_config(
    args: &ConfigArgs,
    config: &RankConfig,
    source: Option<&Path>,
    explicit: Option<&Path>,
    cwd: &Path,
    output: OutputMode,
) -> Result<()> {
    let payload = EffectiveConfig {
        source,
        searched: if args.paths {
            config_search_path(explicit, cwd)
        } else {
            Vec::new()
        },
        config,
    };
    render_mode(output, &payload, write_text, write_pretty)
}

fn source_label(source: Option<&Path>) -> String {
    source.map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string())
}

fn write_text(payload: &EffectiveConfig<'_>, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "# source: {}", source_label(payload.source))?;
    for path in &payload.searched {
        writeln!(w, "# searched: {}", path.display())?;
    }
    let body = toml::to_string_pretty(payload.config).map_err(io::Error::other)?;
    write!(w, "{body}")
}

fn write_pretty(payload: &EffectiveConfig<'_>, w: &mut dyn Write) -> io::Result<()> {
    let c = payload.config;
    pretty_section(w, "Effective configuration")?;
    pretty_kv(w, "Source", source_label(payload.source))?;
    for path in &payload.searched {
        pretty_kv(w, "Searched", path.display().to_string())?;
    }
    pretty_kv(w, "Damping", c.pagerank.damping_factor.to_string())?;
    pretty_kv(w, "Max iter", c.pagerank.max_iter.to_string())?;
    pretty_kv(
        w,
        "Epsilon",
        c.pagerank
            .epsilon
            .map_or_else(|| "1/(N*1000)".to_string(), |e| e.to_string()),
    )?;
    pretty_kv(w, "Aggregation", format!("{:?}", c.engine.aggregation).to_lowercase())?;
    pretty_kv(w, "Shard size", c.engine.shard_size.to_string())?;
    pretty_kv(
        w,
        "Threads",
        c.engine
            .threads
            .map_or_else(|| "auto".to_string(), |t| t.to_string()),
    )?;
    pretty_kv(w, "Policy", format!("{:?}", c.output.policy).to_lowercase())
}

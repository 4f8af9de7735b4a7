//! `graphrank.toml` configuration.
//!
//! Resolution order (first hit wins): an explicit `--config` path, then
//! `./graphrank.toml`, then `<config dir>/graphrank/config.toml`, then the
//! built-in defaults. Command-line flags are layered on top by the CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "graphrank.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankConfig {
    #[serde(default)]
    pub pagerank: PageRankSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRankSection {
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// `None` means "scale to the graph": `1 / (N * 1000)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
}

impl Default for PageRankSection {
    fn default() -> Self {
        Self {
            damping_factor: default_damping_factor(),
            max_iter: default_max_iter(),
            epsilon: None,
        }
    }
}

/// Where per-iteration incoming-rank sums are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// In memory, sharded across the rayon pool.
    #[default]
    Parallel,
    /// Inside the tabular store via join + grouped sum.
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub aggregation: AggregationKind,
    #[serde(default = "default_shard_size")]
    pub shard_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            aggregation: AggregationKind::default(),
            shard_size: default_shard_size(),
            threads: None,
        }
    }
}

/// What to do when the output relation already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Force-replace prior contents.
    #[default]
    Replace,
    /// Refuse with a collision error.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default)]
    pub policy: OverwritePolicy,
}

const fn default_damping_factor() -> f64 {
    0.85
}

const fn default_max_iter() -> usize {
    100
}

const fn default_shard_size() -> usize {
    4096
}

/// Parse a config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML for
/// [`RankConfig`].
pub fn load_config_file(path: &Path) -> Result<RankConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<RankConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Candidate config locations, most specific first.
#[must_use]
pub fn config_search_path(explicit: Option<&Path>, cwd: &Path) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut paths = vec![cwd.join(LOCAL_CONFIG_FILE)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("graphrank/config.toml"));
    }
    paths
}

/// Resolve and load the effective configuration.
///
/// An explicit path must exist; implicit locations are skipped when absent.
/// Returns the config together with the file it came from, if any.
///
/// # Errors
///
/// Returns an error if an explicit path is missing or any found file fails
/// to parse.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<(RankConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
    }

    for path in config_search_path(explicit, cwd) {
        if path.exists() {
            let config = load_config_file(&path)?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok((config, Some(path)));
        }
    }

    Ok((RankConfig::default(), None))
}

//! Writing results back to the store.
//!
//! The node→rank relation and its `<output>_summary` companion are written
//! in a single `materialize` call, so readers see either the previous pair
//! or the new pair, never a mix and never a half-written relation.

#![allow(clippy::module_name_repetitions)]

use graphrank_core::config::OverwritePolicy;
use graphrank_core::store::{Affinity, ColumnDef, Ident, Relation, TableRef, WriteMode};
use graphrank_core::{RankError, TabularStore};
use rusqlite::types::Value;
use tracing::{info, instrument};

use super::report::{PageRankReport, RunSummary};

/// Suffix of the companion summary relation.
pub const SUMMARY_SUFFIX: &str = "summary";

/// Writes a [`PageRankReport`] under a caller-chosen name.
pub struct ResultMaterializer<'s, S> {
    store: &'s S,
    policy: OverwritePolicy,
}

impl<'s, S: TabularStore> ResultMaterializer<'s, S> {
    #[must_use]
    pub const fn new(store: &'s S, policy: OverwritePolicy) -> Self {
        Self { store, policy }
    }

    /// Name of the summary relation written next to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] if the derived name is not a
    /// valid identifier.
    pub fn summary_name(output: &Ident) -> Result<Ident, RankError> {
        Ok(output.suffixed(SUMMARY_SUFFIX)?)
    }

    /// Fail early under [`OverwritePolicy::Strict`] if either destination
    /// is taken. Always passes under [`OverwritePolicy::Replace`].
    ///
    /// # Errors
    ///
    /// Returns [`RankError::Collision`] naming the first taken relation.
    pub fn check_collision(&self, output: &Ident) -> Result<(), RankError> {
        if self.policy == OverwritePolicy::Replace {
            return Ok(());
        }
        for name in [output.clone(), Self::summary_name(output)?] {
            if self.store.relation_exists(&name)? {
                return Err(RankError::Collision {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Write `report` to `output` and `<output>_summary`.
    ///
    /// Returns the written relations in that order.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::Collision`] under [`OverwritePolicy::Strict`] if
    /// either relation exists, or a store error. Nothing is written in
    /// either case.
    #[instrument(skip(self, report), fields(output = %output, rows = report.entries.len()))]
    pub fn write(
        &self,
        output: &Ident,
        report: &PageRankReport,
    ) -> Result<(TableRef, TableRef), RankError> {
        let summary_name = Self::summary_name(output)?;

        let rank_columns = [
            ColumnDef::new(Ident::new("node")?, Affinity::Any),
            ColumnDef::new(Ident::new("rank")?, Affinity::Real),
        ];
        let rank_rows: Vec<Vec<Value>> = report
            .entries
            .iter()
            .map(|e| vec![e.node.to_value(), Value::Real(e.rank)])
            .collect();

        let summary_columns = summary_columns()?;
        let summary_rows = vec![summary_row(&report.summary)];

        let mode = match self.policy {
            OverwritePolicy::Replace => WriteMode::Replace,
            OverwritePolicy::Strict => WriteMode::CreateNew,
        };

        let mut written = self
            .store
            .materialize(
                &[
                    Relation {
                        name: output,
                        columns: &rank_columns,
                        rows: &rank_rows,
                    },
                    Relation {
                        name: &summary_name,
                        columns: &summary_columns,
                        rows: &summary_rows,
                    },
                ],
                mode,
            )?
            .into_iter();

        let (Some(ranks), Some(summary)) = (written.next(), written.next()) else {
            return Err(RankError::Internal(
                "materialize returned fewer relations than requested".into(),
            ));
        };
        info!(relation = %output, summary = %summary_name, "results written");
        Ok((ranks, summary))
    }
}

fn summary_columns() -> Result<Vec<ColumnDef>, RankError> {
    let layout = [
        ("node_count", Affinity::Integer),
        ("edge_count", Affinity::Integer),
        ("sink_count", Affinity::Integer),
        ("iterations", Affinity::Integer),
        ("converged", Affinity::Integer),
        ("status", Affinity::Text),
        ("final_delta", Affinity::Real),
        ("damping_factor", Affinity::Real),
        ("epsilon", Affinity::Real),
        ("content_hash", Affinity::Text),
    ];
    layout
        .into_iter()
        .map(|(name, affinity)| Ok(ColumnDef::new(Ident::new(name)?, affinity)))
        .collect()
}

fn count(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn summary_row(summary: &RunSummary) -> Vec<Value> {
    vec![
        count(summary.node_count),
        count(summary.edge_count),
        count(summary.sink_count),
        count(summary.iterations),
        Value::Integer(i64::from(summary.converged)),
        Value::Text(summary.status.as_str().to_string()),
        summary.final_delta.map_or(Value::Null, Value::Real),
        Value::Real(summary.damping_factor),
        Value::Real(summary.epsilon),
        Value::Text(summary.content_hash.clone()),
    ]
}

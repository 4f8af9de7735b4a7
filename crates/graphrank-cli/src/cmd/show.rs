use anyhow::{Context, Result};
use clap::Args;
use graphrank_core::{RankError, SqliteStore, TabularStore};
use rusqlite::types::Value;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::output::{CliError, OutputMode, pretty_rule, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// SQLite database to read from.
    #[arg(long)]
    pub db: PathBuf,

    /// Relation to print (e.g. a rank output or its `_summary`).
    #[arg(long)]
    pub table: String,

    /// Maximum number of rows to print.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// Payload for `grank show`.
#[derive(Debug, Serialize)]
struct TableDump {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
    total_rows: u64,
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(r) => serde_json::Value::from(*r),
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::Value::from(format!("<blob {} bytes>", b.len())),
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn dump(store: &SqliteStore, name: &str, limit: usize) -> Result<TableDump, RankError> {
    let table = store.resolve_table(name)?;
    let columns = table.columns().iter().map(ToString::to_string).collect();
    let refs = table
        .columns()
        .iter()
        .map(|c| table.column(c.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = store.scan(&table, &refs.iter().collect::<Vec<_>>(), Some(limit))?;
    Ok(TableDump {
        table: table.name().to_string(),
        columns,
        rows: rows
            .iter()
            .map(|row| row.iter().map(json_value).collect())
            .collect(),
        total_rows: store.row_count(&table)?,
    })
}

/// Execute `grank show`.
pub fn run_show(args: &ShowArgs, output: OutputMode) -> Result<()> {
    if !args.db.exists() {
        render_error(
            output,
            &CliError::with_details(
                format!("database {} not found", args.db.display()),
                "pass the path of an existing SQLite database with --db",
                "db_missing",
            ),
        )?;
        anyhow::bail!("database not found");
    }
    let store = SqliteStore::open_read_only(&args.db)
        .with_context(|| format!("Failed to open {}", args.db.display()))?;

    let table = match dump(&store, &args.table, args.limit) {
        Ok(table) => table,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            return Err(err).context("show failed");
        }
    };

    render_mode(output, &table, write_text, write_pretty)
}

fn write_text(table: &TableDump, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{}", table.columns.join("\t"))?;
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(cell).collect();
        writeln!(w, "{}", cells.join("\t"))?;
    }
    Ok(())
}

fn write_pretty(table: &TableDump, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(
        w,
        &format!(
            "{} ({} of {} rows)",
            table.table,
            table.rows.len(),
            table.total_rows
        ),
    )?;
    let header: Vec<String> = table.columns.iter().map(|c| format!("{c:<20}")).collect();
    writeln!(w, "{}", header.join(" ").trim_end())?;
    pretty_rule(w)?;
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|v| format!("{:<20}", cell(v))).collect();
        writeln!(w, "{}", cells.join(" ").trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_limits_rows_but_counts_all() {
        let store = SqliteStore::open_in_memory().expect("store");
        store
            .connection()
            .execute_batch(
                "CREATE TABLE pr (node, rank REAL);
                 INSERT INTO pr VALUES ('a', 0.25), (2, 0.5), (NULL, 0.25);",
            )
            .expect("seed");
        let table = dump(&store, "PR", 2).expect("dump");
        assert_eq!(table.table, "pr");
        assert_eq!(table.columns, ["node", "rank"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.total_rows, 3);
    }

    #[test]
    fn show_reads_file_without_switching_journal_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.db");
        rusqlite::Connection::open(&path)
            .expect("create")
            .execute_batch(
                "CREATE TABLE pr (node, rank REAL);
                 INSERT INTO pr VALUES ('a', 1.0);",
            )
            .expect("seed");

        let store = SqliteStore::open_read_only(&path).expect("open");
        let table = dump(&store, "pr", 10).expect("dump");
        assert_eq!(table.total_rows, 1);
        drop(store);

        let mode: String = rusqlite::Connection::open(&path)
            .expect("reopen")
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("journal_mode");
        assert_eq!(mode.to_ascii_lowercase(), "delete");
    }

    #[test]
    fn dump_reports_unknown_relation() {
        let store = SqliteStore::open_in_memory().expect("store");
        let err = dump(&store, "missing", 5).expect_err("unknown");
        assert_eq!(err.code().code(), "E1004");
    }

    #[test]
    fn cells_render_without_json_quotes() {
        assert_eq!(cell(&json_value(&Value::Text("a".into()))), "a");
        assert_eq!(cell(&json_value(&Value::Integer(3))), "3");
        assert_eq!(cell(&json_value(&Value::Null)), "null");
    }
}

//! Tabular storage layer.
//!
//! The engine needs a handful of relational primitives from its store:
//! schema resolution, distinct projection, grouped count and sum, equi-join,
//! transactional materialization, and relation removal. [`TabularStore`]
//! captures exactly that surface; [`SqliteStore`] implements it on top of
//! `rusqlite`.
//!
//! Runtime defaults for on-disk stores:
//! - `journal_mode = WAL` so readers are not blocked by a running materialization
//! - `busy_timeout = 5s` to reduce transient lock failures under contention

pub mod schema;
mod sqlite;

use std::io;

use rusqlite::types::Value;

pub use schema::{
    Affinity, ColumnDef, ColumnRef, Ident, JoinColumn, JoinSpec, Relation, TableRef, WriteMode,
};
pub use sqlite::{DEFAULT_BUSY_TIMEOUT, SqliteStore};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur in the tabular store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A caller-supplied name is not a plain identifier.
    #[error("invalid identifier `{0}`: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    /// No table or view with this name exists.
    #[error("relation `{0}` does not exist")]
    UnknownRelation(String),

    /// The relation exists but has no such column.
    #[error("column `{column}` does not exist in relation `{table}`")]
    UnknownColumn { table: String, column: String },

    /// A column reference was used against a relation it does not belong to.
    #[error("column `{column}` belongs to `{owner}`, not `{table}`")]
    ForeignColumn {
        table: String,
        column: String,
        owner: String,
    },

    /// A row handed to `materialize` does not match the declared columns.
    #[error("row has {actual} values, expected {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    /// `WriteMode::CreateNew` found the name already taken.
    #[error("relation `{0}` already exists")]
    AlreadyExists(String),

    /// Self-joins need aliasing the store does not offer.
    #[error("equi-join of `{0}` with itself is not supported")]
    SelfJoin(String),

    /// Creating the database directory failed.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any failure reported by SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// TabularStore
// ---------------------------------------------------------------------------

/// The relational primitives the PageRank engine relies on.
///
/// Rows are exchanged as `Vec<Value>`, ordered like the requested columns.
pub trait TabularStore {
    /// Resolve a relation name against the live schema.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidIdentifier`] or [`StoreError::UnknownRelation`].
    fn resolve_table(&self, name: &str) -> Result<TableRef, StoreError>;

    /// Resolve a column of an already-resolved relation.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidIdentifier`] for malformed names,
    /// [`StoreError::UnknownColumn`] if the column is missing.
    fn resolve_column(&self, table: &TableRef, name: &str) -> Result<ColumnRef, StoreError> {
        let ident = Ident::new(name)?;
        table.column(ident.as_str())
    }

    /// Whether a table or view with this name exists.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn relation_exists(&self, name: &Ident) -> Result<bool, StoreError>;

    /// `SELECT DISTINCT columns FROM table`, ordered by the projected columns.
    ///
    /// # Errors
    ///
    /// [`StoreError::ForeignColumn`] if a column does not belong to `table`,
    /// or a store failure.
    fn distinct_projection(
        &self,
        table: &TableRef,
        columns: &[&ColumnRef],
    ) -> Result<Vec<Vec<Value>>, StoreError>;

    /// `SELECT columns FROM table` without deduplication, stopping after
    /// `limit` rows when one is given.
    ///
    /// # Errors
    ///
    /// Same as [`TabularStore::distinct_projection`].
    fn scan(
        &self,
        table: &TableRef,
        columns: &[&ColumnRef],
        limit: Option<usize>,
    ) -> Result<Vec<Vec<Value>>, StoreError>;

    /// `SELECT COUNT(*) FROM table`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn row_count(&self, table: &TableRef) -> Result<u64, StoreError>;

    /// `SELECT key, COUNT(*) FROM table GROUP BY key`.
    ///
    /// # Errors
    ///
    /// Same as [`TabularStore::distinct_projection`].
    fn grouped_count(
        &self,
        table: &TableRef,
        key: &ColumnRef,
    ) -> Result<Vec<(Value, u64)>, StoreError>;

    /// `SELECT key, TOTAL(value) FROM table GROUP BY key`.
    ///
    /// # Errors
    ///
    /// Same as [`TabularStore::distinct_projection`].
    fn grouped_sum(
        &self,
        table: &TableRef,
        key: &ColumnRef,
        value: &ColumnRef,
    ) -> Result<Vec<(Value, f64)>, StoreError>;

    /// Materialize an equi-join under `into`, replacing prior contents.
    ///
    /// # Errors
    ///
    /// [`StoreError::SelfJoin`], [`StoreError::ForeignColumn`], or a store
    /// failure.
    fn equi_join(&self, spec: &JoinSpec<'_>, into: &Ident) -> Result<TableRef, StoreError>;

    /// Write every relation in `relations` inside one transaction.
    ///
    /// Either all relations become visible with their new contents or none
    /// do.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyExists`] under [`WriteMode::CreateNew`],
    /// [`StoreError::ColumnCountMismatch`], or a store failure.
    fn materialize(
        &self,
        relations: &[Relation<'_>],
        mode: WriteMode,
    ) -> Result<Vec<TableRef>, StoreError>;

    /// Remove a named relation. Missing relations are not an error.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn drop_relation(&self, name: &Ident) -> Result<(), StoreError>;
}

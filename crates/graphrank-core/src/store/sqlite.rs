//! SQLite-backed [`TabularStore`].

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Params, params_from_iter, types::Value};
use tracing::{debug, instrument};

use super::schema::{ColumnDef, ColumnRef, Ident, JoinSpec, Relation, TableRef, WriteMode};
use super::{StoreError, TabularStore};

/// Busy timeout used for on-disk store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`TabularStore`] over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) an on-disk store and apply runtime pragmas.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened and configured.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self { conn })
    }

    /// Open an existing on-disk store without changing it.
    ///
    /// Unlike [`SqliteStore::open`], no directory is created, no pragma is
    /// written, and the journal mode is left as the file has it. Every
    /// write through the returned store fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        debug!(path = %path.display(), "opened sqlite store read-only");
        Ok(Self { conn })
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Wrap an existing connection.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Borrow the underlying connection (for seeding data in tests and tools).
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn table_columns(&self, table: &Ident) -> Result<Vec<Ident>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map([table.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        // Columns with names we cannot express as identifiers are unreachable
        // through the typed API, so they are simply not listed.
        Ok(names.into_iter().filter_map(|n| Ident::new(n).ok()).collect())
    }

    fn query_rows<P: Params>(
        &self,
        sql: &str,
        params: P,
        width: usize,
    ) -> Result<Vec<Vec<Value>>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn relation_exists_in(conn: &Connection, name: &Ident) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
        [name.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn select_list(table: &TableRef, columns: &[&ColumnRef]) -> Result<String, StoreError> {
    if columns.is_empty() {
        return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
    }
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        table.owns(column)?;
        parts.push(column.name.quoted());
    }
    Ok(parts.join(", "))
}

impl TabularStore for SqliteStore {
    fn resolve_table(&self, name: &str) -> Result<TableRef, StoreError> {
        let ident = Ident::new(name)?;
        let canonical: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master
                 WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
                [ident.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(canonical) = canonical else {
            return Err(StoreError::UnknownRelation(ident.to_string()));
        };

        let name = Ident::new(canonical)?;
        let columns = self.table_columns(&name)?;
        Ok(TableRef { name, columns })
    }

    fn relation_exists(&self, name: &Ident) -> Result<bool, StoreError> {
        Ok(relation_exists_in(&self.conn, name)?)
    }

    #[instrument(skip_all, fields(table = %table.name))]
    fn distinct_projection(
        &self,
        table: &TableRef,
        columns: &[&ColumnRef],
    ) -> Result<Vec<Vec<Value>>, StoreError> {
        let list = select_list(table, columns)?;
        let sql = format!(
            "SELECT DISTINCT {list} FROM {} ORDER BY {list}",
            table.name.quoted()
        );
        self.query_rows(&sql, [], columns.len())
    }

    fn scan(
        &self,
        table: &TableRef,
        columns: &[&ColumnRef],
        limit: Option<usize>,
    ) -> Result<Vec<Vec<Value>>, StoreError> {
        let list = select_list(table, columns)?;
        let sql = format!("SELECT {list} FROM {} LIMIT ?1", table.name.quoted());
        // A negative LIMIT means no limit in SQLite.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        self.query_rows(&sql, [limit], columns.len())
    }

    fn row_count(&self, table: &TableRef) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name.quoted()),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip_all, fields(table = %table.name, key = %key.name))]
    fn grouped_count(
        &self,
        table: &TableRef,
        key: &ColumnRef,
    ) -> Result<Vec<(Value, u64)>, StoreError> {
        table.owns(key)?;
        let k = key.name.quoted();
        let sql = format!(
            "SELECT {k}, COUNT(*) FROM {} GROUP BY {k} ORDER BY {k}",
            table.name.quoted()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let groups = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, Value>(0)?, u64::try_from(count).unwrap_or(0)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    #[instrument(skip_all, fields(table = %table.name, key = %key.name))]
    fn grouped_sum(
        &self,
        table: &TableRef,
        key: &ColumnRef,
        value: &ColumnRef,
    ) -> Result<Vec<(Value, f64)>, StoreError> {
        table.owns(key)?;
        table.owns(value)?;
        let k = key.name.quoted();
        let sql = format!(
            "SELECT {k}, TOTAL({}) FROM {} GROUP BY {k} ORDER BY {k}",
            value.name.quoted(),
            table.name.quoted()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let groups = stmt
            .query_map([], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    #[instrument(skip_all, fields(left = %spec.left.name, right = %spec.right.name, into = %into))]
    fn equi_join(&self, spec: &JoinSpec<'_>, into: &Ident) -> Result<TableRef, StoreError> {
        if spec.left.name.matches(spec.right.name.as_str()) {
            return Err(StoreError::SelfJoin(spec.left.name.to_string()));
        }
        if spec.select.is_empty() {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        spec.left.owns(spec.left_key)?;
        spec.right.owns(spec.right_key)?;

        let mut projection = Vec::with_capacity(spec.select.len());
        for jc in spec.select {
            let side = if spec.left.owns(&jc.column).is_ok() {
                "l"
            } else {
                spec.right.owns(&jc.column)?;
                "r"
            };
            projection.push(format!(
                "{side}.{} AS {}",
                jc.column.name.quoted(),
                jc.alias.quoted()
            ));
        }

        let sql = format!(
            "CREATE TABLE {} AS SELECT {} FROM {} AS l JOIN {} AS r ON l.{} = r.{}",
            into.quoted(),
            projection.join(", "),
            spec.left.name.quoted(),
            spec.right.name.quoted(),
            spec.left_key.name.quoted(),
            spec.right_key.name.quoted(),
        );

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", into.quoted()), [])?;
        tx.execute(&sql, [])?;
        tx.commit()?;

        Ok(TableRef {
            name: into.clone(),
            columns: spec.select.iter().map(|c| c.alias.clone()).collect(),
        })
    }

    #[instrument(skip_all, fields(relations = relations.len(), mode = ?mode))]
    fn materialize(
        &self,
        relations: &[Relation<'_>],
        mode: WriteMode,
    ) -> Result<Vec<TableRef>, StoreError> {
        // Dropping `tx` on any early return rolls every relation back.
        let tx = self.conn.unchecked_transaction()?;
        let mut tables = Vec::with_capacity(relations.len());

        for rel in relations {
            if rel.columns.is_empty() {
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            let exists = relation_exists_in(&tx, rel.name)?;
            match mode {
                WriteMode::CreateNew if exists => {
                    return Err(StoreError::AlreadyExists(rel.name.to_string()));
                }
                WriteMode::Replace if exists => {
                    tx.execute(&format!("DROP TABLE {}", rel.name.quoted()), [])?;
                }
                _ => {}
            }

            let decls = rel
                .columns
                .iter()
                .map(ColumnDef::declaration)
                .collect::<Vec<_>>()
                .join(", ");
            tx.execute(&format!("CREATE TABLE {} ({decls})", rel.name.quoted()), [])?;

            let placeholders = (1..=rel.columns.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} VALUES ({placeholders})",
                    rel.name.quoted()
                ))?;
                for row in rel.rows {
                    if row.len() != rel.columns.len() {
                        return Err(StoreError::ColumnCountMismatch {
                            expected: rel.columns.len(),
                            actual: row.len(),
                        });
                    }
                    stmt.execute(params_from_iter(row.iter()))?;
                }
            }

            debug!(relation = %rel.name, rows = rel.rows.len(), "materialized relation");
            tables.push(TableRef {
                name: rel.name.clone(),
                columns: rel.columns.iter().map(|c| c.name.clone()).collect(),
            });
        }

        tx.commit()?;
        Ok(tables)
    }

    fn drop_relation(&self, name: &Ident) -> Result<(), StoreError> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", name.quoted()), [])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Typed schema references.
//!
//! Caller-supplied table and column names never reach SQL text directly.
//! They are first validated into an [`Ident`], then resolved against the
//! live schema into a [`TableRef`] / [`ColumnRef`]. Only those resolved
//! references are spliced (quoted) into statements; every value travels as
//! a bound parameter.

use std::fmt;

use rusqlite::types::Value;

use super::StoreError;

// ---------------------------------------------------------------------------
// Ident
// ---------------------------------------------------------------------------

/// A validated SQL identifier matching `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    /// Validate `name` as an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] if `name` is empty or
    /// contains characters outside `[A-Za-z0-9_]`, or starts with a digit.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid_head && valid_tail {
            Ok(Self(name))
        } else {
            Err(StoreError::InvalidIdentifier(name))
        }
    }

    /// The raw identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in double quotes, ready for SQL text.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Case-insensitive comparison, matching SQLite's identifier semantics.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// Derive a new identifier by appending `_suffix`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] if `suffix` contains
    /// characters that are not valid in an identifier.
    pub fn suffixed(&self, suffix: &str) -> Result<Self, StoreError> {
        Self::new(format!("{}_{suffix}", self.0))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Resolved references
// ---------------------------------------------------------------------------

/// A relation known to exist, with its column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub(crate) name: Ident,
    pub(crate) columns: Vec<Ident>,
}

impl TableRef {
    /// Relation name.
    #[must_use]
    pub const fn name(&self) -> &Ident {
        &self.name
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Ident] {
        &self.columns
    }

    /// Resolve one of this relation's columns by (case-insensitive) name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownColumn`] if the relation has no such column.
    pub fn column(&self, name: &str) -> Result<ColumnRef, StoreError> {
        self.columns
            .iter()
            .find(|c| c.matches(name))
            .map(|c| ColumnRef {
                table: self.name.clone(),
                name: c.clone(),
            })
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.name.to_string(),
                column: name.to_string(),
            })
    }

    pub(crate) fn owns(&self, column: &ColumnRef) -> Result<(), StoreError> {
        if self.name.matches(column.table.as_str()) {
            Ok(())
        } else {
            Err(StoreError::ForeignColumn {
                table: self.name.to_string(),
                column: column.name.to_string(),
                owner: column.table.to_string(),
            })
        }
    }
}

/// A column known to exist in a specific relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub(crate) table: Ident,
    pub(crate) name: Ident,
}

impl ColumnRef {
    /// Owning relation.
    #[must_use]
    pub const fn table(&self) -> &Ident {
        &self.table
    }

    /// Column name.
    #[must_use]
    pub const fn name(&self) -> &Ident {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Materialization and join descriptors
// ---------------------------------------------------------------------------

/// Declared type affinity for a materialized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// No declared type; values keep their own storage class.
    Any,
    Integer,
    Real,
    Text,
}

impl Affinity {
    const fn declaration(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Integer => " INTEGER",
            Self::Real => " REAL",
            Self::Text => " TEXT",
        }
    }
}

/// A column in a relation about to be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: Ident,
    pub affinity: Affinity,
}

impl ColumnDef {
    #[must_use]
    pub const fn new(name: Ident, affinity: Affinity) -> Self {
        Self { name, affinity }
    }

    pub(crate) fn declaration(&self) -> String {
        format!("{}{}", self.name.quoted(), self.affinity.declaration())
    }
}

/// Rows to write under a name.
#[derive(Debug, Clone, Copy)]
pub struct Relation<'a> {
    pub name: &'a Ident,
    pub columns: &'a [ColumnDef],
    pub rows: &'a [Vec<Value>],
}

/// How [`super::TabularStore::materialize`] treats an existing relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop whatever is there and write the new rows.
    Replace,
    /// Fail with [`StoreError::AlreadyExists`] if the name is taken.
    CreateNew,
}

/// One projected column of an equi-join result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    pub column: ColumnRef,
    pub alias: Ident,
}

/// `left JOIN right ON left.left_key = right.right_key`, projecting `select`.
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec<'a> {
    pub left: &'a TableRef,
    pub left_key: &'a ColumnRef,
    pub right: &'a TableRef,
    pub right_key: &'a ColumnRef,
    pub select: &'a [JoinColumn],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_accepts_plain_names() {
        for name in ["edges", "_tmp", "Edge_List_2", "a"] {
            assert!(Ident::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn ident_rejects_injection_shapes() {
        for name in [
            "",
            "1edges",
            "edges; DROP TABLE x",
            "e\"dges",
            "edges--",
            "név",
            "a b",
        ] {
            assert!(
                matches!(Ident::new(name), Err(StoreError::InvalidIdentifier(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn quoted_wraps_in_double_quotes() {
        let ident = Ident::new("ranks").expect("valid");
        assert_eq!(ident.quoted(), "\"ranks\"");
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let table = TableRef {
            name: Ident::new("edges").expect("valid"),
            columns: vec![Ident::new("Src").expect("valid"), Ident::new("dst").expect("valid")],
        };
        let col = table.column("src").expect("src resolves");
        assert_eq!(col.name().as_str(), "Src");
        assert!(table.owns(&col).is_ok());
        assert!(matches!(
            table.column("weight"),
            Err(StoreError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn ownership_check_rejects_foreign_columns() {
        let edges = TableRef {
            name: Ident::new("edges").expect("valid"),
            columns: vec![Ident::new("src").expect("valid")],
        };
        let other = TableRef {
            name: Ident::new("other").expect("valid"),
            columns: vec![Ident::new("src").expect("valid")],
        };
        let foreign = other.column("src").expect("resolves");
        assert!(matches!(
            edges.owns(&foreign),
            Err(StoreError::ForeignColumn { .. })
        ));
    }
}

//! Node identifiers.
//!
//! Graph vertices are opaque identifiers drawn from either the integer or the
//! text domain, matching the two SQLite storage classes an edge column can
//! hold. The derived ordering places every integer before every text value,
//! which is also the order SQLite sorts mixed columns in, so node order is
//! deterministic regardless of where the identifiers came from.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// An opaque vertex identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    /// Integer-valued identifier.
    Int(i64),
    /// Text-valued identifier.
    Text(String),
}

impl NodeId {
    /// Convert a stored value into a node identifier.
    ///
    /// Returns `None` for `NULL`, real, and blob values; those are not valid
    /// vertex identifiers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Self::Int(*i)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Real(_) | Value::Blob(_) => None,
        }
    }

    /// Convert into a value suitable for binding into a store row.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Integer(*i),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }

    /// Feed a type-tagged encoding of this identifier into a hasher.
    ///
    /// The tag keeps `Int(1)` and `Text("1")` distinct.
    pub fn hash_into(&self, hasher: &mut impl FnMut(&[u8])) {
        match self {
            Self::Int(i) => {
                hasher(b"i");
                hasher(&i.to_le_bytes());
            }
            Self::Text(s) => {
                hasher(b"t");
                hasher(s.as_bytes());
            }
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ToSql for NodeId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for NodeId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(Self::Int(i)),
            ValueRef::Text(_) => value.as_str().map(|s| Self::Text(s.to_string())),
            ValueRef::Null | ValueRef::Real(_) | ValueRef::Blob(_) => {
                Err(FromSqlError::InvalidType)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_sort_before_text() {
        let mut ids = vec![
            NodeId::from("a"),
            NodeId::from(10),
            NodeId::from("B"),
            NodeId::from(-3),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                NodeId::Int(-3),
                NodeId::Int(10),
                NodeId::from("B"),
                NodeId::from("a"),
            ]
        );
    }

    #[test]
    fn from_value_rejects_null_real_and_blob() {
        assert_eq!(NodeId::from_value(&Value::Integer(7)), Some(NodeId::Int(7)));
        assert_eq!(
            NodeId::from_value(&Value::Text("x".into())),
            Some(NodeId::from("x"))
        );
        assert_eq!(NodeId::from_value(&Value::Null), None);
        assert_eq!(NodeId::from_value(&Value::Real(1.5)), None);
        assert_eq!(NodeId::from_value(&Value::Blob(vec![1])), None);
    }

    #[test]
    fn hash_encoding_distinguishes_domains() {
        let mut a = Vec::new();
        NodeId::Int(1).hash_into(&mut |bytes| a.extend_from_slice(bytes));
        let mut b = Vec::new();
        NodeId::from("1").hash_into(&mut |bytes| b.extend_from_slice(bytes));
        assert_ne!(a, b);
    }

    #[test]
    fn sql_round_trip_through_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory db");
        conn.execute("CREATE TABLE t (v)", []).expect("create");
        conn.execute(
            "INSERT INTO t (v) VALUES (?1), (?2)",
            rusqlite::params![NodeId::Int(42), NodeId::from("node-a")],
        )
        .expect("insert");

        let mut stmt = conn.prepare("SELECT v FROM t ORDER BY v").expect("prepare");
        let ids = stmt
            .query_map([], |row| row.get::<_, NodeId>(0))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("collect");
        assert_eq!(ids, vec![NodeId::Int(42), NodeId::from("node-a")]);
    }
}

//! Core types exchanged between callers, the pool and the storage engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A value bound to a statement parameter or read from a result column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean (stored as 0/1 by engines without a native type)
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Timestamp in UTC
    Timestamp(DateTime<Utc>),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            Value::Text(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row from a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Column names, in select order
    columns: Vec<String>,
    /// Column values
    pub values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Convert to a map keyed by column name
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Column metadata reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type, when the engine knows it
    #[serde(default)]
    pub data_type: Option<String>,
    pub ordinal: usize,
}

/// Rows returned by a read statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    /// Time spent inside the engine, in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            execution_time_ms: 0,
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First value of the first row, handy for `SELECT COUNT(*)` style queries
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.get(0))
    }
}

/// Outcome of a mutating statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementResult {
    pub affected_rows: u64,
    /// Identifier generated by the statement (e.g. SQLite rowid), if any
    pub last_insert_id: Option<i64>,
}

/// Result of one logical operation run through the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutput {
    Rows(QueryResult),
    Write(StatementResult),
}

impl QueryOutput {
    pub fn rows(&self) -> Option<&QueryResult> {
        match self {
            QueryOutput::Rows(result) => Some(result),
            QueryOutput::Write(_) => None,
        }
    }

    pub fn into_rows(self) -> Option<QueryResult> {
        match self {
            QueryOutput::Rows(result) => Some(result),
            QueryOutput::Write(_) => None,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        match self {
            QueryOutput::Rows(_) => 0,
            QueryOutput::Write(result) => result.affected_rows,
        }
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        match self {
            QueryOutput::Rows(_) => None,
            QueryOutput::Write(result) => result.last_insert_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ticket_row() -> Row {
        Row::new(
            vec!["id".into(), "title".into()],
            vec![Value::Integer(7), Value::Text("Printer on fire".into())],
        )
    }

    #[test]
    fn test_row_lookup_by_name() {
        let row = ticket_row();
        assert_eq!(row.get_by_name("title"), Some(&Value::Text("Printer on fire".into())));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get(0).and_then(Value::as_i64), Some(7));
    }

    #[test]
    fn test_row_to_map() {
        let map = ticket_row().to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["id"], Value::Integer(7));
    }

    #[test]
    fn test_scalar() {
        let result = QueryResult {
            columns: vec![ColumnMeta {
                name: "n".into(),
                data_type: None,
                ordinal: 0,
            }],
            rows: vec![Row::new(vec!["n".into()], vec![Value::Integer(42)])],
            execution_time_ms: 0,
        };
        assert_eq!(result.scalar(), Some(&Value::Integer(42)));
        assert_eq!(QueryResult::empty().scalar(), None);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from("open"), Value::Text("open".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
    }

    #[test]
    fn test_query_output_accessors() {
        let write = QueryOutput::Write(StatementResult {
            affected_rows: 1,
            last_insert_id: Some(12),
        });
        assert_eq!(write.affected_rows(), 1);
        assert_eq!(write.last_insert_id(), Some(12));
        assert!(write.rows().is_none());

        let read = QueryOutput::Rows(QueryResult::empty());
        assert_eq!(read.affected_rows(), 0);
        assert!(read.into_rows().is_some());
    }
}

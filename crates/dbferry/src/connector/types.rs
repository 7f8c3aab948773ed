//! Shared value types crossing the connector boundary.

use serde::{Deserialize, Serialize};

/// A column definition as reported by a source engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Engine type string, possibly with a parenthesized length suffix
    /// (e.g. `varchar(255)`).
    pub data_type: String,

    /// Column comment, empty when the engine reports none.
    #[serde(default)]
    pub comment: String,
}

impl Column {
    /// Create a column from a name and type string.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            comment: String::new(),
        }
    }

    /// The type name with any parenthesized suffix stripped:
    /// `decimal(10,2)` yields `decimal`.
    pub fn base_type(&self) -> &str {
        match self.data_type.split_once('(') {
            Some((base, _)) => base,
            None => &self.data_type,
        }
    }
}

/// Clustering declaration for a table, when the source engine has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Ordered cluster key columns.
    pub cluster_keys: Vec<String>,

    /// Bucket count, when declared.
    pub bucket_num: Option<u32>,
}

/// A single SQL value as returned by `execute_sql`.
///
/// Deliberately small: the core only compares and displays values, it
/// never encodes them back into wire formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl SqlValue {
    /// Interpret the value as a text string, when it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret the value as an integer, widening from bool.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }
}

/// One result row.
pub type Row = Vec<SqlValue>;

/// Everything a source needs to unload one table to interchange files.
#[derive(Debug, Clone)]
pub struct UnloadRequest {
    /// Id of the task driving the unload, usable for file naming.
    pub task_id: String,

    /// Source database name.
    pub database: String,

    /// Source table name.
    pub table: String,

    /// Partition predicates restricting the unload, when configured.
    pub partitions: Option<Vec<String>>,
}

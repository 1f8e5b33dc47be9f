//! Analytics Engine - contract for the embedded columnar SQL engine
//!
//! The workbench never parses or plans SQL itself. Everything goes through
//! this trait: statements, file buffers backing `read_csv`/`read_parquet`
//! calls, and best-effort cancellation of the statement in flight.

#[cfg(feature = "duckdb")]
pub mod duckdb_engine;
#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "duckdb")]
pub use duckdb_engine::DuckDbEngine;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;

/// A single engine-native cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Integer(i64),
    /// 64-bit and wider engine integers; always exported as strings
    BigInt(i128),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::BigInt(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Binary(bytes) => {
                for b in bytes {
                    write!(f, "\\x{:02X}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Boolean(b) => serializer.serialize_bool(*b),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::BigInt(i) => serializer.serialize_str(&i.to_string()),
            CellValue::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            CellValue::Float(_) => serializer.serialize_none(),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Binary(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

/// Column metadata as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineColumn {
    pub name: String,
    /// Engine type name, e.g. "VARCHAR" or "Int64"
    pub type_name: String,
    pub nullable: bool,
}

/// Raw tabular result of one statement
#[derive(Debug, Clone, Default)]
pub struct EngineResult {
    pub columns: Vec<EngineColumn>,
    pub rows: Vec<Vec<CellValue>>,
}

impl EngineResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Values of one named column, in row order
    pub fn column_values(&self, name: &str) -> Vec<&CellValue> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().filter_map(|r| r.get(idx)).collect(),
            None => Vec::new(),
        }
    }
}

/// Embedded analytical engine
#[async_trait]
pub trait AnalyticsEngine: Send + Sync {
    /// Engine name (e.g., "duckdb")
    fn name(&self) -> &'static str;

    /// Execute one SQL statement
    async fn query(&self, sql: &str) -> Result<EngineResult>;

    /// Make `bytes` readable by SQL under `name`
    async fn register_file_buffer(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Forget a file registered with `register_file_buffer`
    async fn drop_file(&self, name: &str) -> Result<()>;

    /// Ask the engine to interrupt the statement in flight
    async fn cancel_sent(&self) -> Result<bool>;
}

/// Quote an identifier for use in SQL text
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal for use in SQL text
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

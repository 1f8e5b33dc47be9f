//! Query Result - stable result shape built from engine output

use crate::engine::{CellValue, EngineResult};
use crate::execution::types::{normalize_type, SemanticType};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryColumn {
    pub name: String,
    /// Raw engine type name
    #[serde(rename = "type")]
    pub data_type: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
}

/// Rows and columns of one execution; never mutated after creation
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Vec<CellValue>>,
    pub execution_time_ms: u64,
    /// Affected row count for INSERT/UPDATE/DELETE
    pub row_count: Option<u64>,
}

impl QueryResult {
    pub fn from_engine(result: EngineResult, sql: &str, elapsed: Duration) -> Self {
        let row_count = if is_dml(sql) { affected_rows(&result) } else { None };
        let columns = result
            .columns
            .into_iter()
            .map(|c| QueryColumn {
                semantic_type: normalize_type(&c.type_name),
                name: c.name,
                data_type: c.type_name,
                nullable: c.nullable,
            })
            .collect();

        Self {
            columns,
            rows: result.rows,
            execution_time_ms: elapsed.as_millis() as u64,
            row_count,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows as JSON objects keyed by column name, in column order
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| (col.name.clone(), cell_to_json(cell)))
                    .collect()
            })
            .collect()
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QueryResult", 4)?;
        state.serialize_field("data", &self.records())?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("executionTime", &self.execution_time_ms)?;
        if let Some(count) = self.row_count {
            state.serialize_field("rowCount", &count)?;
        } else {
            state.skip_field("rowCount")?;
        }
        state.end()
    }
}

pub(crate) fn cell_to_json(cell: &CellValue) -> Value {
    serde_json::to_value(cell).unwrap_or(Value::Null)
}

fn is_dml(sql: &str) -> bool {
    let first_word = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(first_word.as_str(), "INSERT" | "UPDATE" | "DELETE")
}

/// DuckDB reports DML as a single `Count` cell
fn affected_rows(result: &EngineResult) -> Option<u64> {
    if result.columns.len() != 1 || result.rows.len() != 1 {
        return None;
    }
    match result.rows[0].first()? {
        CellValue::Integer(n) => u64::try_from(*n).ok(),
        CellValue::BigInt(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

//! CSV/JSON export of an already-fetched result

use crate::engine::CellValue;
use crate::error::Result;
use crate::execution::result::{cell_to_json, QueryResult};
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Column and row subset to export; `None` means all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSelection {
    pub columns: Option<Vec<usize>>,
    pub rows: Option<Vec<usize>>,
}

impl ExportSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: Vec<usize>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn rows(mut self, rows: Vec<usize>) -> Self {
        self.rows = Some(rows);
        self
    }
}

/// Sorted, de-duplicated indices below `len`
fn resolve_indices(requested: Option<&[usize]>, len: usize) -> Vec<usize> {
    match requested {
        Some(indices) => indices
            .iter()
            .copied()
            .filter(|&i| i < len)
            .sorted_unstable()
            .dedup()
            .collect(),
        None => (0..len).collect(),
    }
}

fn csv_field(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Text(_) | CellValue::Binary(_) => {
            format!("\"{}\"", cell.to_string().replace('"', "\"\""))
        }
        other => other.to_string(),
    }
}

/// CSV text: unquoted header, quoted strings, empty fields for null
pub fn to_csv(result: &QueryResult, selection: &ExportSelection) -> String {
    let columns = resolve_indices(selection.columns.as_deref(), result.columns.len());
    let rows = resolve_indices(selection.rows.as_deref(), result.rows.len());

    let header = columns.iter().map(|&c| result.columns[c].name.as_str()).join(",");
    let records = rows.iter().map(|&r| {
        let row = &result.rows[r];
        columns
            .iter()
            .map(|&c| row.get(c).map(csv_field).unwrap_or_default())
            .join(",")
    });

    std::iter::once(header).chain(records).join("\n")
}

/// Pretty-printed array of objects keyed by column name
pub fn to_json(result: &QueryResult, selection: &ExportSelection) -> Result<String> {
    let columns = resolve_indices(selection.columns.as_deref(), result.columns.len());
    let rows = resolve_indices(selection.rows.as_deref(), result.rows.len());

    let records: Vec<Map<String, Value>> = rows
        .iter()
        .map(|&r| {
            let row = &result.rows[r];
            columns
                .iter()
                .map(|&c| {
                    let value = row.get(c).map(cell_to_json).unwrap_or(Value::Null);
                    (result.columns[c].name.clone(), value)
                })
                .collect()
        })
        .collect();

    Ok(serde_json::to_string_pretty(&records)?)
}

pub fn export(result: &QueryResult, format: ExportFormat, selection: &ExportSelection) -> Result<String> {
    match format {
        ExportFormat::Csv => Ok(to_csv(result, selection)),
        ExportFormat::Json => to_json(result, selection),
    }
}

/// Write an export to `path`
pub fn export_to_file(
    result: &QueryResult,
    format: ExportFormat,
    selection: &ExportSelection,
    path: &Path,
) -> Result<()> {
    let content = export(result, format, selection)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// `query_results_<timestamp>.<ext>`
pub fn default_file_name(format: ExportFormat) -> String {
    format!(
        "query_results_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::result::QueryColumn;
    use crate::execution::types::SemanticType;

    fn column(name: &str, data_type: &str, semantic_type: SemanticType) -> QueryColumn {
        QueryColumn {
            name: name.into(),
            data_type: data_type.into(),
            semantic_type,
            nullable: true,
        }
    }

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec![
                column("id", "BIGINT", SemanticType::Number),
                column("quote", "VARCHAR", SemanticType::String),
                column("score", "DOUBLE", SemanticType::Number),
            ],
            rows: vec![
                vec![CellValue::BigInt(9007199254740993), CellValue::Text("He said \"hi\", ok".into()), CellValue::Float(1.5)],
                vec![CellValue::BigInt(2), CellValue::Null, CellValue::Null],
                vec![CellValue::BigInt(3), CellValue::Text("plain".into()), CellValue::Float(0.25)],
                vec![CellValue::BigInt(4), CellValue::Text("line\nbreak".into()), CellValue::Float(2.0)],
                vec![CellValue::BigInt(5), CellValue::Text("".into()), CellValue::Float(-1.0)],
            ],
            execution_time_ms: 1,
            row_count: None,
        }
    }

    #[test]
    fn test_csv_quoting_and_nulls() {
        let csv = to_csv(&sample(), &ExportSelection::all().rows(vec![0, 1]));
        assert_eq!(
            csv,
            "id,quote,score\n9007199254740993,\"He said \"\"hi\"\", ok\",1.5\n2,,"
        );
    }

    #[test]
    fn test_csv_column_subset() {
        let csv = to_csv(&sample(), &ExportSelection::all().columns(vec![1]));
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines[0], "quote");
        // one header, five records, one of which spans two lines
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_indices_sorted_deduplicated_and_bounded() {
        assert_eq!(resolve_indices(Some(&[4, 1, 1, 9, 0]), 5), vec![0, 1, 4]);
        assert_eq!(resolve_indices(None, 3), vec![0, 1, 2]);
        assert!(resolve_indices(Some(&[7]), 3).is_empty());
    }

    #[test]
    fn test_json_preserves_null_and_big_integers() {
        let json = to_json(&sample(), &ExportSelection::all().rows(vec![1, 0])).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["id"], "9007199254740993");
        assert_eq!(parsed[1]["quote"], Value::Null);
        assert_eq!(parsed[1]["score"], Value::Null);
        assert!(json.starts_with("[\n  {\n    \"id\""));
    }

    #[test]
    fn test_json_subset_shape() {
        let json = to_json(&sample(), &ExportSelection::all().columns(vec![1])).unwrap();
        let parsed: Vec<Map<String, Value>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 5);
        assert!(parsed.iter().all(|r| r.len() == 1 && r.contains_key("quote")));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xlsx".parse::<ExportFormat>().is_err());
        assert!(default_file_name(ExportFormat::Json).ends_with(".json"));
    }
}

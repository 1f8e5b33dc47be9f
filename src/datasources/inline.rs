//! Inline row data: column resolution, CSV buffer, and table creation
//!
//! Rows are written to a CSV buffer and read back with an all-VARCHAR, full
//! scan, explicit-header `read_csv` so the engine cannot guess types or the
//! header row from a small sample. If the engine still falls back to
//! positional names (`column0`, `column1`, ...) the table is rebuilt with
//! explicit columns.

use crate::datasources::import::csv_reader_sql;
use crate::datasources::{introspect, Row};
use crate::engine::{quote_ident, quote_literal, AnalyticsEngine};
use crate::error::{Result, WorkbenchError};
use csv::{QuoteStyle, WriterBuilder};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

lazy_static! {
    static ref GENERIC_COLUMN: Regex = Regex::new(r"(?i)^column\d+$").expect("valid regex");
}

/// Column list for an inline source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub columns: Vec<String>,
    /// Names that appeared more than once in the explicit column order
    pub duplicates: Vec<String>,
}

/// Columns from the explicit order (de-duplicated, first wins) or from the first row's keys
pub fn resolve_columns(rows: &[Row], column_order: Option<&[String]>) -> ResolvedColumns {
    match column_order.filter(|order| !order.is_empty()) {
        Some(order) => ResolvedColumns {
            columns: order.iter().unique().cloned().collect(),
            duplicates: order.iter().duplicates().cloned().collect(),
        },
        None => ResolvedColumns {
            columns: rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default(),
            duplicates: Vec::new(),
        },
    }
}

/// Engine-generated positional column name
pub fn is_generic_column_name(name: &str) -> bool {
    GENERIC_COLUMN.is_match(name)
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .join("; "),
        Some(other) => other.to_string(),
    }
}

/// Serialize rows to CSV text with a header row
pub fn rows_to_csv(columns: &[String], rows: &[Row]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| field_text(row.get(c))))?;
    }

    writer
        .into_inner()
        .map_err(|e| WorkbenchError::Io(e.into_error()))
}

fn explicit_varchar_table_sql(table_name: &str, columns: &[String]) -> String {
    let definitions = columns
        .iter()
        .map(|c| format!("{} VARCHAR", quote_ident(c)))
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table_name), definitions)
}

/// Materialize inline rows as `table_name`
///
/// The temporary CSV file is dropped whether or not creation succeeded.
pub async fn load_inline(
    engine: &dyn AnalyticsEngine,
    table_name: &str,
    columns: &[String],
    rows: &[Row],
) -> Result<()> {
    if columns.is_empty() {
        return Err(WorkbenchError::DataSourceLoad(format!(
            "No columns could be determined for table {}",
            table_name
        )));
    }

    let file_name = format!("{}_inline_{}.csv", table_name, Uuid::new_v4().simple());
    let buffer = rows_to_csv(columns, rows)?;
    engine.register_file_buffer(&file_name, &buffer).await?;
    debug!(table = %table_name, rows = rows.len(), bytes = buffer.len(), "registered inline buffer");

    let outcome = create_from_buffer(engine, table_name, &file_name, columns).await;

    if let Err(e) = engine.drop_file(&file_name).await {
        warn!(file = %file_name, "failed to drop temporary file: {}", e);
    }
    outcome
}

async fn create_from_buffer(
    engine: &dyn AnalyticsEngine,
    table_name: &str,
    file_name: &str,
    columns: &[String],
) -> Result<()> {
    let create = format!(
        "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}",
        quote_ident(table_name),
        csv_reader_sql(file_name, ',')
    );
    engine.query(&create).await?;

    let actual = introspect::table_columns(engine, table_name).await?;
    if !actual.iter().any(|c| is_generic_column_name(&c.name)) {
        return Ok(());
    }

    warn!(
        table = %table_name,
        "engine produced positional column names, recreating with explicit columns"
    );
    engine
        .query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table_name)))
        .await?;
    engine.query(&explicit_varchar_table_sql(table_name, columns)).await?;
    engine
        .query(&format!(
            "INSERT INTO {} SELECT * FROM read_csv_auto({}, header = true)",
            quote_ident(table_name),
            quote_literal(file_name)
        ))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_resolve_columns_from_first_row() {
        let rows = vec![row(json!({"id": 1, "name": "a"})), row(json!({"other": 2}))];
        let resolved = resolve_columns(&rows, None);
        assert_eq!(resolved.columns, vec!["id", "name"]);
        assert!(resolved.duplicates.is_empty());
    }

    #[test]
    fn test_resolve_columns_deduplicates_explicit_order() {
        let order: Vec<String> = ["b", "a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        let resolved = resolve_columns(&[], Some(&order));
        assert_eq!(resolved.columns, vec!["b", "a", "c"]);
        assert_eq!(resolved.duplicates, vec!["b", "a"]);
    }

    #[test]
    fn test_rows_to_csv_escaping() {
        let columns = vec!["id".to_string(), "note".to_string(), "tags".to_string()];
        let rows = vec![
            row(json!({"id": 1, "note": "He said \"hi\", ok", "tags": ["x", "y"]})),
            row(json!({"id": 2, "note": null})),
        ];

        let csv = String::from_utf8(rows_to_csv(&columns, &rows).unwrap()).unwrap();
        assert_eq!(csv, "id,note,tags\n1,\"He said \"\"hi\"\", ok\",x; y\n2,,\n");
    }

    #[test]
    fn test_generic_column_detection() {
        assert!(is_generic_column_name("column0"));
        assert!(is_generic_column_name("COLUMN12"));
        assert!(!is_generic_column_name("column_a"));
        assert!(!is_generic_column_name("id"));
    }

    #[test]
    fn test_explicit_table_sql() {
        let sql = explicit_varchar_table_sql("t", &["a".to_string(), "b c".to_string()]);
        assert_eq!(sql, "CREATE TABLE \"t\" (\"a\" VARCHAR, \"b c\" VARCHAR)");
    }
}

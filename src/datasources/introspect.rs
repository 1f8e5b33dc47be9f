//! Engine table introspection: existence probes and schema lookups

use crate::datasources::SchemaColumn;
use crate::engine::{quote_ident, quote_literal, AnalyticsEngine, CellValue, EngineResult};
use crate::error::Result;

/// Cheap existence probe against the engine catalog
pub async fn table_exists(engine: &dyn AnalyticsEngine, table_name: &str) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM information_schema.tables WHERE lower(table_name) = lower({}) LIMIT 1",
        quote_literal(table_name)
    );
    let result = engine.query(&sql).await?;
    Ok(!result.rows.is_empty())
}

/// Columns of a table from `information_schema.columns`, in ordinal order
pub async fn table_columns(engine: &dyn AnalyticsEngine, table_name: &str) -> Result<Vec<SchemaColumn>> {
    let sql = format!(
        "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
         WHERE lower(table_name) = lower({}) ORDER BY ordinal_position",
        quote_literal(table_name)
    );
    let result = engine.query(&sql).await?;
    Ok(schema_from_rows(&result, "column_name", "data_type", "is_nullable"))
}

/// Columns of a table via `DESCRIBE`
pub async fn describe_table(engine: &dyn AnalyticsEngine, table_name: &str) -> Result<Vec<SchemaColumn>> {
    let result = engine.query(&format!("DESCRIBE {}", quote_ident(table_name))).await?;
    Ok(schema_from_rows(&result, "column_name", "column_type", "null"))
}

fn schema_from_rows(result: &EngineResult, name_col: &str, type_col: &str, null_col: &str) -> Vec<SchemaColumn> {
    let (Some(name_idx), Some(type_idx)) = (result.column_index(name_col), result.column_index(type_col)) else {
        return Vec::new();
    };
    let null_idx = result.column_index(null_col);

    result
        .rows
        .iter()
        .filter_map(|row| {
            let name = row.get(name_idx)?.as_str()?.to_string();
            let data_type = row
                .get(type_idx)
                .map(|v| v.to_string())
                .unwrap_or_default();
            let nullable = match null_idx.and_then(|idx| row.get(idx)) {
                Some(CellValue::Text(flag)) => !flag.eq_ignore_ascii_case("NO"),
                Some(CellValue::Boolean(flag)) => *flag,
                _ => true,
            };
            Some(SchemaColumn { name, data_type, nullable })
        })
        .collect()
}

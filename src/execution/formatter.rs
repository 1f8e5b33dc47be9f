//! SQL formatting

use crate::error::{Result, WorkbenchError};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;

pub trait SqlFormatter: Send + Sync {
    fn format(&self, sql: &str) -> Result<String>;
}

/// Re-renders statements through `sqlparser` with the DuckDB dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlParserFormatter;

impl SqlFormatter for SqlParserFormatter {
    fn format(&self, sql: &str) -> Result<String> {
        if sql.trim().is_empty() {
            return Ok(String::new());
        }

        let statements = Parser::parse_sql(&DuckDbDialect {}, sql)
            .map_err(|e| WorkbenchError::Format(e.to_string()))?;

        Ok(statements
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(";\n"))
    }
}

//! Insights - named query templates run against a chosen data source

use crate::datasources::{DataSource, SourceKind};
use crate::error::Result;
use regex::{NoExpand, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Table name used by the built-in templates
pub const PLACEHOLDER_TABLE: &str = "source_table";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightRenderer {
    #[default]
    Table,
    BarChart,
    LineChart,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsQuery {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: String,
    /// Table names in `query` that are replaced by the invoking source's table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tables: Option<Vec<String>>,
    /// Source kinds this insight is offered for; all when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_categories: Option<Vec<SourceKind>>,
    #[serde(default)]
    pub renderer: InsightRenderer,
}

impl InsightsQuery {
    pub fn applies_to(&self, source: &DataSource) -> bool {
        match &self.target_categories {
            Some(kinds) if !kinds.is_empty() => kinds.contains(&source.kind),
            _ => true,
        }
    }

    /// The template with its target tables replaced by `table_name`
    pub fn render_for(&self, table_name: &str) -> String {
        let targets = self.target_tables.as_deref().unwrap_or_default();
        substitute_tables(&self.query, targets, table_name)
    }
}

/// Replace whole-word, case-insensitive occurrences of each target with `table_name`
///
/// Purely textual: string literals and comments are not skipped.
pub fn substitute_tables(template: &str, targets: &[String], table_name: &str) -> String {
    targets
        .iter()
        .filter(|t| !t.is_empty())
        .fold(template.to_string(), |sql, target| {
            let pattern = format!(r"\b{}\b", regex::escape(target));
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(re) => re.replace_all(&sql, NoExpand(table_name)).into_owned(),
                Err(_) => sql,
            }
        })
}

fn builtin(id: &str, name: &str, description: &str, query: &str, renderer: InsightRenderer) -> InsightsQuery {
    InsightsQuery {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        query: query.to_string(),
        target_tables: Some(vec![PLACEHOLDER_TABLE.to_string()]),
        target_categories: None,
        renderer,
    }
}

/// Templates offered for every data source
pub fn builtin_insights() -> Vec<InsightsQuery> {
    vec![
        builtin(
            "row_count",
            "Row count",
            "Number of rows in the table",
            "SELECT COUNT(*) AS row_count FROM source_table",
            InsightRenderer::Summary,
        ),
        builtin(
            "column_summary",
            "Column summary",
            "Per-column statistics: min, max, distinct values, null percentage",
            "SUMMARIZE source_table",
            InsightRenderer::Table,
        ),
        builtin(
            "preview",
            "Preview",
            "First ten rows",
            "SELECT * FROM source_table LIMIT 10",
            InsightRenderer::Table,
        ),
    ]
}

/// Parse a JSON array of insight definitions
pub fn insights_from_json(json: &str) -> Result<Vec<InsightsQuery>> {
    Ok(serde_json::from_str(json)?)
}

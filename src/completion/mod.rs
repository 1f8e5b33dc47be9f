//! Completion Context Provider
//!
//! Suggests keywords, functions, tables and columns from a snapshot of the
//! registry schemas. The provider is immutable; build a new one whenever the
//! loaded schemas change.

pub mod context;
pub mod keywords;

pub use context::{RegexContextDetector, TableContext, TableContextDetector};

use crate::datasources::SchemaColumn;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use strsim::jaro_winkler;

const PREVIEW_COLUMNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    QualifiedColumn,
    Column,
    Table,
    Keyword,
    Function,
}

impl CompletionKind {
    fn rank(&self) -> u8 {
        match self {
            CompletionKind::QualifiedColumn => 0,
            CompletionKind::Column => 1,
            CompletionKind::Table => 2,
            CompletionKind::Keyword => 3,
            CompletionKind::Function => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Similarity to the typed prefix, 0..=1
    pub score: f64,
}

#[derive(Debug, Clone)]
struct TableSchema {
    name: String,
    columns: Vec<SchemaColumn>,
}

/// Word being typed at the cursor, and its `qualifier.` if any
#[derive(Debug, Clone, PartialEq, Eq)]
struct CursorWord<'a> {
    partial: &'a str,
    qualifier: Option<&'a str>,
    before: &'a str,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn cursor_word(text: &str, cursor: usize) -> CursorWord<'_> {
    let mut cursor = cursor.min(text.len());
    while !text.is_char_boundary(cursor) {
        cursor -= 1;
    }
    let before = &text[..cursor];

    let partial_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(cursor);
    let partial = &before[partial_start..];

    let qualifier = before[..partial_start].strip_suffix('.').and_then(|head| {
        let start = head
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_ident_char(*c))
            .last()
            .map(|(i, _)| i)?;
        Some(&head[start..])
    });

    CursorWord {
        partial,
        qualifier,
        before,
    }
}

pub struct CompletionProvider {
    tables: Vec<TableSchema>,
    detector: Arc<dyn TableContextDetector>,
}

impl CompletionProvider {
    pub fn new(schemas: Vec<(String, Vec<SchemaColumn>)>) -> Self {
        Self::with_detector(schemas, Arc::new(RegexContextDetector))
    }

    pub fn with_detector(schemas: Vec<(String, Vec<SchemaColumn>)>, detector: Arc<dyn TableContextDetector>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|(name, columns)| TableSchema { name, columns })
            .collect();
        Self { tables, detector }
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Ranked suggestions for the word under `cursor` (a byte offset)
    pub fn complete(&self, text: &str, cursor: usize) -> Vec<CompletionItem> {
        let word = cursor_word(text, cursor);
        let context = self.detector.detect(word.before);

        let candidates = match word.qualifier {
            Some(qualifier) => self.qualified_columns(context.resolve(qualifier)),
            None => self.unqualified(&context),
        };

        let prefix = word.partial.to_lowercase();
        let mut items: Vec<CompletionItem> = candidates
            .into_iter()
            .filter(|item| item.label.to_lowercase().starts_with(&prefix))
            .map(|mut item| {
                item.score = if prefix.is_empty() {
                    0.0
                } else {
                    jaro_winkler(&prefix, &item.label.to_lowercase())
                };
                item
            })
            .collect();

        items.sort_by(|a, b| {
            a.kind
                .rank()
                .cmp(&b.kind.rank())
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                .then_with(|| a.label.cmp(&b.label))
        });
        items
    }

    fn qualified_columns(&self, table: &str) -> Vec<CompletionItem> {
        let Some(schema) = self.table(table) else {
            return Vec::new();
        };
        schema
            .columns
            .iter()
            .map(|c| column_item(c, &schema.name, CompletionKind::QualifiedColumn))
            .collect()
    }

    fn unqualified(&self, context: &TableContext) -> Vec<CompletionItem> {
        let in_context: Vec<&TableSchema> = context
            .tables
            .iter()
            .filter_map(|name| self.table(name))
            .collect();
        // Unknown names in FROM do not narrow the column list
        let column_sources: Vec<&TableSchema> = if in_context.is_empty() {
            self.tables.iter().collect()
        } else {
            in_context
        };

        let mut seen = HashSet::new();
        let mut items: Vec<CompletionItem> = column_sources
            .iter()
            .flat_map(|t| t.columns.iter().map(move |c| (t, c)))
            .filter(|(_, c)| seen.insert(c.name.to_lowercase()))
            .map(|(t, c)| column_item(c, &t.name, CompletionKind::Column))
            .collect();

        items.extend(self.tables.iter().map(|t| CompletionItem {
            label: t.name.clone(),
            kind: CompletionKind::Table,
            detail: Some(table_detail(t)),
            score: 0.0,
        }));
        items.extend(
            context
                .ctes
                .iter()
                .filter(|cte| self.table(cte).is_none())
                .map(|cte| CompletionItem {
                    label: cte.clone(),
                    kind: CompletionKind::Table,
                    detail: Some("CTE".to_string()),
                    score: 0.0,
                }),
        );
        items.extend(keywords::KEYWORDS.iter().map(|k| static_item(k, CompletionKind::Keyword)));
        items.extend(keywords::FUNCTIONS.iter().map(|f| static_item(f, CompletionKind::Function)));
        items
    }
}

fn column_item(column: &SchemaColumn, table: &str, kind: CompletionKind) -> CompletionItem {
    CompletionItem {
        label: column.name.clone(),
        kind,
        detail: Some(format!("{} ({})", table, column.data_type)),
        score: 0.0,
    }
}

fn static_item(label: &str, kind: CompletionKind) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind,
        detail: None,
        score: 0.0,
    }
}

/// `"3 columns: id, name, email"`, preview truncated with an ellipsis
fn table_detail(table: &TableSchema) -> String {
    let preview = table
        .columns
        .iter()
        .take(PREVIEW_COLUMNS)
        .map(|c| c.name.as_str())
        .join(", ");
    let more = if table.columns.len() > PREVIEW_COLUMNS { ", ..." } else { "" };
    format!("{} columns: {}{}", table.columns.len(), preview, more)
}

//! Table context detection for completion
//!
//! Finds which tables the text before the cursor refers to, and which
//! aliases point at them. Regex based: good enough for interactive
//! suggestions, not a SQL parser.

use crate::completion::keywords::is_non_alias_word;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref TABLE_REF: Regex =
        Regex::new(r"(?i)\b(?:FROM|JOIN|INTO|UPDATE)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex");
    static ref ALIAS: Regex = Regex::new(r"^\s+(?i:AS\s+)?([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex");
    static ref CTE: Regex =
        Regex::new(r"(?i)(?:\bWITH(?:\s+RECURSIVE)?\s+|,\s*)([A-Za-z_][A-Za-z0-9_]*)\s+AS\s*\(").expect("valid regex");
}

/// Tables referenced before the cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableContext {
    /// Referenced tables in order of appearance, without repeats
    pub tables: Vec<String>,
    /// Lower-cased alias to table name
    pub aliases: HashMap<String, String>,
    /// Names defined by `WITH <name> AS (`
    pub ctes: Vec<String>,
}

impl TableContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.ctes.is_empty()
    }

    /// Table a qualifier refers to: an alias, else the name itself
    pub fn resolve<'a>(&'a self, qualifier: &'a str) -> &'a str {
        self.aliases
            .get(&qualifier.to_lowercase())
            .map(|t| t.as_str())
            .unwrap_or(qualifier)
    }

    fn add_table(&mut self, table: &str) {
        if !self.tables.iter().any(|t| t.eq_ignore_ascii_case(table)) {
            self.tables.push(table.to_string());
        }
    }
}

pub trait TableContextDetector: Send + Sync {
    fn detect(&self, text_before_cursor: &str) -> TableContext;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegexContextDetector;

impl TableContextDetector for RegexContextDetector {
    fn detect(&self, text: &str) -> TableContext {
        let mut context = TableContext::default();

        for caps in CTE.captures_iter(text) {
            let name = caps[1].to_string();
            if !context.ctes.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
                context.ctes.push(name);
            }
        }

        for caps in TABLE_REF.captures_iter(text) {
            let Some(table) = caps.get(1) else { continue };
            context.add_table(table.as_str());

            let alias = ALIAS
                .captures(&text[table.end()..])
                .and_then(|a| a.get(1))
                .map(|a| a.as_str())
                .filter(|a| !is_non_alias_word(a));
            if let Some(alias) = alias {
                context
                    .aliases
                    .insert(alias.to_lowercase(), table.as_str().to_string());
            }
        }

        context
    }
}

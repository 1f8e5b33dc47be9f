//! Error Classifier
//!
//! Turns engine failures into a displayable [`SqlError`] by sniffing the
//! message for keywords and pulling line/column from DuckDB's
//! `LINE n:` excerpt and caret marker.

use crate::error::WorkbenchError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LINE_MARKER: Regex = Regex::new(r"(?m)^(LINE (\d+): )").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlErrorKind {
    Syntax,
    Runtime,
    Connection,
    Memory,
}

impl fmt::Display for SqlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlErrorKind::Syntax => write!(f, "syntax"),
            SqlErrorKind::Runtime => write!(f, "runtime"),
            SqlErrorKind::Connection => write!(f, "connection"),
            SqlErrorKind::Memory => write!(f, "memory"),
        }
    }
}

/// A query failure as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlError {
    #[serde(rename = "type")]
    pub kind: SqlErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, " (line {}, column {})", line, column)?;
        }
        Ok(())
    }
}

/// Classify a raw engine message
pub fn classify_message(message: &str, statement: Option<&str>) -> SqlError {
    let lower = message.to_lowercase();

    let kind = if lower.contains("syntax") || lower.contains("parser error") {
        SqlErrorKind::Syntax
    } else if lower.contains("memory") {
        SqlErrorKind::Memory
    } else if lower.contains("connection") {
        SqlErrorKind::Connection
    } else {
        SqlErrorKind::Runtime
    };
    let (line, column) = error_position(message);

    SqlError {
        kind,
        message: message.to_string(),
        line,
        column,
        statement: statement.map(|s| s.to_string()),
    }
}

/// Classify a failed execution
pub fn classify_error(error: &WorkbenchError, statement: Option<&str>) -> SqlError {
    match error {
        WorkbenchError::Engine(message) => classify_message(message, statement),
        WorkbenchError::NoConnection => SqlError {
            kind: SqlErrorKind::Connection,
            message: error.to_string(),
            line: None,
            column: None,
            statement: statement.map(|s| s.to_string()),
        },
        other => classify_message(&other.to_string(), statement),
    }
}

/// Line from `LINE n:`, column from the caret under the excerpt (both 1-based)
fn error_position(message: &str) -> (Option<u32>, Option<u32>) {
    let Some(caps) = LINE_MARKER.captures(message) else {
        return (None, None);
    };
    let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
    let Some(prefix) = caps.get(1) else {
        return (line, None);
    };

    let after_excerpt = &message[prefix.end()..];
    let column = after_excerpt
        .lines()
        .nth(1)
        .and_then(|caret_line| caret_line.find('^'))
        .and_then(|idx| idx.checked_sub(prefix.as_str().len()))
        .map(|offset| offset as u32 + 1);

    (line, column)
}

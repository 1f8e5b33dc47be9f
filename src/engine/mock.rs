//! Scripted engine for unit tests
//!
//! Understands just enough of the statements the workbench issues (catalog
//! probes, CREATE/DROP from registered CSV buffers, DESCRIBE) to exercise the
//! ingestion pipeline, and records every call it receives.

use crate::engine::{AnalyticsEngine, CellValue, EngineColumn, EngineResult};
use crate::error::{Result, WorkbenchError};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref CREATE_AS: Regex =
        Regex::new(r#"^CREATE OR REPLACE TABLE "([^"]+)" AS SELECT \* FROM \w+\('([^']+)'"#).unwrap();
    static ref CREATE_COLUMNS: Regex = Regex::new(r#"^CREATE TABLE "([^"]+)" \((.*)\)$"#).unwrap();
    static ref QUOTED_IDENT: Regex = Regex::new(r#""([^"]+)" VARCHAR"#).unwrap();
    static ref DROP_TABLE: Regex = Regex::new(r#"^DROP TABLE IF EXISTS "([^"]+)""#).unwrap();
    static ref LOWER_LITERAL: Regex = Regex::new(r"lower\('([^']+)'\)").unwrap();
    static ref DESCRIBE: Regex = Regex::new(r#"^DESCRIBE "([^"]+)""#).unwrap();
}

#[derive(Default)]
struct MockState {
    tables: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<u8>>,
    calls: Vec<String>,
    failures: Vec<(String, String)>,
    responses: Vec<(String, EngineResult)>,
    positional_headers: bool,
    slow_pattern: Option<String>,
    cancel_fails: bool,
    delays: Vec<(String, Duration)>,
}

pub(crate) struct MockEngine {
    state: Mutex<MockState>,
    interrupted: CancellationToken,
}

fn text_column(name: &str) -> EngineColumn {
    EngineColumn {
        name: name.to_string(),
        type_name: "VARCHAR".to_string(),
        nullable: true,
    }
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            interrupted: CancellationToken::new(),
        }
    }

    pub(crate) fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.add_table(name, columns);
        self
    }

    pub(crate) fn add_table(&self, name: &str, columns: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(name.to_lowercase(), columns.iter().map(|c| c.to_string()).collect());
    }

    /// Fail any statement containing `pattern`
    pub(crate) fn fail_on(self, pattern: &str, message: &str) -> Self {
        self.set_failure(pattern, message);
        self
    }

    pub(crate) fn set_failure(&self, pattern: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((pattern.to_string(), message.to_string()));
    }

    /// Canned result for statements containing `pattern`
    pub(crate) fn respond(self, pattern: &str, result: EngineResult) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((pattern.to_string(), result));
        self
    }

    /// CSV reads ignore the header and name columns positionally
    pub(crate) fn with_positional_headers(self) -> Self {
        self.state.lock().unwrap().positional_headers = true;
        self
    }

    /// Statements containing `pattern` block until `cancel_sent` is called
    pub(crate) fn with_slow_query(self, pattern: &str) -> Self {
        self.state.lock().unwrap().slow_pattern = Some(pattern.to_string());
        self
    }

    /// Statements containing `pattern` take `delay` before running
    pub(crate) fn with_delay_on(self, pattern: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .push((pattern.to_string(), delay));
        self
    }

    pub(crate) fn with_failing_cancel(self) -> Self {
        self.state.lock().unwrap().cancel_fails = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn queries_matching(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    pub(crate) fn registered_files(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub(crate) fn has_table(&self, name: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(&name.to_lowercase())
    }

    pub(crate) fn table_columns(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().unwrap().tables.get(&name.to_lowercase()).cloned()
    }

    fn execute(&self, sql: &str) -> Result<EngineResult> {
        let mut state = self.state.lock().unwrap();

        if let Some((_, message)) = state.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(WorkbenchError::Engine(message.clone()));
        }
        if let Some((_, result)) = state.responses.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Ok(result.clone());
        }

        if sql.contains("information_schema.tables") {
            let table = LOWER_LITERAL.captures(sql).map(|c| c[1].to_lowercase()).unwrap_or_default();
            let rows = if state.tables.contains_key(&table) {
                vec![vec![CellValue::Integer(1)]]
            } else {
                Vec::new()
            };
            return Ok(EngineResult { columns: vec![text_column("1")], rows });
        }

        if sql.contains("information_schema.columns") {
            let table = LOWER_LITERAL.captures(sql).map(|c| c[1].to_lowercase()).unwrap_or_default();
            let rows = state
                .tables
                .get(&table)
                .map(|cols| {
                    cols.iter()
                        .map(|c| vec![text(c), text("VARCHAR"), text("YES")])
                        .collect()
                })
                .unwrap_or_default();
            return Ok(EngineResult {
                columns: vec![text_column("column_name"), text_column("data_type"), text_column("is_nullable")],
                rows,
            });
        }

        if let Some(caps) = DESCRIBE.captures(sql) {
            let table = caps[1].to_lowercase();
            let cols = state
                .tables
                .get(&table)
                .cloned()
                .ok_or_else(|| WorkbenchError::Engine(format!("Catalog Error: Table with name {} does not exist!", table)))?;
            return Ok(EngineResult {
                columns: vec![text_column("column_name"), text_column("column_type"), text_column("null")],
                rows: cols.iter().map(|c| vec![text(c), text("VARCHAR"), text("YES")]).collect(),
            });
        }

        if let Some(caps) = CREATE_AS.captures(sql) {
            let table = caps[1].to_lowercase();
            let file = caps[2].to_string();
            let bytes = state
                .files
                .get(&file)
                .cloned()
                .ok_or_else(|| WorkbenchError::Engine(format!("IO Error: No files found that match the pattern \"{}\"", file)))?;
            let delimiter = if sql.contains("delim = '\t'") { '\t' } else { ',' };
            let header = String::from_utf8_lossy(&bytes)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            let mut columns: Vec<String> = header
                .split(delimiter)
                .map(|c| c.trim_matches('"').to_string())
                .collect();
            if state.positional_headers && sql.contains("read_csv(") {
                columns = (0..columns.len()).map(|i| format!("column{}", i)).collect();
            }
            state.tables.insert(table, columns);
            return Ok(EngineResult::default());
        }

        if let Some(caps) = CREATE_COLUMNS.captures(sql) {
            let table = caps[1].to_lowercase();
            let columns = QUOTED_IDENT
                .captures_iter(&caps[2])
                .map(|c| c[1].to_string())
                .collect();
            state.tables.insert(table, columns);
            return Ok(EngineResult::default());
        }

        if let Some(caps) = DROP_TABLE.captures(sql) {
            state.tables.remove(&caps[1].to_lowercase());
            return Ok(EngineResult::default());
        }

        Ok(EngineResult::default())
    }
}

#[async_trait]
impl AnalyticsEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn query(&self, sql: &str) -> Result<EngineResult> {
        let (slow, delay) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("query: {}", sql));
            let slow = state
                .slow_pattern
                .as_deref()
                .map(|p| sql.contains(p))
                .unwrap_or(false);
            let delay = state
                .delays
                .iter()
                .find(|(p, _)| sql.contains(p.as_str()))
                .map(|(_, d)| *d);
            (slow, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if slow {
            self.interrupted.cancelled().await;
            return Err(WorkbenchError::Engine("INTERRUPT Error: Interrupted!".to_string()));
        }
        self.execute(sql)
    }

    async fn register_file_buffer(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("register: {}", name));
        state.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn drop_file(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("drop_file: {}", name));
        state.files.remove(name);
        Ok(())
    }

    async fn cancel_sent(&self) -> Result<bool> {
        let fails = {
            let mut state = self.state.lock().unwrap();
            state.calls.push("cancel".to_string());
            state.cancel_fails
        };
        self.interrupted.cancel();
        if fails {
            return Err(WorkbenchError::Engine("cancel not supported".to_string()));
        }
        Ok(true)
    }
}

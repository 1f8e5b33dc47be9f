//! DuckDB Analytics Engine
//!
//! In-memory DuckDB connection. Registered file buffers are written into a
//! private scratch directory that is set as DuckDB's `file_search_path`, so
//! `read_csv('people.csv')` resolves against the registered name.

use crate::engine::{quote_literal, AnalyticsEngine, CellValue, EngineColumn, EngineResult};
use crate::error::{Result, WorkbenchError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use duckdb::arrow::datatypes::DataType;
use duckdb::types::{TimeUnit, Value};
use duckdb::{Connection, InterruptHandle};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// DuckDB execution engine
pub struct DuckDbEngine {
    connection: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    scratch_dir: TempDir,
}

impl DuckDbEngine {
    /// Open a fresh in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().map_err(engine_error)?;
        let scratch_dir = tempfile::Builder::new()
            .prefix("sql-workbench-")
            .tempdir()?;

        let search_path = scratch_dir.path().to_string_lossy().to_string();
        connection
            .execute_batch(&format!("SET file_search_path = {}", quote_literal(&search_path)))
            .map_err(engine_error)?;

        let interrupt = connection.interrupt_handle();
        info!(scratch_dir = %search_path, "DuckDB engine ready");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            interrupt,
            scratch_dir,
        })
    }

    fn buffer_path(&self, name: &str) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| WorkbenchError::Engine(format!("Invalid file name: {}", name)))?;
        Ok(self.scratch_dir.path().join(file_name))
    }
}

#[async_trait]
impl AnalyticsEngine for DuckDbEngine {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    async fn query(&self, sql: &str) -> Result<EngineResult> {
        debug!("duckdb query: {}", sql);
        let connection = Arc::clone(&self.connection);
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = connection
                .lock()
                .map_err(|_| WorkbenchError::Engine("DuckDB connection lock poisoned".to_string()))?;
            run_statement(&conn, &sql)
        })
        .await
        .map_err(|e| WorkbenchError::Engine(format!("DuckDB task failed: {}", e)))?
    }

    async fn register_file_buffer(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.buffer_path(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!(file = %name, size = bytes.len(), "registered file buffer");
        Ok(())
    }

    async fn drop_file(&self, name: &str) -> Result<()> {
        let path = self.buffer_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_sent(&self) -> Result<bool> {
        warn!("interrupting running DuckDB statement");
        self.interrupt.interrupt();
        Ok(true)
    }
}

fn engine_error(e: duckdb::Error) -> WorkbenchError {
    WorkbenchError::Engine(e.to_string())
}

/// Arrow type name; enums are reported by their value type
fn type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Dictionary(_, value) => type_name(value),
        other => format!("{:?}", other),
    }
}

fn run_statement(conn: &Connection, sql: &str) -> Result<EngineResult> {
    let mut stmt = conn.prepare(sql).map_err(engine_error)?;
    let mut rows = stmt.query([]).map_err(engine_error)?;

    let columns: Vec<EngineColumn> = match rows.as_ref() {
        Some(executed) => executed
            .column_names()
            .into_iter()
            .enumerate()
            .map(|(idx, name)| EngineColumn {
                name,
                type_name: type_name(&executed.column_type(idx)),
                nullable: true,
            })
            .collect(),
        None => Vec::new(),
    };

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(engine_error)? {
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let value: Value = row.get(idx).map_err(engine_error)?;
            cells.push(to_cell(value));
        }
        out.push(cells);
    }

    Ok(EngineResult { columns, rows: out })
}

fn to_cell(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Boolean(b) => CellValue::Boolean(b),
        Value::TinyInt(i) => CellValue::Integer(i.into()),
        Value::SmallInt(i) => CellValue::Integer(i.into()),
        Value::Int(i) => CellValue::Integer(i.into()),
        Value::BigInt(i) => CellValue::BigInt(i.into()),
        Value::HugeInt(i) => CellValue::BigInt(i),
        Value::UTinyInt(i) => CellValue::Integer(i.into()),
        Value::USmallInt(i) => CellValue::Integer(i.into()),
        Value::UInt(i) => CellValue::Integer(i.into()),
        Value::UBigInt(i) => CellValue::BigInt(i.into()),
        Value::Float(f) => CellValue::Float(f.into()),
        Value::Double(f) => CellValue::Float(f),
        Value::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(CellValue::Float)
                .unwrap_or(CellValue::Text(text))
        }
        Value::Text(s) | Value::Enum(s) => CellValue::Text(s),
        Value::Blob(b) => CellValue::Binary(b),
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days.into())))
            .map(|d| CellValue::Text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(CellValue::Integer(days.into())),
        Value::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| CellValue::Text(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(CellValue::BigInt(raw.into()))
        }
        other => CellValue::Text(format!("{:?}", other)),
    }
}

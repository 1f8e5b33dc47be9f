use anyhow::{bail, Context, Result};
use clap::Parser;
use itertools::Itertools;
use sql_workbench::datasources::{DataSource, FileBlob, LoadingStatus};
use sql_workbench::execution::export::{default_file_name, ExportFormat, ExportSelection};
use sql_workbench::execution::{ExecutionState, QueryResult};
use sql_workbench::llm::OpenAiSqlAssistant;
use sql_workbench::{Workbench, WorkbenchConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_PRINTED_ROWS: usize = 50;

#[derive(Parser)]
#[command(name = "sql-workbench")]
#[command(about = "Load CSV/Parquet/JSON data into an embedded DuckDB and query it")]
struct Args {
    /// JSON array of data source descriptors
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Files to import (csv, tsv, parquet, json, jsonl, ndjson)
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// SQL to run once sources are loaded
    #[arg(short, long)]
    query: Option<String>,

    /// Ask the SQL assistant to write the query
    #[arg(long, conflicts_with = "query")]
    ask: Option<String>,

    /// Pretty-print the query before running it
    #[arg(long)]
    format_sql: bool,

    /// Export the result instead of printing a table
    #[arg(long, value_parser = parse_format)]
    export: Option<ExportFormat>,

    /// Export destination; stdout when omitted
    #[arg(short, long, requires = "export")]
    output: Option<PathBuf>,

    /// Write the export to a generated file name in the current directory
    #[arg(long, requires = "export", conflicts_with = "output")]
    save: bool,

    /// Column indices to export
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<usize>>,

    /// Row indices to export
    #[arg(long, value_delimiter = ',')]
    rows: Option<Vec<usize>>,

    /// Drop tables of sources missing from the manifest
    #[arg(long)]
    auto_cleanup: bool,

    /// Backoff unit between sources, in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Print the query history as JSON on exit
    #[arg(long)]
    history: bool,
}

fn parse_format(s: &str) -> std::result::Result<ExportFormat, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sql_workbench=info")))
        .init();

    let args = Args::parse();

    let mut config = WorkbenchConfig::from_env().context("invalid workbench configuration")?;
    if args.auto_cleanup {
        config.auto_cleanup = true;
    }
    if let Some(ms) = args.backoff_ms {
        config.loader.backoff_base = Duration::from_millis(ms);
    }

    let mut workbench = Workbench::open_duckdb(config.clone()).context("failed to start DuckDB")?;
    if config.llm.api_key.is_some() {
        workbench = workbench.with_assistant(Arc::new(OpenAiSqlAssistant::new(config.llm.clone())?));
    }

    if let Some(path) = &args.manifest {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let desired: Vec<DataSource> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let report = workbench.sync_data_sources(desired).await;
        info!(loaded = report.loaded.len(), failed = report.failed.len(), "manifest loaded");
    }

    for path in &args.files {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        match workbench.import_file(FileBlob::new(name, bytes)).await {
            Ok(source) => info!(table = %source.table_name, "imported {}", path.display()),
            Err(e) => error!("failed to import {}: {}", path.display(), e),
        }
    }

    print_sources(&workbench);

    let sql = match (&args.query, &args.ask) {
        (Some(sql), _) => sql.clone(),
        (None, Some(request)) => {
            let sql = workbench.generate_sql(request).await.context("SQL assistant failed")?;
            println!("-- generated by assistant\n{}\n", sql);
            sql
        }
        (None, None) => return Ok(()),
    };

    workbench.controller().set_query(sql);
    if args.format_sql {
        if workbench.format() {
            println!("{}\n", workbench.controller().query());
        } else if let Some(e) = workbench.controller().format_error() {
            warn!("could not format query: {}", e);
        }
    }

    let state = workbench.run().await;
    if args.history {
        println!("{}", workbench.query_log().to_json()?);
    }

    match state {
        ExecutionState::Completed => {}
        ExecutionState::Error => {
            let error = workbench.controller().error();
            bail!(
                "{}",
                error.map(|e| e.to_string()).unwrap_or_else(|| "query failed".to_string())
            );
        }
        other => bail!("query did not complete ({:?})", other),
    }

    let Some(result) = workbench.controller().result() else {
        return Ok(());
    };

    match args.export {
        Some(format) => {
            let selection = ExportSelection {
                columns: args.columns.clone(),
                rows: args.rows.clone(),
            };
            let path = match (&args.output, args.save) {
                (Some(path), _) => Some(path.clone()),
                (None, true) => Some(PathBuf::from(default_file_name(format))),
                (None, false) => None,
            };
            match path {
                Some(path) => {
                    workbench.export_to_file(format, &selection, &path)?;
                    info!("wrote {}", path.display());
                }
                None => {
                    if let Some(text) = workbench.export(format, &selection)? {
                        println!("{}", text);
                    }
                }
            }
        }
        None => print_result(&result),
    }

    Ok(())
}

fn print_sources(workbench: &Workbench) {
    for source in workbench.registry().snapshot() {
        match &source.status {
            LoadingStatus::Loaded { schema } => {
                let columns = schema.iter().map(|c| format!("{} {}", c.name, c.data_type)).join(", ");
                println!("[loaded] {} ({})", source.table_name, columns);
            }
            LoadingStatus::Failed { error } => println!("[failed] {}: {}", source.table_name, error),
            other => println!("[{:?}] {}", other.tag(), source.table_name),
        }
    }
}

fn print_result(result: &QueryResult) {
    if let Some(count) = result.row_count {
        println!("{} rows affected ({} ms)", count, result.execution_time_ms);
        return;
    }

    let shown: Vec<Vec<String>> = result
        .rows
        .iter()
        .take(MAX_PRINTED_ROWS)
        .map(|row| row.iter().map(|cell| if cell.is_null() { "NULL".to_string() } else { cell.to_string() }).collect())
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            shown
                .iter()
                .filter_map(|r| r.get(i))
                .map(|v| v.chars().count())
                .chain(std::iter::once(col.name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .join(" | ")
    };

    println!("{}", line(result.column_names()));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).join("-+-"));
    for row in &shown {
        println!("{}", line(row.iter().map(|s| s.as_str()).collect()));
    }
    if result.rows.len() > MAX_PRINTED_ROWS {
        println!("... {} more rows", result.rows.len() - MAX_PRINTED_ROWS);
    }
    println!("({} rows, {} ms)", result.rows.len(), result.execution_time_ms);
}

//! File Import - turns a file blob into an engine table
//!
//! Shared by manual imports, drag-and-drop, URL fetches and sources declared
//! with a pre-supplied blob. The format is chosen from the file extension.

use crate::datasources::{
    introspect, table_name_from_filename, DataSource, DataSourceRegistry, FileBlob, LoadingStatus,
    SchemaColumn, SourceKind, TableLocks,
};
use crate::engine::{quote_ident, quote_literal, AnalyticsEngine};
use crate::error::{Result, WorkbenchError};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// `read_csv` call that disables header and type sniffing
pub fn csv_reader_sql(file_name: &str, delimiter: char) -> String {
    format!(
        "read_csv({}, header = true, delim = {}, quote = '\"', sample_size = -1, all_varchar = true)",
        quote_literal(file_name),
        quote_literal(&delimiter.to_string())
    )
}

/// Table function reading `file_name`, chosen by extension
pub fn reader_sql_for(file_name: &str, extension: Option<&str>) -> Result<String> {
    let lit = quote_literal(file_name);
    match extension {
        Some("csv") => Ok(csv_reader_sql(file_name, ',')),
        Some("tsv") => Ok(csv_reader_sql(file_name, '\t')),
        Some("parquet") => Ok(format!("read_parquet({})", lit)),
        Some("json") => Ok(format!("read_json_auto({})", lit)),
        Some("jsonl") | Some("ndjson") => Ok(format!(
            "read_json_auto({}, format = 'newline_delimited')",
            lit
        )),
        _ => Err(WorkbenchError::UnsupportedFileType(file_name.to_string())),
    }
}

/// A table created from a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedTable {
    pub table_name: String,
    pub schema: Vec<SchemaColumn>,
}

#[derive(Clone)]
pub struct FileImporter {
    engine: Arc<dyn AnalyticsEngine>,
    registry: Arc<DataSourceRegistry>,
    locks: TableLocks,
}

impl FileImporter {
    pub fn new(engine: Arc<dyn AnalyticsEngine>, registry: Arc<DataSourceRegistry>, locks: TableLocks) -> Self {
        Self {
            engine,
            registry,
            locks,
        }
    }

    /// Create or replace `table_name` from the file contents
    ///
    /// Touches only the engine; callers decide how the registry is updated
    /// and must hold the table's lock.
    pub async fn materialize(&self, file: &FileBlob, table_name: &str) -> Result<MaterializedTable> {
        let extension = file.extension();
        let reader = reader_sql_for(&file.name, extension.as_deref())?;

        self.engine.register_file_buffer(&file.name, &file.bytes).await?;
        let created = self
            .engine
            .query(&format!(
                "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}",
                quote_ident(table_name),
                reader
            ))
            .await;

        if let Err(e) = self.engine.drop_file(&file.name).await {
            warn!(file = %file.name, "failed to drop imported file buffer: {}", e);
        }
        created?;

        let schema = introspect::describe_table(self.engine.as_ref(), table_name).await?;
        info!(table = %table_name, columns = schema.len(), "imported {}", file.name);

        Ok(MaterializedTable {
            table_name: table_name.to_string(),
            schema,
        })
    }

    /// Import a file and record it in the registry
    ///
    /// With `existing_id` the source with that id is updated in place. Without
    /// it, a source already owning the derived table name is reused; otherwise
    /// a new source is created.
    pub async fn import(&self, file: FileBlob, existing_id: Option<&str>) -> Result<DataSource> {
        let existing = match existing_id {
            Some(id) => Some(
                self.registry
                    .get(id)
                    .ok_or_else(|| WorkbenchError::NotFound(id.to_string()))?,
            ),
            None => self.registry.find_by_table(&table_name_from_filename(&file.name)),
        };
        let table_name = existing
            .as_ref()
            .map(|s| s.table_name.clone())
            .unwrap_or_else(|| table_name_from_filename(&file.name));

        let table = {
            let _guard = self.locks.acquire(&table_name).await;
            self.materialize(&file, &table_name).await?
        };
        let metadata = file.metadata();

        let source = match existing {
            Some(existing) => self
                .registry
                .update(&existing.id, |source| {
                    source.file = Some(metadata);
                    source.status = LoadingStatus::Loaded { schema: table.schema };
                })
                .ok_or_else(|| WorkbenchError::NotFound(existing.id.clone()))?,
            None => {
                let mut source = DataSource::existing(table.table_name)
                    .with_id(Uuid::new_v4().to_string())
                    .with_name(file.name.clone())
                    .with_status(LoadingStatus::Loaded { schema: table.schema });
                source.kind = SourceKind::File;
                source.file = Some(metadata);
                self.registry.upsert(source.clone());
                source
            }
        };

        Ok(source)
    }
}

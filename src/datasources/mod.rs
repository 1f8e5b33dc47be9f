//! Data Sources - declared tabular inputs and their loading state
//!
//! A data source is materialized into one engine table. Where the rows come
//! from is decided by [`DataSource::origin`], checked in priority order:
//! inline rows, then URL, then an in-memory file blob, and finally an
//! already-existing table.

pub mod fetch;
pub mod import;
pub mod inline;
pub mod introspect;
pub mod loader;
pub mod locks;
pub mod registry;

pub use fetch::{FetchedFile, HttpFetcher, UrlFetcher};
pub use import::{FileImporter, MaterializedTable};
pub use loader::{DataSourceLoader, LoadReport};
pub use locks::TableLocks;
pub use registry::{DataSourceRegistry, RegistryEvent};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Row object of an inline data source
pub type Row = Map<String, Value>;

/// Provenance classification of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Table,
    View,
    File,
    Url,
}

/// One column of an introspected table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    /// Engine type name, e.g. "VARCHAR"
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Provenance metadata of a file-backed source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// In-memory file contents
#[derive(Clone)]
pub struct FileBlob {
    pub name: String,
    pub bytes: Arc<Vec<u8>>,
    pub mime_type: Option<String>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            name: self.name.clone(),
            size: self.bytes.len() as u64,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Lower-cased extension, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

impl fmt::Debug for FileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBlob")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Loading state of a data source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadingStatus {
    #[default]
    Idle,
    Loading,
    Loaded { schema: Vec<SchemaColumn> },
    Failed { error: String },
    /// Declared loaded by the caller, not yet confirmed against the engine
    VerificationNeeded,
}

impl LoadingStatus {
    pub fn tag(&self) -> StatusTag {
        match self {
            LoadingStatus::Idle => StatusTag::Idle,
            LoadingStatus::Loading => StatusTag::Loading,
            LoadingStatus::Loaded { .. } => StatusTag::Loaded,
            LoadingStatus::Failed { .. } => StatusTag::Failed,
            LoadingStatus::VerificationNeeded => StatusTag::VerificationNeeded,
        }
    }
}

/// Payload-free view of [`LoadingStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    Idle,
    Loading,
    Loaded,
    Failed,
    VerificationNeeded,
}

/// Where a source's rows come from
#[derive(Debug, Clone, Copy)]
pub enum Origin<'a> {
    Inline {
        rows: &'a [Row],
        column_order: Option<&'a [String]>,
    },
    Url(&'a str),
    File(&'a FileBlob),
    Existing,
}

/// A declared or discovered tabular input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "DataSourceDescriptor", into = "DataSourceDescriptor")]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub table_name: String,
    pub data: Option<Vec<Row>>,
    pub url: Option<String>,
    pub file_data: Option<FileBlob>,
    pub column_order: Option<Vec<String>>,
    pub status: LoadingStatus,
    pub file: Option<FileMetadata>,
    pub created_at: DateTime<Utc>,
}

impl DataSource {
    fn blank(name: String, kind: SourceKind, table_name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            kind,
            table_name,
            data: None,
            url: None,
            file_data: None,
            column_order: None,
            status: LoadingStatus::Idle,
            file: None,
            created_at: Utc::now(),
        }
    }

    /// Source backed by inline row objects
    pub fn from_rows(table_name: impl Into<String>, rows: Vec<Row>) -> Self {
        let table_name = table_name.into();
        let mut source = Self::blank(table_name.clone(), SourceKind::Table, table_name);
        source.data = Some(rows);
        source
    }

    /// Source fetched from a remote URL
    pub fn from_url(table_name: impl Into<String>, url: impl Into<String>) -> Self {
        let table_name = table_name.into();
        let mut source = Self::blank(table_name.clone(), SourceKind::Url, table_name);
        source.url = Some(url.into());
        source
    }

    /// Source backed by an in-memory file
    pub fn from_file(file: FileBlob) -> Self {
        let table_name = table_name_from_filename(&file.name);
        let mut source = Self::blank(file.name.clone(), SourceKind::File, table_name);
        source.file = Some(file.metadata());
        source.file_data = Some(file);
        source
    }

    /// Source whose table is expected to exist in the engine already
    pub fn existing(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self::blank(table_name.clone(), SourceKind::Table, table_name)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_column_order(mut self, columns: Vec<String>) -> Self {
        self.column_order = Some(columns);
        self
    }

    pub fn with_status(mut self, status: LoadingStatus) -> Self {
        self.status = status;
        self
    }

    pub fn origin(&self) -> Origin<'_> {
        if let Some(rows) = self.data.as_deref().filter(|rows| !rows.is_empty()) {
            return Origin::Inline {
                rows,
                column_order: self.column_order.as_deref(),
            };
        }
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Origin::Url(url);
        }
        if let Some(file) = self.file_data.as_ref() {
            return Origin::File(file);
        }
        Origin::Existing
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.status, LoadingStatus::Loaded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LoadingStatus::Failed { .. })
    }

    pub fn schema(&self) -> Option<&[SchemaColumn]> {
        match &self.status {
            LoadingStatus::Loaded { schema } => Some(schema),
            _ => None,
        }
    }

    pub fn loading_error(&self) -> Option<&str> {
        match &self.status {
            LoadingStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Derive a valid unquoted SQL identifier from a file name
///
/// `"Sales Q1.csv"` -> `"Sales_Q1"`, `"2024.parquet"` -> `"t_2024"`
pub fn table_name_from_filename(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base.as_str(),
    };

    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if name.is_empty() {
        name = "table".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "t_");
    }
    name
}

/// Wire form of a data source as supplied by callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceDescriptor {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(rename = "type", default)]
    kind: SourceKind,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<Vec<SchemaColumn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    loading_status: Option<StatusTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    loading_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<FileMetadata>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<DataSourceDescriptor> for DataSource {
    fn from(d: DataSourceDescriptor) -> Self {
        let table_name = d.table_name.unwrap_or_else(|| {
            let source_name = d.file.as_ref().map(|f| f.name.as_str()).unwrap_or(&d.name);
            table_name_from_filename(source_name)
        });
        let status = match d.loading_status {
            None | Some(StatusTag::Idle) => LoadingStatus::Idle,
            Some(StatusTag::Loading) => LoadingStatus::Loading,
            Some(StatusTag::Loaded) => LoadingStatus::Loaded {
                schema: d.schema.unwrap_or_default(),
            },
            Some(StatusTag::Failed) => LoadingStatus::Failed {
                error: d.loading_error.unwrap_or_else(|| "Unknown error".to_string()),
            },
            Some(StatusTag::VerificationNeeded) => LoadingStatus::VerificationNeeded,
        };

        Self {
            id: d.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: d.name,
            kind: d.kind,
            table_name,
            data: d.data,
            url: d.url,
            file_data: None,
            column_order: d.column_order,
            status,
            file: d.file,
            created_at: d.created_at.unwrap_or_else(Utc::now),
        }
    }
}

impl From<DataSource> for DataSourceDescriptor {
    fn from(s: DataSource) -> Self {
        let loading_status = Some(s.status.tag());
        let (schema, loading_error) = match s.status {
            LoadingStatus::Loaded { schema } => (Some(schema), None),
            LoadingStatus::Failed { error } => (None, Some(error)),
            _ => (None, None),
        };

        Self {
            id: Some(s.id),
            name: s.name,
            kind: s.kind,
            table_name: Some(s.table_name),
            data: s.data,
            url: s.url,
            column_order: s.column_order,
            schema,
            loading_status,
            loading_error,
            file: s.file,
            created_at: Some(s.created_at),
        }
    }
}

pub mod completion;
pub mod config;
pub mod datasources;
pub mod engine;
pub mod error;
pub mod execution;
pub mod insights;
pub mod llm;
pub mod workbench;

pub use config::{LoaderConfig, WorkbenchConfig};
pub use datasources::{DataSource, FileBlob, LoadingStatus, SchemaColumn};
pub use engine::{AnalyticsEngine, CellValue, EngineResult};
pub use error::{Result, WorkbenchError};
pub use execution::{ExecutionState, QueryResult, SqlError};
pub use workbench::Workbench;

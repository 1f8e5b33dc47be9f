//! Query execution: state machine, result shaping, error classification, export

pub mod controller;
pub mod error_classifier;
pub mod export;
pub mod formatter;
pub mod query_log;
pub mod result;
pub mod types;

pub use controller::{ExecutionState, QueryController};
pub use error_classifier::{classify_error, SqlError, SqlErrorKind};
pub use export::{ExportFormat, ExportSelection};
pub use formatter::{SqlFormatter, SqlParserFormatter};
pub use query_log::{QueryLog, QueryLogEntry, QueryOutcome};
pub use result::{QueryColumn, QueryResult};
pub use types::{normalize_type, SemanticType};

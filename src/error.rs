use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Data source load error: {0}")]
    DataSourceLoad(String),

    #[error("Failed to fetch {url}: HTTP {status}")]
    Fetch { url: String, status: u16 },

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Data source not found: {0}")]
    NotFound(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No engine connection available")]
    NoConnection,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;

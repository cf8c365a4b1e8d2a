use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: status {status} from {url}")]
    Api { status: u16, url: String },

    #[error("HTML extraction failed: {0}")]
    Html(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// Unexpected fault inside a transform stage. The orchestrator substitutes
/// the pre-stage record set when a stage returns one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("column '{column}' holds a {found} value where a number is required")]
    TypeMismatch { column: String, found: &'static str },

    #[error("record {row} has column '{column}' which is not part of the record set")]
    Shape { row: usize, column: String },

    #[error("{0}")]
    Internal(String),
}

//! Error types for the data pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuantError {
    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("no daily archive published for {symbol} on {date}")]
    ArchiveMissing {
        symbol: String,
        date: chrono::NaiveDate,
    },

    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("schema mismatch in {path}: missing column {column}")]
    Schema { path: String, column: &'static str },
}

pub type Result<T> = std::result::Result<T, QuantError>;

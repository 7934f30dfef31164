use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::category::Category;

/// Error type shared by every pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no empresas/socios archives found at {endpoint}")]
    NoCandidates { endpoint: String },
    #[error("no archive could be downloaded")]
    NothingDownloaded,
    #[error("discovery report {0:?} has no selection; run `discover` first")]
    MissingSelection(PathBuf),
    #[error("{category} archive {path:?} is not a readable zip: {source}")]
    Archive {
        category: Category,
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("table {table} does not match the expected schema: {details}")]
    SchemaMismatch { table: String, details: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        PipelineError::Http {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn schema(table: &str, details: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.to_string(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

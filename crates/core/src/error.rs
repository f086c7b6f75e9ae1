use crate::ingest::SkippedPdf;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("no extractable text in {0}")]
    EmptyDocument(String),

    #[error("no chunks left after filtering; nothing to index")]
    NoChunks,

    #[error("every input file failed to load ({} files)", .0.len())]
    AllFilesFailed(Vec<SkippedPdf>),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index not found at {0}; ingest documents first")]
    NotFound(PathBuf),

    #[error("another ingestion is in progress for {0}")]
    Busy(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index is incompatible with the configured embedder: {0}")]
    Incompatible(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {provider}: {details}")]
    BackendResponse { provider: String, details: String },

    #[error("malformed payload from {provider}: {details}")]
    Malformed { provider: String, details: String },

    #[error("embedding dimension {actual} != expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<ProviderError> for SearchError {
    fn from(value: ProviderError) -> Self {
        SearchError::Index(IndexError::Provider(value))
    }
}

#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

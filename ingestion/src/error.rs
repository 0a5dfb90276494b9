use ragserver_core::error::{ErrorCode, RagServerError};
use ragserver_core::metadata::MetadataError;
use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("network error: {0}")]
    Network(String),
    #[error("content extraction failed: {0}")]
    Extraction(String),
    #[error("unsupported source: {0}")]
    Unsupported(String),
}

impl RagServerError for IngestError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IngestError::Io(_) => ErrorCode::Io,
            IngestError::Metadata(e) => e.error_code(),
            IngestError::Store(e) => e.error_code(),
            IngestError::Network(_) => ErrorCode::Network,
            IngestError::Extraction(_) | IngestError::Unsupported(_) => ErrorCode::Ingest,
        }
    }
}

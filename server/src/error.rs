//! One error type the facade's methods return, wrapping every component
//! error it can surface plus the few failures that are this crate's own
//! (an unparsable reload target/name, a missing multimodal embedder).

use embed::EmbedError;
use query::RetrieveError;
use ragserver_core::config::SettingsError;
use ragserver_core::error::{ErrorCode, RagServerError};
use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ingest(#[from] ingestion::IngestError),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown reload target: {0}")]
    UnknownReloadTarget(String),
    #[error("unknown provider name for this target: {0}")]
    InvalidReloadName(String),
    #[error("no multimodal embedder is configured")]
    NoMultimodalEmbedder,
}

impl RagServerError for ServerError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Settings(e) => e.error_code(),
            ServerError::Embed(e) => e.error_code(),
            ServerError::Store(e) => e.error_code(),
            ServerError::Ingest(e) => e.error_code(),
            ServerError::Retrieve(e) => e.error_code(),
            ServerError::Io(_) => ErrorCode::Io,
            ServerError::UnknownReloadTarget(_) | ServerError::InvalidReloadName(_) => {
                ErrorCode::Config
            }
            ServerError::NoMultimodalEmbedder => ErrorCode::Config,
        }
    }
}

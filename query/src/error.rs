use ragserver_core::error::{ErrorCode, RagServerError};
use rerank::RerankError;
use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rerank(#[from] RerankError),
}

impl RagServerError for RetrieveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RetrieveError::Store(e) => e.error_code(),
            RetrieveError::Rerank(e) => e.error_code(),
        }
    }
}

//! Cross-encoder reranking: given a query and a list of candidate document
//! texts, returns a subset reordered by model-assigned relevance,
//! descending. Operates on plain text + index so callers (the retriever)
//! stay in charge of what a "document" means to them.

pub mod cohere;
pub mod factory;
pub mod local_hf;

use async_trait::async_trait;
use ragserver_core::error::{ErrorCode, RagServerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RerankError {
    #[error("rerank request failed: {0}")]
    Request(String),
    #[error("failed to decode rerank response: {0}")]
    Decode(String),
}

impl RagServerError for RerankError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Rerank
    }
}

/// One reranked result: the index into the caller's original `documents`
/// slice, and the model-assigned relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedIndex {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Reranks `documents` against `query`, returning at most `topk`
    /// results ordered by descending relevance. Failures are logged by
    /// the implementation and raised as `RerankError` (unlike embedders,
    /// rerank failures are not swallowed: a caller that can't rerank
    /// needs to know so it can fall back to unreranked order).
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        topk: usize,
    ) -> Result<Vec<RankedIndex>, RerankError>;
}

pub use factory::build_reranker;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_index_equality() {
        let a = RankedIndex { index: 1, score: 0.9 };
        let b = RankedIndex { index: 1, score: 0.9 };
        assert_eq!(a, b);
    }
}

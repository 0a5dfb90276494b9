//! Reranker over Cohere's `rerank` API.

use crate::{RankedIndex, RerankError, Reranker};
use async_trait::async_trait;
use ragserver_core::cool_down;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

pub struct CohereReranker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    rate_limit_per_sec: f64,
}

impl CohereReranker {
    pub fn new(api_key: String, model: String, base_url: Option<String>, rate_limit_per_sec: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
            rate_limit_per_sec,
        }
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        topk: usize,
    ) -> Result<Vec<RankedIndex>, RerankError> {
        if documents.is_empty() || topk == 0 {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: topk.min(documents.len()),
        };

        let result = self
            .client
            .post(format!("{}/v2/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        cool_down(self.rate_limit_per_sec).await;

        let response = result.map_err(|e| RerankError::Request(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| RerankError::Request(e.to_string()))?;
        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::Decode(e.to_string()))?;

        let mut results: Vec<RankedIndex> = parsed
            .results
            .into_iter()
            .filter(|r| r.index < documents.len())
            .map(|r| RankedIndex {
                index: r.index,
                score: r.relevance_score,
            })
            .collect();

        results.truncate(topk);
        Ok(results)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultItem>,
}

#[derive(Deserialize)]
struct RerankResultItem {
    index: usize,
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rerank_decodes_and_truncates() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/rerank")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"index":1,"relevance_score":0.95},{"index":0,"relevance_score":0.2}]}"#)
            .create_async()
            .await;

        let reranker = CohereReranker::new(
            "key".to_string(),
            "rerank-v3".to_string(),
            Some(server.url()),
            1000.0,
        );
        let docs = vec!["alpha".to_string(), "beta".to_string()];

        let out = reranker.rerank("q", &docs, 1).await.unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index, 1);
    }

    #[tokio::test]
    async fn rerank_empty_documents_short_circuits() {
        let server = mockito::Server::new_async().await;
        let reranker = CohereReranker::new(
            "key".to_string(),
            "rerank-v3".to_string(),
            Some(server.url()),
            1000.0,
        );
        assert!(reranker.rerank("q", &[], 5).await.unwrap().is_empty());
    }
}

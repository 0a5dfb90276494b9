//! Reranker over a local cross-encoder HTTP server: `{model, query,
//! documents, topk}` in, `{results: [{index, score, document}]}` out,
//! scores in `[0, 1]`.

use crate::{RankedIndex, RerankError, Reranker};
use async_trait::async_trait;
use ragserver_core::cool_down;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub struct LocalHfReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    rate_limit_per_sec: f64,
}

impl LocalHfReranker {
    pub fn new(base_url: String, model: String, rate_limit_per_sec: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            rate_limit_per_sec,
        }
    }
}

#[async_trait]
impl Reranker for LocalHfReranker {
    fn name(&self) -> &str {
        "local-hf"
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

        // Step 1: drop empty documents, remembering the filtered -> input mapping.
        let mut filtered_docs = Vec::with_capacity(documents.len());
        let mut filtered_to_input = Vec::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            if !doc.trim().is_empty() {
                filtered_docs.push(doc.clone());
                filtered_to_input.push(i);
            }
        }

        if filtered_docs.is_empty() {
            return Ok(Vec::new());
        }

        // Step 2: submit at most min(requested_topk, non_empty_count).
        let request_topk = topk.min(filtered_docs.len());

        let body = RerankRequest {
            model: &self.model,
            query,
            documents: &filtered_docs,
            topk: request_topk,
        };

        let result = self
            .client
            .post(format!("{}/rerank", self.base_url))
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

        // Step 3: remap through the saved mapping, preserve order, dedupe.
        let mut seen = HashSet::new();
        let mut remapped = Vec::with_capacity(parsed.results.len());
        for r in parsed.results {
            if r.index >= filtered_to_input.len() {
                continue;
            }
            let input_index = filtered_to_input[r.index];
            if seen.insert(input_index) {
                remapped.push(RankedIndex {
                    index: input_index,
                    score: r.score,
                });
            }
        }

        // Step 4: pad from the head of the original list in input order if
        // the backend returned fewer results than requested.
        if remapped.len() < topk {
            for i in 0..documents.len() {
                if remapped.len() >= topk {
                    break;
                }
                if seen.insert(i) {
                    remapped.push(RankedIndex { index: i, score: 0.0 });
                }
            }
        }

        // Step 5: truncate to the caller's topk.
        remapped.truncate(topk);
        Ok(remapped)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    topk: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultItem>,
}

#[derive(Deserialize)]
struct RerankResultItem {
    index: usize,
    score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rerank_remaps_and_dedupes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rerank")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"index":1,"score":0.9},{"index":0,"score":0.4}]}"#)
            .create_async()
            .await;

        let reranker = LocalHfReranker::new(server.url(), "bge-reranker".to_string(), 1000.0);
        let docs = vec!["".to_string(), "alpha".to_string(), "beta".to_string()];

        let out = reranker.rerank("q", &docs, 2).await.unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].index, 2);
        assert_eq!(out[1].index, 1);
    }

    #[tokio::test]
    async fn rerank_empty_documents_short_circuits() {
        let server = mockito::Server::new_async().await;
        let reranker = LocalHfReranker::new(server.url(), "bge-reranker".to_string(), 1000.0);
        let out = reranker.rerank("q", &[], 5).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn rerank_pads_when_backend_returns_fewer() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rerank")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"index":0,"score":0.7}]}"#)
            .create_async()
            .await;

        let reranker = LocalHfReranker::new(server.url(), "bge-reranker".to_string(), 1000.0);
        let docs = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];

        let out = reranker.rerank("q", &docs, 3).await.unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].index, 0);
    }
}

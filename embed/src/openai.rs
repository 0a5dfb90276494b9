//! Text-only embedder over the OpenAI `/v1/embeddings` wire shape.

use crate::{l2_normalize_batch, TextEmbedder};
use async_trait::async_trait;
use ragserver_core::cool_down;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    rate_limit_per_sec: f64,
    need_norm: bool,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String, base_url: Option<String>, rate_limit_per_sec: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
            rate_limit_per_sec,
            need_norm: true,
        }
    }

    async fn call(&self, inputs: &[String]) -> Option<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: inputs,
        };

        let result = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        cool_down(self.rate_limit_per_sec).await;

        let response = match result {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "openai embeddings request failed");
                return None;
            }
        };

        let parsed = match response.error_for_status() {
            Ok(r) => r.json::<EmbeddingsResponse>().await,
            Err(err) => {
                tracing::warn!(error = %err, "openai embeddings returned an error status");
                return None;
            }
        };

        match parsed {
            Ok(body) => {
                let mut vectors: Vec<Vec<f32>> =
                    body.data.into_iter().map(|d| d.embedding).collect();
                if self.need_norm {
                    l2_normalize_batch(&mut vectors);
                }
                Some(vectors)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode openai embeddings response");
                None
            }
        }
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        self.call(texts).await.unwrap_or_default()
    }

    async fn embed_query(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return Vec::new();
        }
        self.call(std::slice::from_ref(&text.to_string()))
            .await
            .and_then(|mut v| v.pop())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_documents_normalizes_and_decodes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"embedding":[3.0,4.0]},{"embedding":[0.0,0.0]}]}"#)
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            Some(server.url()),
            1000.0,
        );

        let out = embedder
            .embed_documents(&["hello".to_string(), "world".to_string()])
            .await;

        assert_eq!(out.len(), 2);
        let norm = (out[0][0] * out[0][0] + out[0][1] * out[0][1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert_eq!(out[1], vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn embed_documents_empty_input_skips_request() {
        let server = mockito::Server::new_async().await;
        let embedder = OpenAiEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            Some(server.url()),
            1000.0,
        );
        assert!(embedder.embed_documents(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn embed_query_backend_failure_returns_empty_vector() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            Some(server.url()),
            1000.0,
        );

        assert!(embedder.embed_query("hello").await.is_empty());
    }
}

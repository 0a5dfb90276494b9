//! Multimodal embedder over a local OpenAI-compatible embedding server
//! (`POST /embeddings` with `{model, input}` -> `{data:[{embedding}]}`).
//! Images are not sent as a distinct media type: they are embedded by
//! submitting a `data:<mime>;base64,<…>` string through the *same* text
//! embedding endpoint, which the server recognises by its `data:image`
//! prefix and routes internally to its vision tower.

use crate::{image_data_uri, l2_normalize_batch, MultimodalEmbedder, TextEmbedder};
use async_trait::async_trait;
use ragserver_core::cool_down;
use serde::{Deserialize, Serialize};

pub struct LocalClipEmbedder {
    client: reqwest::Client,
    base_url: String,
    text_model: String,
    image_model: String,
    rate_limit_per_sec: f64,
    need_norm: bool,
}

impl LocalClipEmbedder {
    pub fn new(base_url: String, text_model: String, image_model: String, rate_limit_per_sec: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            text_model,
            image_model,
            rate_limit_per_sec,
            need_norm: true,
        }
    }

    async fn call(&self, model: &str, input: Vec<String>) -> Option<Vec<Vec<f32>>> {
        let body = EmbedRequest { model, input };

        let result = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body)
            .send()
            .await;

        cool_down(self.rate_limit_per_sec).await;

        let response = match result {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "local-clip embed request failed");
                return None;
            }
        };

        let parsed = match response.error_for_status() {
            Ok(r) => r.json::<EmbedResponse>().await,
            Err(err) => {
                tracing::warn!(error = %err, "local-clip embed returned an error status");
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
                tracing::warn!(error = %err, "failed to decode local-clip embed response");
                None
            }
        }
    }
}

#[async_trait]
impl TextEmbedder for LocalClipEmbedder {
    fn name(&self) -> &str {
        "local-clip"
    }

    fn model(&self) -> &str {
        &self.text_model
    }

    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        self.call(&self.text_model, texts.to_vec())
            .await
            .unwrap_or_default()
    }

    async fn embed_query(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return Vec::new();
        }
        self.call(&self.text_model, vec![text.to_string()])
            .await
            .and_then(|mut v| v.pop())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MultimodalEmbedder for LocalClipEmbedder {
    fn image_model(&self) -> &str {
        &self.image_model
    }

    async fn embed_image(&self, paths: &[String]) -> Vec<Vec<f32>> {
        if paths.is_empty() {
            return Vec::new();
        }

        let mut data_uris = Vec::with_capacity(paths.len());
        for path in paths {
            match tokio::fs::read(path).await {
                Ok(bytes) => data_uris.push(image_data_uri(path, &bytes)),
                Err(err) => {
                    tracing::warn!(path, error = %err, "failed to read image for embedding");
                    return Vec::new();
                }
            }
        }

        self.call(&self.image_model, data_uris).await.unwrap_or_default()
    }

    async fn embed_text_for_image_query(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return Vec::new();
        }
        self.call(&self.image_model, vec![text.to_string()])
            .await
            .and_then(|mut v| v.pop())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

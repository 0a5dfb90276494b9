//! Multimodal embedder over Cohere's V2 `embed` endpoint: text documents and
//! queries via `input_type=search_document`/`search_query`, images via
//! `input_type=image` with inline `image_url` data-URI objects.

use crate::{image_data_uri, l2_normalize_batch, MultimodalEmbedder, TextEmbedder};
use async_trait::async_trait;
use ragserver_core::cool_down;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://api.cohere.com/v2/embed";

pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
    text_model: String,
    image_model: String,
    rate_limit_per_sec: f64,
    need_norm: bool,
}

impl CohereEmbedder {
    pub fn new(api_key: String, text_model: String, image_model: String, rate_limit_per_sec: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            text_model,
            image_model,
            rate_limit_per_sec,
            need_norm: true,
        }
    }

    async fn embed_texts(&self, texts: &[String], input_type: &str) -> Option<Vec<Vec<f32>>> {
        let body = TextEmbedRequest {
            model: &self.text_model,
            texts,
            input_type,
            embedding_types: &["float"],
        };
        self.send(&body).await
    }

    async fn embed_images(&self, data_uris: Vec<String>) -> Option<Vec<Vec<f32>>> {
        let inputs: Vec<ImageInput> = data_uris
            .into_iter()
            .map(|uri| ImageInput {
                content: vec![ImageContent {
                    kind: "image_url",
                    image_url: ImageUrl { url: uri },
                }],
            })
            .collect();
        let body = ImageEmbedRequest {
            model: &self.image_model,
            inputs,
            input_type: "image",
            embedding_types: &["float"],
        };
        self.send(&body).await
    }

    async fn send<B: Serialize + ?Sized>(&self, body: &B) -> Option<Vec<Vec<f32>>> {
        let result = self
            .client
            .post(BASE_URL)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await;

        cool_down(self.rate_limit_per_sec).await;

        let response = match result {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "cohere embed request failed");
                return None;
            }
        };

        let parsed = match response.error_for_status() {
            Ok(r) => r.json::<EmbedResponse>().await,
            Err(err) => {
                tracing::warn!(error = %err, "cohere embed returned an error status");
                return None;
            }
        };

        match parsed {
            Ok(body) => {
                let mut vectors = body.embeddings.float;
                if self.need_norm {
                    l2_normalize_batch(&mut vectors);
                }
                Some(vectors)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode cohere embed response");
                None
            }
        }
    }
}

#[async_trait]
impl TextEmbedder for CohereEmbedder {
    fn name(&self) -> &str {
        "cohere"
    }

    fn model(&self) -> &str {
        &self.text_model
    }

    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        self.embed_texts(texts, "search_document")
            .await
            .unwrap_or_default()
    }

    async fn embed_query(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return Vec::new();
        }
        self.embed_texts(std::slice::from_ref(&text.to_string()), "search_query")
            .await
            .and_then(|mut v| v.pop())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MultimodalEmbedder for CohereEmbedder {
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

        self.embed_images(data_uris).await.unwrap_or_default()
    }

    async fn embed_text_for_image_query(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return Vec::new();
        }
        self.embed_texts(std::slice::from_ref(&text.to_string()), "search_query")
            .await
            .and_then(|mut v| v.pop())
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct TextEmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: &'a str,
    embedding_types: &'a [&'a str],
}

#[derive(Serialize)]
struct ImageEmbedRequest<'a> {
    model: &'a str,
    inputs: Vec<ImageInput>,
    input_type: &'a str,
    embedding_types: &'a [&'a str],
}

#[derive(Serialize)]
struct ImageInput {
    content: Vec<ImageContent>,
}

#[derive(Serialize)]
struct ImageContent {
    #[serde(rename = "type")]
    kind: &'static str,
    image_url: ImageUrl,
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: FloatEmbeddings,
}

#[derive(Deserialize)]
struct FloatEmbeddings {
    float: Vec<Vec<f32>>,
}

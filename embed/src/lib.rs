//! Text/image embedders behind a uniform capability interface. A
//! `TextEmbedder` handles text only; a `MultimodalEmbedder` additionally
//! embeds images and text-for-image-search queries, routed into its own
//! vector space (`space_key_multi`) distinct from the text space
//! (`space_key_text`).

pub mod cohere;
pub mod factory;
pub mod local_clip;
pub mod openai;

pub use factory::{build_multimodal_embedder, build_text_embedder};

use async_trait::async_trait;
use ragserver_core::error::{ErrorCode, RagServerError};
use ragserver_core::metadata::space_key;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("unknown embed provider: {0}")]
    UnknownProvider(String),
    #[error("missing api key for provider: {0}")]
    MissingApiKey(String),
    #[error("missing base url for provider: {0}")]
    MissingBaseUrl(String),
}

impl RagServerError for EmbedError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Config
    }
}

/// Base capability: embed text documents for indexing, and a single query
/// string at retrieval time.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    fn space_key_text(&self) -> String {
        space_key(self.name(), self.model(), ragserver_core::metadata::EMBTYPE_TEXT)
    }

    /// Embeds a batch of documents. Empty input returns empty output
    /// without calling the backend. A batch-level backend failure is
    /// logged and returns an empty `Vec` (never panics, never raises) so
    /// ingestion of the rest of a run can continue.
    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Embeds one query string. An empty result signals failure; the
    /// retriever is responsible for detecting it and short-circuiting.
    async fn embed_query(&self, text: &str) -> Vec<f32>;
}

/// Extends `TextEmbedder` with image embedding, for providers whose model
/// shares a joint text/image embedding space (CLIP-style).
#[async_trait]
pub trait MultimodalEmbedder: TextEmbedder {
    fn image_model(&self) -> &str {
        self.model()
    }

    fn space_key_multi(&self) -> String {
        space_key(self.name(), self.image_model(), ragserver_core::metadata::EMBTYPE_IMAGE)
    }

    /// Embeds a batch of images, given local file paths. Same empty-on-
    /// failure contract as `embed_documents`.
    async fn embed_image(&self, paths: &[String]) -> Vec<Vec<f32>>;

    /// Embeds a text query into the image space, for "search images by
    /// text description" queries.
    async fn embed_text_for_image_query(&self, text: &str) -> Vec<f32>;
}

/// L2-normalises `vector` in place. Zero-magnitude vectors are passed
/// through unchanged so cosine similarity in the store degrades to 0
/// rather than producing NaNs.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
}

pub fn l2_normalize_batch(vectors: &mut [Vec<f32>]) {
    for vector in vectors.iter_mut() {
        l2_normalize(vector);
    }
}

pub(crate) fn image_data_uri(path: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    let mime = match path.rsplit('.').next().unwrap_or("").to_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}

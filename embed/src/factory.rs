//! Builds embedder instances from settings, selecting the concrete
//! provider by `EmbedProviderKind`.

use crate::cohere::CohereEmbedder;
use crate::local_clip::LocalClipEmbedder;
use crate::openai::OpenAiEmbedder;
use crate::{EmbedError, MultimodalEmbedder, TextEmbedder};
use ragserver_core::config::{EmbedProviderKind, Settings};
use std::sync::Arc;

/// Builds a text embedder. `Local`/`Cohere` both yield multimodal
/// embedders, which also satisfy `TextEmbedder`.
pub fn build_text_embedder(settings: &Settings) -> Result<Arc<dyn TextEmbedder>, EmbedError> {
    match settings.embed_provider {
        EmbedProviderKind::Openai => {
            let api_key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| EmbedError::MissingApiKey("openai".to_string()))?;
            Ok(Arc::new(OpenAiEmbedder::new(
                api_key,
                settings.openai_embed_model_text.clone(),
                settings.openai_base_url.clone(),
                settings.requests_per_second,
            )))
        }
        EmbedProviderKind::Cohere => Ok(build_multimodal_embedder(settings)? as Arc<dyn TextEmbedder>),
        EmbedProviderKind::Local => Ok(build_multimodal_embedder(settings)? as Arc<dyn TextEmbedder>),
    }
}

/// Builds a multimodal embedder. The OpenAI provider is text-only, so this
/// errors for `EmbedProviderKind::Openai`.
pub fn build_multimodal_embedder(
    settings: &Settings,
) -> Result<Arc<dyn MultimodalEmbedder>, EmbedError> {
    match settings.embed_provider {
        EmbedProviderKind::Openai => Err(EmbedError::UnknownProvider(
            "openai does not support image embedding".to_string(),
        )),
        EmbedProviderKind::Cohere => {
            let api_key = settings
                .cohere_api_key
                .clone()
                .ok_or_else(|| EmbedError::MissingApiKey("cohere".to_string()))?;
            Ok(Arc::new(CohereEmbedder::new(
                api_key,
                settings.cohere_embed_model_text.clone(),
                settings.cohere_embed_model_image.clone(),
                settings.requests_per_second,
            )))
        }
        EmbedProviderKind::Local => {
            if settings.local_embed_base_url.is_empty() {
                return Err(EmbedError::MissingBaseUrl("local".to_string()));
            }
            Ok(Arc::new(LocalClipEmbedder::new(
                settings.local_embed_base_url.clone(),
                settings.local_embed_model_text.clone(),
                settings.local_embed_model_image.clone(),
                settings.requests_per_second,
            )))
        }
    }
}

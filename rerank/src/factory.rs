//! Builds a reranker from settings, selecting the concrete provider by
//! `RerankProviderKind`. `None` disables reranking entirely (the retriever
//! then returns the ANN-ordered candidates unchanged).

use crate::cohere::CohereReranker;
use crate::local_hf::LocalHfReranker;
use crate::Reranker;
use ragserver_core::config::{RerankProviderKind, Settings};
use std::sync::Arc;

pub fn build_reranker(settings: &Settings) -> Option<Arc<dyn Reranker>> {
    match settings.rerank_provider {
        RerankProviderKind::None => None,
        RerankProviderKind::Local => Some(Arc::new(LocalHfReranker::new(
            settings.local_rerank_base_url.clone(),
            settings.local_rerank_model.clone(),
            settings.requests_per_second,
        ))),
        RerankProviderKind::Cohere => match settings.cohere_api_key.clone() {
            Some(api_key) => Some(Arc::new(CohereReranker::new(
                api_key,
                settings.cohere_rerank_model.clone(),
                None,
                settings.requests_per_second,
            ))),
            None => {
                tracing::warn!("cohere rerank selected but no api key configured, disabling rerank");
                None
            }
        },
    }
}

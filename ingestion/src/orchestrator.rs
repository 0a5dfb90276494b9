//! Ties a loader to a text embedder, an optional multimodal embedder and a
//! store: resolve spaces, ask the loader for documents, embed them, and
//! upsert. Four public entry points wrap the same private routine.

use crate::error::IngestError;
use crate::file_loader::FileLoader;
use crate::html_loader::HtmlLoader;
use crate::loader::{LoadResult, Loader};
use embed::{MultimodalEmbedder, TextEmbedder};
use ragserver_core::model::Document;
use std::collections::HashSet;
use std::sync::Arc;
use storage::StoreManager;
use tracing::warn;

pub struct IngestOrchestrator {
    store: Arc<dyn StoreManager>,
    text_embedder: Arc<dyn TextEmbedder>,
    multimodal_embedder: Option<Arc<dyn MultimodalEmbedder>>,
    file_loader: FileLoader,
    html_loader: HtmlLoader,
}

impl IngestOrchestrator {
    pub fn new(
        store: Arc<dyn StoreManager>,
        text_embedder: Arc<dyn TextEmbedder>,
        multimodal_embedder: Option<Arc<dyn MultimodalEmbedder>>,
        file_loader: FileLoader,
        html_loader: HtmlLoader,
    ) -> Self {
        Self {
            store,
            text_embedder,
            multimodal_embedder,
            file_loader,
            html_loader,
        }
    }

    pub async fn from_path(&self, path: &str, check_update: bool) -> Result<(), IngestError> {
        let mut cache = HashSet::new();
        self.ingest_one(&self.file_loader, path, check_update, &mut cache)
            .await
    }

    pub async fn from_path_list(
        &self,
        paths: &[String],
        check_update: bool,
    ) -> Result<(), IngestError> {
        let mut cache = HashSet::new();
        for path in paths {
            self.ingest_one(&self.file_loader, path, check_update, &mut cache)
                .await?;
        }
        Ok(())
    }

    pub async fn from_url(&self, url: &str, check_update: bool) -> Result<(), IngestError> {
        let mut cache = HashSet::new();
        self.ingest_one(&self.html_loader, url, check_update, &mut cache)
            .await
    }

    pub async fn from_url_list(
        &self,
        urls: &[String],
        check_update: bool,
    ) -> Result<(), IngestError> {
        let mut cache = HashSet::new();
        for url in urls {
            self.ingest_one(&self.html_loader, url, check_update, &mut cache)
                .await?;
        }
        Ok(())
    }

    async fn ingest_one(
        &self,
        loader: &dyn Loader,
        target: &str,
        check_update: bool,
        source_cache: &mut HashSet<String>,
    ) -> Result<(), IngestError> {
        let text_space = self.text_embedder.space_key_text();
        self.store.load_space(&text_space).await?;

        let image_space = match &self.multimodal_embedder {
            Some(embedder) => {
                let key = embedder.space_key_multi();
                self.store.load_space(&key).await?;
                Some(key)
            }
            None => None,
        };

        let LoadResult {
            text_docs,
            image_docs,
            temp_files,
        } = loader
            .load(
                target,
                &text_space,
                image_space.as_deref(),
                check_update,
                self.store.as_ref(),
                source_cache,
            )
            .await?;

        let upsert_result = self.apply(text_docs, image_docs, &text_space, image_space.as_deref()).await;

        for path in temp_files {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %err, "failed to remove temp file after ingest");
            }
        }

        upsert_result
    }

    async fn apply(
        &self,
        text_docs: Vec<Document>,
        image_docs: Vec<Document>,
        text_space: &str,
        image_space: Option<&str>,
    ) -> Result<(), IngestError> {
        if !image_docs.is_empty() {
            if let Some(embedder) = &self.multimodal_embedder {
                let paths: Vec<String> = image_docs
                    .iter()
                    .map(|d| d.as_image_path().unwrap_or_default().to_string())
                    .collect();
                let vectors = embedder.embed_image(&paths).await;
                if vectors.len() == image_docs.len() {
                    self.store
                        .upsert_multi(image_docs, vectors, image_space)
                        .await?;
                } else {
                    warn!(
                        expected = image_docs.len(),
                        got = vectors.len(),
                        "image embedder returned a mismatched batch, skipping image upsert"
                    );
                }
            }
        }

        if !text_docs.is_empty() {
            let texts: Vec<String> = text_docs
                .iter()
                .map(|d| d.as_text().unwrap_or_default().to_string())
                .collect();
            let vectors = self.text_embedder.embed_documents(&texts).await;
            if vectors.len() == text_docs.len() {
                self.store.upsert(text_docs, vectors, Some(text_space)).await?;
            } else {
                warn!(
                    expected = text_docs.len(),
                    got = vectors.len(),
                    "text embedder returned a mismatched batch, skipping text upsert"
                );
            }
        }

        Ok(())
    }
}

//! `ServerState`: the swappable-component facade an HTTP shell sits on top
//! of. Each component (`store`, `text_embedder`, `multimodal_embedder`,
//! `reranker`) lives behind its own `tokio::sync::RwLock` so `/reload`
//! exclusively swaps just the field it targets, while every other
//! operation only takes a reader lock on the fields it needs — queries
//! against different spaces proceed concurrently, and a reload of one
//! component never blocks on in-flight use of the others.

use crate::error::ServerError;
use embed::{build_multimodal_embedder, build_text_embedder, MultimodalEmbedder, TextEmbedder};
use ingestion::{FileLoader, HtmlLoader, IngestOrchestrator};
use query::Retriever;
use ragserver_core::config::{EmbedProviderKind, RerankProviderKind, Settings, VectorStoreKind};
use ragserver_core::model::{Document, Payload};
use rerank::{build_reranker, Reranker};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use storage::{EmbeddedStoreManager, PostgresConfig, PostgresStoreManager, StoreManager};
use tokio::sync::RwLock;

/// One of the three components `/reload` can swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTarget {
    Store,
    Embed,
    Rerank,
}

impl FromStr for ReloadTarget {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "store" => Ok(ReloadTarget::Store),
            "embed" => Ok(ReloadTarget::Embed),
            "rerank" => Ok(ReloadTarget::Rerank),
            other => Err(ServerError::UnknownReloadTarget(other.to_string())),
        }
    }
}

/// `GET /v1/health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub store: String,
    pub embed: String,
    pub rerank: String,
}

/// One retrieved document, flattened for the wire: payload collapses to
/// its text (or its image path, for image documents) under `page_content`,
/// alongside the full metadata map.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub page_content: String,
    pub metadata: ragserver_core::metadata::Metadata,
}

impl From<&Document> for DocumentView {
    fn from(doc: &Document) -> Self {
        let page_content = match doc.payload() {
            Payload::Text(text) => text.clone(),
            Payload::ImagePath(path) => path.clone(),
        };
        Self {
            page_content,
            metadata: doc.metadata().clone(),
        }
    }
}

/// One file handed to `/v1/upload`, already extracted from its multipart
/// part by the (out-of-scope) HTTP shell.
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub filename: String,
    pub content_type: String,
    pub save_path: String,
}

pub struct ServerState {
    settings: RwLock<Settings>,
    store: RwLock<Arc<dyn StoreManager>>,
    text_embedder: RwLock<Arc<dyn TextEmbedder>>,
    multimodal_embedder: RwLock<Option<Arc<dyn MultimodalEmbedder>>>,
    reranker: RwLock<Option<Arc<dyn Reranker>>>,
}

impl ServerState {
    pub async fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        let store = build_store(&settings).await?;
        let text_embedder = build_text_embedder(&settings)?;
        let multimodal_embedder = build_multimodal(&settings)?;
        let reranker = build_reranker(&settings);

        Ok(Self {
            settings: RwLock::new(settings),
            store: RwLock::new(store),
            text_embedder: RwLock::new(text_embedder),
            multimodal_embedder: RwLock::new(multimodal_embedder),
            reranker: RwLock::new(reranker),
        })
    }

    pub async fn health(&self) -> HealthStatus {
        let store_label = vector_store_label(&self.settings.read().await.vector_store);
        let embed_label = self.text_embedder.read().await.name().to_string();
        let rerank_label = match self.reranker.read().await.as_ref() {
            Some(r) => r.name().to_string(),
            None => "none".to_string(),
        };

        HealthStatus {
            status: "ok".to_string(),
            store: store_label.to_string(),
            embed: embed_label,
            rerank: rerank_label,
        }
    }

    /// Exclusively swaps one component, rebuilt from `settings` with
    /// `target`'s provider kind overridden to `name`. Reloading `embed`
    /// rebuilds both the text and multimodal embedder, since both are
    /// resolved from the same `EMBED_PROVIDER` knob.
    pub async fn reload(&self, target: ReloadTarget, name: &str) -> Result<(), ServerError> {
        match target {
            ReloadTarget::Store => {
                let mut settings = self.settings.write().await;
                settings.vector_store = parse_vector_store_kind(name)?;
                let snapshot = settings.clone();
                drop(settings);

                let new_store = build_store(&snapshot).await?;
                *self.store.write().await = new_store;
            }
            ReloadTarget::Embed => {
                let mut settings = self.settings.write().await;
                settings.embed_provider = parse_embed_provider_kind(name)?;
                let snapshot = settings.clone();
                drop(settings);

                let new_text = build_text_embedder(&snapshot)?;
                let new_multi = build_multimodal(&snapshot)?;
                *self.text_embedder.write().await = new_text;
                *self.multimodal_embedder.write().await = new_multi;
            }
            ReloadTarget::Rerank => {
                let mut settings = self.settings.write().await;
                settings.rerank_provider = parse_rerank_provider_kind(name)?;
                let snapshot = settings.clone();
                drop(settings);

                *self.reranker.write().await = build_reranker(&snapshot);
            }
        }
        Ok(())
    }

    pub async fn upload(&self, files: Vec<UploadedFile>) -> Result<Vec<SavedFile>, ServerError> {
        let upload_dir = self.settings.read().await.upload_dir.clone();
        tokio::fs::create_dir_all(&upload_dir).await?;

        let mut saved = Vec::with_capacity(files.len());
        for file in files {
            let save_path = Path::new(&upload_dir).join(safe_filename(&file.filename));
            tokio::fs::write(&save_path, &file.bytes).await?;
            saved.push(SavedFile {
                filename: file.filename,
                content_type: file.content_type,
                save_path: save_path.to_string_lossy().into_owned(),
            });
        }
        Ok(saved)
    }

    pub async fn ingest_path(&self, path: &str) -> Result<(), ServerError> {
        self.orchestrator().await.from_path(path, self.check_update().await).await?;
        Ok(())
    }

    pub async fn ingest_path_list(&self, list_path: &str) -> Result<(), ServerError> {
        let paths = read_list_file(list_path).await?;
        self.orchestrator()
            .await
            .from_path_list(&paths, self.check_update().await)
            .await?;
        Ok(())
    }

    pub async fn ingest_url(&self, url: &str) -> Result<(), ServerError> {
        self.orchestrator().await.from_url(url, self.check_update().await).await?;
        Ok(())
    }

    pub async fn ingest_url_list(&self, list_path: &str) -> Result<(), ServerError> {
        let urls = read_list_file(list_path).await?;
        self.orchestrator()
            .await
            .from_url_list(&urls, self.check_update().await)
            .await?;
        Ok(())
    }

    pub async fn query_text(
        &self,
        query: &str,
        topk: Option<usize>,
    ) -> Result<Vec<DocumentView>, ServerError> {
        let (k, overfetch_scale) = self.query_scale(topk).await;
        let store = self.store.read().await;
        let text_embedder = self.text_embedder.read().await;
        let reranker = self.reranker.read().await;

        let retriever = Retriever::new(store.as_ref());
        let docs = retriever
            .query_text(query, text_embedder.as_ref(), k, reranker.as_deref(), overfetch_scale)
            .await?;
        Ok(docs.iter().map(DocumentView::from).collect())
    }

    pub async fn query_text_multi(
        &self,
        query: &str,
        topk: Option<usize>,
    ) -> Result<Vec<DocumentView>, ServerError> {
        let (k, overfetch_scale) = self.query_scale(topk).await;
        let multimodal = self.multimodal_embedder.read().await;
        let embedder = multimodal.as_ref().ok_or(ServerError::NoMultimodalEmbedder)?;
        let store = self.store.read().await;
        let reranker = self.reranker.read().await;

        let retriever = Retriever::new(store.as_ref());
        let docs = retriever
            .query_text_multi(query, embedder.as_ref(), k, reranker.as_deref(), overfetch_scale)
            .await?;
        Ok(docs.iter().map(DocumentView::from).collect())
    }

    pub async fn query_image(
        &self,
        path: &str,
        topk: Option<usize>,
    ) -> Result<Vec<DocumentView>, ServerError> {
        let (k, _) = self.query_scale(topk).await;
        let multimodal = self.multimodal_embedder.read().await;
        let embedder = multimodal.as_ref().ok_or(ServerError::NoMultimodalEmbedder)?;
        let store = self.store.read().await;

        let retriever = Retriever::new(store.as_ref());
        let docs = retriever.query_image(path, embedder.as_ref(), k).await?;
        Ok(docs.iter().map(DocumentView::from).collect())
    }

    async fn check_update(&self) -> bool {
        self.settings.read().await.check_update
    }

    async fn query_scale(&self, topk: Option<usize>) -> (usize, usize) {
        let settings = self.settings.read().await;
        (topk.unwrap_or(settings.topk), settings.topk_rerank_scale)
    }

    async fn orchestrator(&self) -> IngestOrchestrator {
        let settings = self.settings.read().await;
        let file_loader = FileLoader::new(settings.chunk_size, settings.chunk_overlap);
        let html_loader = HtmlLoader::new(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.user_agent.clone(),
            settings.requests_per_second,
            settings.fetch_timeout_secs,
            settings.max_fetch_body_bytes,
            settings.scan_asset_links,
        );
        drop(settings);

        let store = self.store.read().await.clone();
        let text_embedder = self.text_embedder.read().await.clone();
        let multimodal_embedder = self.multimodal_embedder.read().await.clone();

        IngestOrchestrator::new(store, text_embedder, multimodal_embedder, file_loader, html_loader)
    }
}

async fn build_store(settings: &Settings) -> Result<Arc<dyn StoreManager>, ServerError> {
    match settings.vector_store {
        VectorStoreKind::Embedded => Ok(Arc::new(EmbeddedStoreManager::new(
            settings.embedded_store_data_dir.clone(),
            settings.load_limit as usize,
        ))),
        VectorStoreKind::Postgres => {
            let config = PostgresConfig {
                host: settings.pg_host.clone(),
                port: settings.pg_port,
                database: settings.pg_database.clone(),
                user: settings.pg_user.clone(),
                password: settings.pg_password.clone(),
            };
            let manager = PostgresStoreManager::connect(&config).await?;
            Ok(Arc::new(manager))
        }
    }
}

/// `Openai` is text-only; every other provider also yields a multimodal
/// embedder, matching `build_multimodal_embedder`'s own dispatch.
fn build_multimodal(settings: &Settings) -> Result<Option<Arc<dyn MultimodalEmbedder>>, ServerError> {
    match settings.embed_provider {
        EmbedProviderKind::Openai => Ok(None),
        _ => Ok(Some(build_multimodal_embedder(settings)?)),
    }
}

fn vector_store_label(kind: &VectorStoreKind) -> &'static str {
    match kind {
        VectorStoreKind::Embedded => "embedded",
        VectorStoreKind::Postgres => "postgres",
    }
}

fn parse_vector_store_kind(name: &str) -> Result<VectorStoreKind, ServerError> {
    match name.to_ascii_lowercase().as_str() {
        "embedded" => Ok(VectorStoreKind::Embedded),
        "postgres" => Ok(VectorStoreKind::Postgres),
        other => Err(ServerError::InvalidReloadName(other.to_string())),
    }
}

fn parse_embed_provider_kind(name: &str) -> Result<EmbedProviderKind, ServerError> {
    match name.to_ascii_lowercase().as_str() {
        "local" => Ok(EmbedProviderKind::Local),
        "openai" => Ok(EmbedProviderKind::Openai),
        "cohere" => Ok(EmbedProviderKind::Cohere),
        other => Err(ServerError::InvalidReloadName(other.to_string())),
    }
}

fn parse_rerank_provider_kind(name: &str) -> Result<RerankProviderKind, ServerError> {
    match name.to_ascii_lowercase().as_str() {
        "local" => Ok(RerankProviderKind::Local),
        "cohere" => Ok(RerankProviderKind::Cohere),
        "none" => Ok(RerankProviderKind::None),
        other => Err(ServerError::InvalidReloadName(other.to_string())),
    }
}

/// Keeps only the basename, replacing anything but alphanumerics, `.`, `-`
/// and `_` — an uploaded file keeps its extension, unlike the loaders'
/// fully-flattened temp-file names.
fn safe_filename(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `path_list`/`url_list` bodies: UTF-8 text, one target per line, blank
/// lines and lines whose first non-whitespace character is `#` skipped.
async fn read_list_file(path: &str) -> Result<Vec<String>, ServerError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_target_parses_known_names() {
        assert_eq!(ReloadTarget::from_str("store").unwrap(), ReloadTarget::Store);
        assert_eq!(ReloadTarget::from_str("EMBED").unwrap(), ReloadTarget::Embed);
        assert_eq!(ReloadTarget::from_str("rerank").unwrap(), ReloadTarget::Rerank);
        assert!(ReloadTarget::from_str("bogus").is_err());
    }

    #[test]
    fn safe_filename_strips_directories_and_unsafe_chars() {
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("report final (v2).pdf"), "report_final__v2_.pdf");
    }

    #[tokio::test]
    async fn read_list_file_skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let list_path = dir.path().join("sources.txt");
        tokio::fs::write(&list_path, "a.txt\n\n# comment\n  \nb.txt\n")
            .await
            .unwrap();

        let entries = read_list_file(list_path.to_str().unwrap()).await.unwrap();
        assert_eq!(entries, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }
}

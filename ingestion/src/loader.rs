//! Shared loader surface: both `FileLoader` and `HtmlLoader` produce a
//! `LoadResult` for one entry point call, tracking the temp files they
//! created so the orchestrator can unlink them after upsert.

use crate::error::IngestError;
use async_trait::async_trait;
use ragserver_core::model::Document;
use std::collections::HashSet;
use std::path::PathBuf;
use storage::StoreManager;

#[derive(Debug, Default)]
pub struct LoadResult {
    pub text_docs: Vec<Document>,
    pub image_docs: Vec<Document>,
    pub temp_files: Vec<PathBuf>,
}

impl LoadResult {
    pub fn merge(&mut self, other: LoadResult) {
        self.text_docs.extend(other.text_docs);
        self.image_docs.extend(other.image_docs);
        self.temp_files.extend(other.temp_files);
    }
}

#[async_trait]
pub trait Loader: Send + Sync {
    /// `target` is a filesystem path or a URL, depending on the loader.
    /// `image_space` is `Some` only when the active embedder is
    /// multimodal; loaders must not emit `image_docs` otherwise.
    async fn load(
        &self,
        target: &str,
        text_space: &str,
        image_space: Option<&str>,
        check_update: bool,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError>;
}

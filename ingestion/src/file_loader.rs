//! Filesystem loader: walks a file or directory, dispatches each entry by
//! extension, and turns its content into chunked text and (when an image
//! space is active) image documents.

use crate::chunker::chunk_text;
use crate::error::IngestError;
use crate::loader::{LoadResult, Loader};
use crate::pdf;
use async_trait::async_trait;
use ragserver_core::metadata::{file_fingerprint, MetadataKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use storage::StoreManager;
use tracing::warn;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
const PDF_EXTENSION: &str = "pdf";
const FINGERPRINT_HEAD_BYTES: usize = 65536;

pub struct FileLoader {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FileLoader {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Handles a single regular file. `source`/`base_source` let the html
    /// loader route a downloaded file through the same per-extension
    /// dispatch while recording the page that linked it.
    pub async fn load_file(
        &self,
        path: &Path,
        source: &str,
        base_source: Option<&str>,
        text_space: &str,
        image_space: Option<&str>,
        check_update: bool,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError> {
        let mut result = LoadResult::default();

        if !source_cache.insert(source.to_string()) {
            return Ok(result);
        }
        if store.skip_update(source, check_update).await {
            return Ok(result);
        }

        let Some(ext) = extension_lower(path) else {
            return Ok(result);
        };

        let fingerprint = file_fingerprint(path, FINGERPRINT_HEAD_BYTES)?;

        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            let raw = tokio::fs::read(path).await?;
            let text = String::from_utf8_lossy(&raw).into_owned();
            let plain = if ext == "md" {
                markdown_to_text(&text)
            } else {
                text
            };
            self.push_text_chunks(
                &plain,
                MetadataKind::TextFile,
                source,
                base_source,
                text_space,
                &fingerprint,
                None,
                &mut result,
            )?;
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            if let Some(image_space) = image_space {
                let doc = crate::metadata_builder::image_document(
                    MetadataKind::ImageFile,
                    source,
                    base_source,
                    image_space,
                    &fingerprint,
                    None,
                    0,
                    path.to_string_lossy().into_owned(),
                )?;
                result.image_docs.push(doc);
            }
        } else if ext == PDF_EXTENSION {
            let bytes = tokio::fs::read(path).await?;
            self.load_pdf(
                &bytes,
                source,
                base_source,
                text_space,
                image_space,
                &fingerprint,
                &mut result,
            )
            .await?;
        }

        Ok(result)
    }

    async fn load_pdf(
        &self,
        bytes: &[u8],
        source: &str,
        base_source: Option<&str>,
        text_space: &str,
        image_space: Option<&str>,
        fingerprint: &ragserver_core::metadata::FileFingerprint,
        result: &mut LoadResult,
    ) -> Result<(), IngestError> {
        for page in pdf::extract_pages_text(bytes) {
            self.push_text_chunks(
                &page.text,
                MetadataKind::PdfText,
                source,
                base_source,
                text_space,
                fingerprint,
                Some(page.page_no),
                result,
            )?;
        }

        if let Some(image_space) = image_space {
            for image in pdf::extract_images(bytes) {
                let temp_path = std::env::temp_dir().join(format!(
                    "ragserver-{}-{}-{}.{}",
                    sanitize_filename(source),
                    image.page_no,
                    image.image_no,
                    pdf::IMAGE_EXTENSION
                ));
                if let Err(err) = tokio::fs::write(&temp_path, &image.bytes).await {
                    warn!(error = %err, "failed to write extracted pdf image to temp file");
                    continue;
                }
                let doc = crate::metadata_builder::image_document(
                    MetadataKind::PdfImage,
                    source,
                    base_source,
                    image_space,
                    fingerprint,
                    Some(image.page_no),
                    image.image_no,
                    temp_path.to_string_lossy().into_owned(),
                )?;
                result.image_docs.push(doc);
                result.temp_files.push(temp_path);
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_text_chunks(
        &self,
        text: &str,
        kind: MetadataKind,
        source: &str,
        base_source: Option<&str>,
        space_key: &str,
        fingerprint: &ragserver_core::metadata::FileFingerprint,
        page: Option<i64>,
        result: &mut LoadResult,
    ) -> Result<(), IngestError> {
        for (chunk_no, chunk) in chunk_text(text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            let doc = crate::metadata_builder::text_chunk_document(
                kind,
                source,
                base_source,
                space_key,
                fingerprint,
                page,
                chunk_no as i64,
                chunk,
            )?;
            result.text_docs.push(doc);
        }
        Ok(())
    }
}

#[async_trait]
impl Loader for FileLoader {
    async fn load(
        &self,
        target: &str,
        text_space: &str,
        image_space: Option<&str>,
        check_update: bool,
        store: &dyn StoreManager,
        source_cache: &mut HashSet<String>,
    ) -> Result<LoadResult, IngestError> {
        let root = PathBuf::from(target);
        let mut result = LoadResult::default();

        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let source = path.to_string_lossy().into_owned();
            let file_result = self
                .load_file(
                    path,
                    &source,
                    None,
                    text_space,
                    image_space,
                    check_update,
                    store,
                    source_cache,
                )
                .await?;
            result.merge(file_result);
        }

        Ok(result)
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

fn markdown_to_text(markdown: &str) -> String {
    use pulldown_cmark::{Event, Parser};

    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => {
                out.push_str(&t);
                out.push(' ');
            }
            Event::SoftBreak | Event::HardBreak | Event::End(_) => out.push('\n'),
            _ => {}
        }
    }
    if out.trim().is_empty() {
        markdown.to_string()
    } else {
        out
    }
}

fn sanitize_filename(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragserver_core::model::Document;
    use storage::{QueryFilter, ScoredDocument, StoreError};
    use tempfile::tempdir;

    struct FakeStore;

    #[async_trait]
    impl StoreManager for FakeStore {
        async fn load_space(&self, _space_key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn activate_space(&self, _space_key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_active(&self) -> Option<String> {
            None
        }
        async fn upsert(
            &self,
            _docs: Vec<Document>,
            _vectors: Vec<Vec<f32>>,
            _space_key: Option<&str>,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert_multi(
            &self,
            _docs: Vec<Document>,
            _vectors: Vec<Vec<f32>>,
            _space_key: Option<&str>,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
        async fn query(
            &self,
            _vector: &[f32],
            _k: usize,
            _filter: Option<&QueryFilter>,
            _space_key: Option<&str>,
        ) -> Result<Vec<ScoredDocument>, StoreError> {
            Ok(Vec::new())
        }
        async fn skip_update(&self, _source: &str, _check_update: bool) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn loads_text_file_into_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let loader = FileLoader::new(100, 10);
        let store = FakeStore;
        let mut cache = HashSet::new();

        let result = loader
            .load(
                dir.path().to_str().unwrap(),
                "text-space",
                None,
                true,
                &store,
                &mut cache,
            )
            .await
            .unwrap();

        assert_eq!(result.text_docs.len(), 1);
        assert_eq!(result.text_docs[0].as_text(), Some("hello world"));
    }

    #[tokio::test]
    async fn skips_image_when_no_image_space_active() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pic.png");
        tokio::fs::write(&path, b"not a real png").await.unwrap();

        let loader = FileLoader::new(100, 10);
        let store = FakeStore;
        let mut cache = HashSet::new();

        let result = loader
            .load(
                dir.path().to_str().unwrap(),
                "text-space",
                None,
                true,
                &store,
                &mut cache,
            )
            .await
            .unwrap();

        assert!(result.image_docs.is_empty());
    }

    #[tokio::test]
    async fn source_cache_prevents_reprocessing_same_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();
        let source = path.to_string_lossy().into_owned();

        let loader = FileLoader::new(100, 10);
        let store = FakeStore;
        let mut cache = HashSet::new();
        cache.insert(source.clone());

        let result = loader
            .load_file(&path, &source, None, "text-space", None, true, &store, &mut cache)
            .await
            .unwrap();

        assert!(result.text_docs.is_empty());
    }
}
